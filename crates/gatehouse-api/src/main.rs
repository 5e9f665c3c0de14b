//! # gatehouse-api: Binary Entry Point
//!
//! Reads configuration from the environment, connects to Postgres when
//! `DATABASE_URL` is set, hydrates the in-memory stores, starts the
//! reconciler, and serves HTTP.

use gatehouse_api::config::{AppConfig, LogFormat};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    init_tracing(config.log_format);

    let db_pool = gatehouse_api::db::init_pool().await.map_err(|e| {
        tracing::error!("database initialization failed: {e}");
        e
    })?;

    let port = config.port;
    let refresh = config.presence_refresh;
    let state = gatehouse_api::bootstrap::bootstrap(config, db_pool).map_err(|e| {
        tracing::error!("bootstrap failed: {e}");
        e
    })?;

    state.hydrate_from_db().await.map_err(|e| {
        tracing::error!("database hydration failed: {e}");
        e
    })?;

    tokio::spawn(gatehouse_api::reconciler::run(state.clone(), refresh));

    let app = gatehouse_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("gatehouse API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}
