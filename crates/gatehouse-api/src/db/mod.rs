//! # Database Persistence Layer
//!
//! Optional Postgres write-through for visits and correspondence via SQLx.
//! When `DATABASE_URL` is unset the API runs in-memory only.
//!
//! Each row keeps the full record as JSONB next to a few scalar columns.
//! Status updates are conditional on the status the caller observed before
//! the transition (or the target status, for a retried write), so a row that
//! moved underneath us is never overwritten. Callers hold the record's
//! write gate (`crate::write_gate`) across transition and write.

pub mod correspondence;
pub mod visits;

use sqlx::postgres::{PgPool, PgPoolOptions};

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` if `DATABASE_URL` is not set (in-memory-only mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool() -> Result<Option<PgPool>, sqlx::Error> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => url,
        _ => {
            tracing::warn!(
                "DATABASE_URL not set; running in-memory only. Visits will not survive restarts."
            );
            return Ok(None);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&url)
        .await?;

    tracing::info!("connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("database migrations applied");

    Ok(Some(pool))
}

/// Serialize a record snapshot for the `record` column.
pub(crate) fn to_record_json<T: serde::Serialize>(
    record: &T,
    kind: &'static str,
) -> Result<serde_json::Value, sqlx::Error> {
    serde_json::to_value(record).map_err(|e| {
        tracing::error!(error = %e, kind, "failed to serialize record snapshot");
        sqlx::Error::Encode(Box::new(e))
    })
}
