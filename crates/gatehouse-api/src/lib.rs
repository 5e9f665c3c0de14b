//! # gatehouse-api: HTTP Service for the Gatehouse
//!
//! Axum front end over the visit engine and the correspondence custody
//! service.
//!
//! ## API Surface
//!
//! | Prefix                 | Module                       |
//! |------------------------|------------------------------|
//! | `/v1/visits/*`         | [`routes::visits`]           |
//! | `/v1/credentials/*`    | [`routes::credentials`]      |
//! | `/v1/presence`         | [`routes::presence`]         |
//! | `/v1/correspondence/*` | [`routes::correspondence`]   |
//! | `/v1/dashboard/*`      | [`routes::dashboard`]        |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware → RateLimitMiddleware → Handler
//! ```
//!
//! Health probes (`/health/*`) sit outside the stack. Engine calls are
//! synchronous and hold record locks only for the duration of the call,
//! never across an `.await`. With a database configured, a record's async
//! write gate ([`write_gate`]) is what spans the transition and its write.

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod reconciler;
pub mod routes;
pub mod state;
pub mod write_gate;

use axum::middleware::from_fn;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::middleware::rate_limit::RateLimiter;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };
    let metrics = state.metrics.clone();
    let limiter = RateLimiter::new(state.config.rate_limit.clone());

    let api = Router::new()
        .merge(routes::visits::router())
        .merge(routes::credentials::router())
        .merge(routes::presence::router())
        .merge(routes::correspondence::router())
        .merge(routes::dashboard::router())
        .merge(openapi::router())
        .layer(from_fn(middleware::rate_limit::rate_limit_middleware))
        .layer(from_fn(auth::auth_middleware))
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(axum::Extension(auth_config))
        .layer(axum::Extension(metrics))
        .layer(axum::Extension(limiter))
        .with_state(state);

    let health = Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness));

    Router::new().merge(health).merge(api)
}

/// Liveness probe: 200 while the process runs.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: 200 once the router is serving.
async fn readiness() -> &'static str {
    "ready"
}
