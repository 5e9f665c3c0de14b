//! # Dashboard
//!
//! Desk counters and the in-process request metrics.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::middleware::metrics::MetricsSnapshot;
use crate::state::AppState;

/// Counters shown on the concierge dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DashboardStats {
    /// Visitors on site, from the presence ledger.
    pub visits_inside: usize,
    /// Pending or authorized visits expected today (UTC).
    pub visits_expected_today: usize,
    /// Correspondence items awaiting pickup.
    pub correspondence_awaiting: usize,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/dashboard/stats", get(dashboard_stats))
        .route("/metrics", get(metrics))
}

/// GET /v1/dashboard/stats
#[utoipa::path(
    get,
    path = "/v1/dashboard/stats",
    responses((status = 200, description = "Dashboard counters", body = DashboardStats)),
    tag = "dashboard"
)]
pub async fn dashboard_stats(State(state): State<AppState>) -> Json<DashboardStats> {
    Json(DashboardStats {
        visits_inside: state.engine.visits_inside(),
        visits_expected_today: state.engine.visits_expected_today(),
        correspondence_awaiting: state.custody.count_awaiting(),
    })
}

/// GET /metrics: request counters since start.
#[utoipa::path(
    get,
    path = "/metrics",
    responses((status = 200, description = "Request counters", body = MetricsSnapshot)),
    tag = "dashboard"
)]
pub async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
