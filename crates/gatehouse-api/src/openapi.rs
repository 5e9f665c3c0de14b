//! # OpenAPI Specification Assembly
//!
//! Collects the utoipa-documented routes into one document served at
//! `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Gatehouse API",
        version = "0.1.0",
        description = "Visit pre-authorization, gate credential validation, presence, exits, and correspondence custody.",
        license(name = "AGPL-3.0-or-later")
    ),
    paths(
        // Visits
        crate::routes::visits::create_visit,
        crate::routes::visits::get_visit,
        crate::routes::visits::cancel_visit,
        crate::routes::visits::register_exit,
        // Credentials
        crate::routes::credentials::validate_credential,
        // Presence
        crate::routes::presence::list_presence,
        // Correspondence
        crate::routes::correspondence::receive_correspondence,
        crate::routes::correspondence::awaiting_pickup,
        crate::routes::correspondence::get_correspondence,
        crate::routes::correspondence::deliver_correspondence,
        crate::routes::correspondence::return_correspondence,
        crate::routes::correspondence::mark_not_collected,
        // Dashboard
        crate::routes::dashboard::dashboard_stats,
        crate::routes::dashboard::metrics,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::middleware::metrics::MetricsSnapshot,
        crate::routes::visits::CreateVisitBody,
        crate::routes::visits::CreateVisitResponse,
        crate::routes::visits::VisitResponse,
        crate::routes::visits::TransitionView,
        crate::routes::visits::CancelVisitBody,
        crate::routes::visits::ExitResponse,
        crate::routes::credentials::ValidateCredentialBody,
        crate::routes::credentials::AdmissionResponse,
        crate::routes::presence::PresenceResponse,
        crate::routes::presence::PresenceEntryResponse,
        crate::routes::correspondence::ReceiveCorrespondenceBody,
        crate::routes::correspondence::DeliverCorrespondenceBody,
        crate::routes::correspondence::CloseCorrespondenceBody,
        crate::routes::correspondence::CorrespondenceResponse,
        crate::routes::correspondence::AwaitingResponse,
        crate::routes::correspondence::UnitBacklogResponse,
        crate::routes::dashboard::DashboardStats,
    )),
    tags(
        (name = "visits", description = "Visit pre-authorization and lifecycle"),
        (name = "credentials", description = "Gate credential validation"),
        (name = "presence", description = "Visitors currently on site"),
        (name = "correspondence", description = "Mail and parcel custody"),
        (name = "dashboard", description = "Desk counters and request metrics"),
    )
)]
pub struct ApiDoc;

pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
