//! # Presence
//!
//! `GET /v1/presence`: who is on site right now, derived from the ledger.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use gatehouse_core::{Timestamp, UnitId, VisitId};
use gatehouse_engine::{Directory, PresenceView};

use crate::state::AppState;

/// One visitor on site.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PresenceEntryResponse {
    #[schema(value_type = String, format = Uuid)]
    pub visit_id: VisitId,
    #[schema(value_type = String)]
    pub unit_id: UnitId,
    /// Directory label of the unit, when the unit is still listed.
    pub unit_label: Option<String>,
    #[schema(value_type = String)]
    pub entered_at: Timestamp,
    pub elapsed_minutes: i64,
}

impl PresenceEntryResponse {
    fn from_view(v: PresenceView, directory: &dyn Directory) -> Self {
        Self {
            unit_label: directory.get_unit(&v.unit_id).map(|u| u.label),
            visit_id: v.visit_id,
            unit_id: v.unit_id,
            entered_at: v.entered_at,
            elapsed_minutes: v.elapsed_minutes,
        }
    }
}

/// Everyone on site, earliest entry first.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PresenceResponse {
    pub count: usize,
    pub entries: Vec<PresenceEntryResponse>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/presence", get(list_presence))
}

/// GET /v1/presence: list visitors currently on site.
#[utoipa::path(
    get,
    path = "/v1/presence",
    responses(
        (status = 200, description = "Visitors on site", body = PresenceResponse),
    ),
    tag = "presence"
)]
pub async fn list_presence(State(state): State<AppState>) -> Json<PresenceResponse> {
    let entries: Vec<PresenceEntryResponse> = state
        .engine
        .presence()
        .into_iter()
        .map(|v| PresenceEntryResponse::from_view(v, state.directory.as_ref()))
        .collect();
    Json(PresenceResponse {
        count: entries.len(),
        entries,
    })
}
