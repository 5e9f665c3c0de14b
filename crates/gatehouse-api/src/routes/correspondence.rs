//! # Correspondence Custody Routes
//!
//! Mail and parcels held at the desk. No cryptography: the signature blob
//! captured at hand-off is stored as given and never verified.
//!
//! - `POST /v1/correspondence`: log a received item.
//! - `GET /v1/correspondence/awaiting`: items awaiting pickup, per unit.
//! - `GET /v1/correspondence/:id`
//! - `POST /v1/correspondence/:id/deliver`
//! - `POST /v1/correspondence/:id/return`
//! - `POST /v1/correspondence/:id/not-collected`

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use gatehouse_core::{CorrespondenceId, Timestamp, UnitId};
use gatehouse_engine::UnitBacklog;
use gatehouse_state::{
    Correspondence, CorrespondenceKind, CorrespondenceStatus, Delivery, NewCorrespondence,
};

use crate::error::AppError;
use crate::extractors::{extract_validated_json, optional_text, parse_correspondence_id, Validate};
use crate::state::AppState;

const MAX_TEXT_LEN: usize = 200;
const MAX_NOTES_LEN: usize = 1_000;

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

/// A received item.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReceiveCorrespondenceBody {
    pub unit_id: String,
    /// Name on the label.
    pub recipient: String,
    /// letter | envelope | small_box | medium_box | large_box | express | telegram | notice
    pub kind: String,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub tracking_code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Staff member who took the item in.
    pub received_by: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Validate for ReceiveCorrespondenceBody {
    type Output = NewCorrespondence;

    fn validate(self) -> Result<NewCorrespondence, AppError> {
        let kind = self
            .kind
            .trim()
            .parse::<CorrespondenceKind>()
            .map_err(|e| AppError::Validation(e.to_string()))?;
        Ok(NewCorrespondence {
            unit_id: UnitId::new(self.unit_id)?,
            recipient: required_text(self.recipient, "recipient")?,
            kind,
            sender: optional_text(self.sender, "sender", MAX_TEXT_LEN)?,
            tracking_code: optional_text(self.tracking_code, "tracking_code", MAX_TEXT_LEN)?,
            description: optional_text(self.description, "description", MAX_TEXT_LEN)?,
            received_by: required_text(self.received_by, "received_by")?,
            notes: optional_text(self.notes, "notes", MAX_NOTES_LEN)?,
        })
    }
}

/// Hand-off to a resident.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DeliverCorrespondenceBody {
    /// Person who collected the item.
    pub delivered_to: String,
    /// Staff member who handed it over.
    pub delivered_by: String,
    /// Opaque captured signature, stored unverified (at most 512 KiB).
    #[serde(default)]
    pub signature_blob: Option<String>,
}

impl Validate for DeliverCorrespondenceBody {
    type Output = Delivery;

    fn validate(self) -> Result<Delivery, AppError> {
        Ok(Delivery {
            delivered_to: required_text(self.delivered_to, "delivered_to")?,
            delivered_by: required_text(self.delivered_by, "delivered_by")?,
            signature_blob: self.signature_blob.filter(|s| !s.is_empty()),
        })
    }
}

/// Optional reason for a return or a not-collected mark.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CloseCorrespondenceBody {
    #[serde(default)]
    pub reason: Option<String>,
}

/// A correspondence item as returned by the API.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CorrespondenceResponse {
    #[schema(value_type = String, format = Uuid)]
    pub id: CorrespondenceId,
    #[schema(value_type = String)]
    pub unit_id: UnitId,
    pub recipient: String,
    #[schema(value_type = String)]
    pub kind: CorrespondenceKind,
    #[schema(value_type = String)]
    pub status: CorrespondenceStatus,
    pub sender: Option<String>,
    pub tracking_code: Option<String>,
    pub description: Option<String>,
    pub received_by: String,
    #[schema(value_type = String)]
    pub received_at: Timestamp,
    pub delivered_to: Option<String>,
    pub delivered_by: Option<String>,
    #[schema(value_type = Option<String>)]
    pub delivered_at: Option<Timestamp>,
    pub signature_blob: Option<String>,
    pub notes: Option<String>,
    /// Reason recorded with the closing transition.
    pub status_reason: Option<String>,
}

impl From<&Correspondence> for CorrespondenceResponse {
    fn from(c: &Correspondence) -> Self {
        Self {
            id: c.id,
            unit_id: c.unit_id.clone(),
            recipient: c.recipient.clone(),
            kind: c.kind,
            status: c.status(),
            sender: c.sender.clone(),
            tracking_code: c.tracking_code.clone(),
            description: c.description.clone(),
            received_by: c.received_by.clone(),
            received_at: c.received_at,
            delivered_to: c.delivered_to().map(str::to_string),
            delivered_by: c.delivered_by().map(str::to_string),
            delivered_at: c.delivered_at(),
            signature_blob: c.signature_blob().map(str::to_string),
            notes: c.notes.clone(),
            status_reason: c.transitions().last().and_then(|t| t.reason.clone()),
        }
    }
}

/// Awaiting-pickup count for one unit.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UnitBacklogResponse {
    #[schema(value_type = String)]
    pub unit_id: UnitId,
    pub awaiting: usize,
}

/// Everything awaiting pickup.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AwaitingResponse {
    pub count: usize,
    pub by_unit: Vec<UnitBacklogResponse>,
}

fn required_text(value: String, field: &str) -> Result<String, AppError> {
    optional_text(Some(value), field, MAX_TEXT_LEN)?
        .ok_or_else(|| AppError::Validation(format!("{field} must not be empty")))
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/correspondence", post(receive_correspondence))
        .route("/v1/correspondence/awaiting", get(awaiting_pickup))
        .route("/v1/correspondence/:id", get(get_correspondence))
        .route("/v1/correspondence/:id/deliver", post(deliver_correspondence))
        .route("/v1/correspondence/:id/return", post(return_correspondence))
        .route("/v1/correspondence/:id/not-collected", post(mark_not_collected))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /v1/correspondence: log a received item.
#[utoipa::path(
    post,
    path = "/v1/correspondence",
    request_body = ReceiveCorrespondenceBody,
    responses(
        (status = 201, description = "Item logged, awaiting pickup", body = CorrespondenceResponse),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "correspondence"
)]
pub async fn receive_correspondence(
    State(state): State<AppState>,
    body: Result<Json<ReceiveCorrespondenceBody>, JsonRejection>,
) -> Result<(StatusCode, Json<CorrespondenceResponse>), AppError> {
    let req = extract_validated_json(body)?;
    let item = state.receive_correspondence(req).await?;
    tracing::info!(correspondence_id = %item.id, unit_id = %item.unit_id, kind = item.kind.as_str(), "correspondence received");
    Ok((StatusCode::CREATED, Json(CorrespondenceResponse::from(&item))))
}

/// GET /v1/correspondence/awaiting: totals of items awaiting pickup.
#[utoipa::path(
    get,
    path = "/v1/correspondence/awaiting",
    responses((status = 200, description = "Awaiting-pickup totals", body = AwaitingResponse)),
    tag = "correspondence"
)]
pub async fn awaiting_pickup(State(state): State<AppState>) -> Json<AwaitingResponse> {
    let by_unit: Vec<UnitBacklogResponse> = state
        .custody
        .awaiting_by_unit()
        .into_iter()
        .map(|UnitBacklog { unit_id, awaiting }| UnitBacklogResponse { unit_id, awaiting })
        .collect();
    Json(AwaitingResponse {
        count: by_unit.iter().map(|u| u.awaiting).sum(),
        by_unit,
    })
}

/// GET /v1/correspondence/:id
#[utoipa::path(
    get,
    path = "/v1/correspondence/{id}",
    params(("id" = String, Path, description = "Correspondence ID")),
    responses(
        (status = 200, description = "Item found", body = CorrespondenceResponse),
        (status = 404, description = "Item not found", body = crate::error::ErrorBody),
    ),
    tag = "correspondence"
)]
pub async fn get_correspondence(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CorrespondenceResponse>, AppError> {
    let id = parse_correspondence_id(&id)?;
    let item = state.custody.get(id)?;
    Ok(Json(CorrespondenceResponse::from(&item)))
}

/// POST /v1/correspondence/:id/deliver: hand the item over.
#[utoipa::path(
    post,
    path = "/v1/correspondence/{id}/deliver",
    params(("id" = String, Path, description = "Correspondence ID")),
    request_body = DeliverCorrespondenceBody,
    responses(
        (status = 200, description = "Item delivered", body = CorrespondenceResponse),
        (status = 404, description = "Item not found", body = crate::error::ErrorBody),
        (status = 409, description = "Item no longer awaiting pickup", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "correspondence"
)]
pub async fn deliver_correspondence(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<DeliverCorrespondenceBody>, JsonRejection>,
) -> Result<Json<CorrespondenceResponse>, AppError> {
    let id = parse_correspondence_id(&id)?;
    let delivery = extract_validated_json(body)?;
    let item = state
        .commit_correspondence(id, |custody| custody.deliver(id, delivery))
        .await?;
    Ok(Json(CorrespondenceResponse::from(&item)))
}

/// POST /v1/correspondence/:id/return: send the item back.
#[utoipa::path(
    post,
    path = "/v1/correspondence/{id}/return",
    params(("id" = String, Path, description = "Correspondence ID")),
    request_body = CloseCorrespondenceBody,
    responses(
        (status = 200, description = "Item returned to sender", body = CorrespondenceResponse),
        (status = 404, description = "Item not found", body = crate::error::ErrorBody),
        (status = 409, description = "Item no longer awaiting pickup", body = crate::error::ErrorBody),
    ),
    tag = "correspondence"
)]
pub async fn return_correspondence(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<CloseCorrespondenceBody>>,
) -> Result<Json<CorrespondenceResponse>, AppError> {
    let id = parse_correspondence_id(&id)?;
    let reason = close_reason(body)?;
    let item = state
        .commit_correspondence(id, |custody| custody.return_to_sender(id, reason))
        .await?;
    Ok(Json(CorrespondenceResponse::from(&item)))
}

/// POST /v1/correspondence/:id/not-collected: the resident never came.
#[utoipa::path(
    post,
    path = "/v1/correspondence/{id}/not-collected",
    params(("id" = String, Path, description = "Correspondence ID")),
    request_body = CloseCorrespondenceBody,
    responses(
        (status = 200, description = "Item marked not collected", body = CorrespondenceResponse),
        (status = 404, description = "Item not found", body = crate::error::ErrorBody),
        (status = 409, description = "Item no longer awaiting pickup", body = crate::error::ErrorBody),
    ),
    tag = "correspondence"
)]
pub async fn mark_not_collected(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<CloseCorrespondenceBody>>,
) -> Result<Json<CorrespondenceResponse>, AppError> {
    let id = parse_correspondence_id(&id)?;
    let reason = close_reason(body)?;
    let item = state
        .commit_correspondence(id, |custody| custody.mark_not_collected(id, reason))
        .await?;
    Ok(Json(CorrespondenceResponse::from(&item)))
}

fn close_reason(body: Option<Json<CloseCorrespondenceBody>>) -> Result<Option<String>, AppError> {
    let reason = body.and_then(|Json(b)| b.reason);
    optional_text(reason, "reason", MAX_NOTES_LEN)
}
