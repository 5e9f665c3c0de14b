//! # Visit Routes
//!
//! - `POST /v1/visits`: pre-authorize a visit; returns the credential token
//!   once, with its QR rendering, unless the visitor is blocked.
//! - `GET /v1/visits/:id`: the visit and its transition log.
//! - `POST /v1/visits/:id/cancel`: cancel before admission.
//! - `POST /v1/visits/:id/exit`: register exit for an admitted visit.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use qrcode::render::svg;
use qrcode::{EcLevel, QrCode};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use gatehouse_core::{Timestamp, UnitId, VisitId, VisitorId};
use gatehouse_engine::{CreateVisitRequest, ExitRecord};
use gatehouse_state::{Visit, VisitKind, VisitStatus};

use crate::error::AppError;
use crate::extractors::{extract_validated_json, optional_text, parse_visit_id, Validate};
use crate::state::AppState;

const MAX_REASON_LEN: usize = 500;

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

/// Request body for visit pre-authorization.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateVisitBody {
    /// Directory id of the visitor.
    pub visitor_id: String,
    /// Directory id of the unit being visited.
    pub unit_id: String,
    /// regular | recurring | delivery | service_provider. Defaults to regular.
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    /// Expected arrival (RFC 3339). Defaults to now.
    #[serde(default)]
    pub expected_at: Option<String>,
    /// Credential validity in hours, 1 to 168. Defaults to the server setting.
    #[serde(default)]
    pub validity_hours: Option<i64>,
}

impl Validate for CreateVisitBody {
    type Output = CreateVisitRequest;

    fn validate(self) -> Result<CreateVisitRequest, AppError> {
        let kind = match self.kind.as_deref().map(str::trim) {
            None | Some("") => VisitKind::default(),
            Some(raw) => raw
                .parse::<VisitKind>()
                .map_err(|e| AppError::Validation(e.to_string()))?,
        };
        let expected_at = self
            .expected_at
            .as_deref()
            .map(Timestamp::parse_lenient)
            .transpose()?;
        // Clamped into u32; the engine reports anything outside 1..=168.
        let validity_hours = self
            .validity_hours
            .map(|h| h.clamp(0, i64::from(u32::MAX)) as u32);
        Ok(CreateVisitRequest {
            visitor_id: VisitorId::new(self.visitor_id)?,
            unit_id: UnitId::new(self.unit_id)?,
            kind,
            reason: optional_text(self.reason, "reason", MAX_REASON_LEN)?,
            expected_at,
            validity_hours,
        })
    }
}

/// One entry of a visit's transition log.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransitionView {
    #[schema(value_type = String)]
    pub from: VisitStatus,
    #[schema(value_type = String)]
    pub to: VisitStatus,
    #[schema(value_type = String)]
    pub at: Timestamp,
    pub reason: Option<String>,
}

/// A visit as returned by the API. The credential digest is never exposed.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VisitResponse {
    #[schema(value_type = String, format = Uuid)]
    pub id: VisitId,
    #[schema(value_type = String)]
    pub visitor_id: VisitorId,
    #[schema(value_type = String)]
    pub unit_id: UnitId,
    #[schema(value_type = String)]
    pub kind: VisitKind,
    #[schema(value_type = String)]
    pub status: VisitStatus,
    pub reason: Option<String>,
    /// Reason recorded with the latest transition (deny, cancel).
    pub status_reason: Option<String>,
    #[schema(value_type = String)]
    pub expected_at: Timestamp,
    #[schema(value_type = String)]
    pub created_at: Timestamp,
    #[schema(value_type = Option<String>)]
    pub valid_until: Option<Timestamp>,
    #[schema(value_type = Option<String>)]
    pub entered_at: Option<Timestamp>,
    #[schema(value_type = Option<String>)]
    pub exited_at: Option<Timestamp>,
    pub duration_minutes: Option<i64>,
    pub credential_used: bool,
    pub transitions: Vec<TransitionView>,
}

impl From<&Visit> for VisitResponse {
    fn from(v: &Visit) -> Self {
        Self {
            id: v.id,
            visitor_id: v.visitor_id.clone(),
            unit_id: v.unit_id.clone(),
            kind: v.kind,
            status: v.status(),
            reason: v.reason.clone(),
            status_reason: v.status_reason().map(str::to_string),
            expected_at: v.expected_at,
            created_at: v.created_at,
            valid_until: v.valid_until(),
            entered_at: v.entered_at(),
            exited_at: v.exited_at(),
            duration_minutes: v.duration_minutes(),
            credential_used: v.credential_used(),
            transitions: v
                .transitions()
                .iter()
                .map(|t| TransitionView {
                    from: t.from,
                    to: t.to,
                    at: t.at,
                    reason: t.reason.clone(),
                })
                .collect(),
        }
    }
}

/// Response to a pre-authorization request.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateVisitResponse {
    #[schema(value_type = String, format = Uuid)]
    pub visit_id: VisitId,
    /// `authorized`, or `denied` for a blocked visitor.
    #[schema(value_type = String)]
    pub status: VisitStatus,
    /// The credential. Shown only here.
    pub token: Option<String>,
    /// The credential as a QR code, an `image/svg+xml` data URI.
    pub qr_code: Option<String>,
    #[schema(value_type = Option<String>)]
    pub valid_until: Option<Timestamp>,
    pub visit: VisitResponse,
}

/// Optional reason for a cancel.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CancelVisitBody {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Response to a registered exit.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ExitResponse {
    #[schema(value_type = String, format = Uuid)]
    pub visit_id: VisitId,
    #[schema(value_type = String)]
    pub unit_id: UnitId,
    #[schema(value_type = String)]
    pub status: VisitStatus,
    #[schema(value_type = String)]
    pub entered_at: Timestamp,
    #[schema(value_type = String)]
    pub exited_at: Timestamp,
    pub duration_minutes: i64,
}

impl From<ExitRecord> for ExitResponse {
    fn from(r: ExitRecord) -> Self {
        Self {
            visit_id: r.visit_id,
            unit_id: r.unit_id,
            status: VisitStatus::Closed,
            entered_at: r.entered_at,
            exited_at: r.exited_at,
            duration_minutes: r.duration_minutes,
        }
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/visits", post(create_visit))
        .route("/v1/visits/:id", get(get_visit))
        .route("/v1/visits/:id/cancel", post(cancel_visit))
        .route("/v1/visits/:id/exit", post(register_exit))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /v1/visits: pre-authorize a visit and issue its credential.
#[utoipa::path(
    post,
    path = "/v1/visits",
    request_body = CreateVisitBody,
    responses(
        (status = 201, description = "Visit authorized (or denied for a blocked visitor)", body = CreateVisitResponse),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "visits"
)]
pub async fn create_visit(
    State(state): State<AppState>,
    body: Result<Json<CreateVisitBody>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateVisitResponse>), AppError> {
    let req = extract_validated_json(body)?;
    let created = state.create_visit(req).await?;

    let visit = &created.visit;
    let qr_code = created.token.as_deref().and_then(qr_data_uri);
    Ok((
        StatusCode::CREATED,
        Json(CreateVisitResponse {
            visit_id: visit.id,
            status: visit.status(),
            valid_until: visit.valid_until(),
            visit: VisitResponse::from(visit),
            token: created.token,
            qr_code,
        }),
    ))
}

/// GET /v1/visits/:id: look up a visit.
#[utoipa::path(
    get,
    path = "/v1/visits/{id}",
    params(("id" = String, Path, description = "Visit ID")),
    responses(
        (status = 200, description = "Visit found", body = VisitResponse),
        (status = 404, description = "Visit not found", body = crate::error::ErrorBody),
    ),
    tag = "visits"
)]
pub async fn get_visit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<VisitResponse>, AppError> {
    let id = parse_visit_id(&id)?;
    let visit = state.engine.get_visit(id)?;
    Ok(Json(VisitResponse::from(&visit)))
}

/// POST /v1/visits/:id/cancel: cancel a pending or authorized visit.
#[utoipa::path(
    post,
    path = "/v1/visits/{id}/cancel",
    params(("id" = String, Path, description = "Visit ID")),
    request_body = CancelVisitBody,
    responses(
        (status = 200, description = "Visit canceled", body = VisitResponse),
        (status = 404, description = "Visit not found", body = crate::error::ErrorBody),
        (status = 409, description = "Visit already admitted or terminal", body = crate::error::ErrorBody),
    ),
    tag = "visits"
)]
pub async fn cancel_visit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<CancelVisitBody>>,
) -> Result<Json<VisitResponse>, AppError> {
    let id = parse_visit_id(&id)?;
    let reason = body.map(|Json(b)| b.reason).unwrap_or_default();
    let reason = optional_text(reason, "reason", MAX_REASON_LEN)?;

    let done = state
        .commit_visit(id, |engine| engine.cancel_visit(id, reason))
        .await?;
    Ok(Json(VisitResponse::from(&done.visit)))
}

/// POST /v1/visits/:id/exit: register the visitor leaving.
#[utoipa::path(
    post,
    path = "/v1/visits/{id}/exit",
    params(("id" = String, Path, description = "Visit ID")),
    responses(
        (status = 200, description = "Exit registered", body = ExitResponse),
        (status = 404, description = "Visit not found", body = crate::error::ErrorBody),
        (status = 409, description = "Visit already closed or never admitted", body = crate::error::ErrorBody),
    ),
    tag = "visits"
)]
pub async fn register_exit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ExitResponse>, AppError> {
    let id = parse_visit_id(&id)?;
    let (exit, _) = state
        .commit_visit(id, |engine| engine.register_exit(id))
        .await?;
    tracing::info!(
        visit_id = %exit.visit_id,
        unit_id = %exit.unit_id,
        duration_minutes = exit.duration_minutes,
        "exit registered"
    );
    Ok(Json(ExitResponse::from(exit)))
}

/// Render a credential as a QR code data URI. High error correction, so a
/// scuffed phone screen still scans.
fn qr_data_uri(token: &str) -> Option<String> {
    match QrCode::with_error_correction_level(token.as_bytes(), EcLevel::H) {
        Ok(code) => {
            let image = code.render::<svg::Color>().min_dimensions(240, 240).build();
            Some(format!("data:image/svg+xml;base64,{}", STANDARD.encode(image)))
        }
        Err(e) => {
            tracing::warn!(error = %e, "credential could not be rendered as QR code");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(json: serde_json::Value) -> CreateVisitBody {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn minimal_body_takes_defaults() {
        let req = body(serde_json::json!({"visitor_id": "v-1", "unit_id": "A-101"}))
            .validate()
            .unwrap();
        assert_eq!(req.kind, VisitKind::Regular);
        assert!(req.validity_hours.is_none());
        assert!(req.expected_at.is_none());
    }

    #[test]
    fn full_body_is_converted() {
        let req = body(serde_json::json!({
            "visitor_id": "v-1",
            "unit_id": "A-101",
            "kind": "service_provider",
            "reason": "  plumbing  ",
            "expected_at": "2026-03-01T09:00:00-03:00",
            "validity_hours": 8
        }))
        .validate()
        .unwrap();
        assert_eq!(req.kind, VisitKind::ServiceProvider);
        assert_eq!(req.reason.as_deref(), Some("plumbing"));
        assert_eq!(
            req.expected_at,
            Some(Timestamp::parse("2026-03-01T12:00:00Z").unwrap())
        );
        assert_eq!(req.validity_hours, Some(8));
    }

    #[test]
    fn negative_validity_reaches_engine_as_out_of_range() {
        let req = body(serde_json::json!({"visitor_id": "v-1", "unit_id": "A-101", "validity_hours": -5}))
            .validate()
            .unwrap();
        assert_eq!(req.validity_hours, Some(0));
    }

    #[test]
    fn bad_fields_are_validation_errors() {
        for json in [
            serde_json::json!({"visitor_id": "", "unit_id": "A-101"}),
            serde_json::json!({"visitor_id": "v-1", "unit_id": "A 101"}),
            serde_json::json!({"visitor_id": "v-1", "unit_id": "A-101", "kind": "vip"}),
            serde_json::json!({"visitor_id": "v-1", "unit_id": "A-101", "expected_at": "tomorrow"}),
        ] {
            assert!(
                matches!(body(json.clone()).validate(), Err(AppError::Validation(_))),
                "{json}"
            );
        }
    }

    #[test]
    fn qr_code_is_an_svg_data_uri() {
        let uri = qr_data_uri("eyJ2IjoxfQ.c2lnbmF0dXJl").unwrap();
        let encoded = uri.strip_prefix("data:image/svg+xml;base64,").unwrap();
        let svg = String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap();
        assert!(svg.contains("<svg"), "{svg}");
        assert!(svg.contains("</svg>"));
    }

    #[test]
    fn oversized_payload_renders_nothing() {
        assert!(qr_data_uri(&"x".repeat(4_000)).is_none());
    }
}
