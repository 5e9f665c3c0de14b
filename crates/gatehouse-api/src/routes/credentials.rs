//! # Gate Credential Validation
//!
//! `POST /v1/credentials/validate` is what a gate terminal calls after
//! scanning a QR code. Success admits the visitor. Every refusal is a
//! generic 403; the engine logs the precise reason.
//!
//! An expired credential cancels its visit as a side effect. That
//! cancellation is written through even though the request fails.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use gatehouse_core::{Timestamp, UnitId, VisitId};
use gatehouse_crypto::decode_unverified;
use gatehouse_engine::VisitEngine;
use gatehouse_state::VisitStatus;

use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::state::AppState;

/// Longest token accepted before decoding is attempted.
const MAX_TOKEN_LEN: usize = 4_096;

/// A scanned credential.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ValidateCredentialBody {
    /// The raw token read from the QR code.
    pub token: String,
    /// Unit the scanning gate serves, when the gate is unit-bound.
    #[serde(default)]
    pub unit_id: Option<String>,
}

/// Validated scan request.
#[derive(Debug)]
pub struct ScanRequest {
    pub token: String,
    pub unit_hint: Option<UnitId>,
}

impl Validate for ValidateCredentialBody {
    type Output = ScanRequest;

    fn validate(self) -> Result<ScanRequest, AppError> {
        if self.token.trim().is_empty() {
            return Err(AppError::Validation("token must not be empty".into()));
        }
        if self.token.len() > MAX_TOKEN_LEN {
            return Err(AppError::Validation(format!(
                "token must be at most {MAX_TOKEN_LEN} bytes"
            )));
        }
        let unit_hint = match self.unit_id {
            Some(u) if !u.trim().is_empty() => Some(UnitId::new(u)?),
            _ => None,
        };
        Ok(ScanRequest {
            token: self.token,
            unit_hint,
        })
    }
}

/// An admitted visit.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AdmissionResponse {
    #[schema(value_type = String, format = Uuid)]
    pub visit_id: VisitId,
    /// Always `admitted`.
    #[schema(value_type = String)]
    pub status: VisitStatus,
    #[schema(value_type = String)]
    pub unit_id: UnitId,
    #[schema(value_type = String)]
    pub entered_at: Timestamp,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/credentials/validate", post(validate_credential))
}

/// POST /v1/credentials/validate: admit the holder of a valid credential.
#[utoipa::path(
    post,
    path = "/v1/credentials/validate",
    request_body = ValidateCredentialBody,
    responses(
        (status = 200, description = "Credential accepted; visitor admitted", body = AdmissionResponse),
        (status = 403, description = "Credential refused", body = crate::error::ErrorBody),
        (status = 409, description = "Visit is not awaiting admission", body = crate::error::ErrorBody),
        (status = 503, description = "Visit busy; retry", body = crate::error::ErrorBody),
    ),
    tag = "credentials"
)]
pub async fn validate_credential(
    State(state): State<AppState>,
    body: Result<Json<ValidateCredentialBody>, JsonRejection>,
) -> Result<Json<AdmissionResponse>, AppError> {
    let scan = extract_validated_json(body)?;
    let admit = |engine: &VisitEngine| engine.validate_credential(&scan.token, scan.unit_hint.as_ref());

    // The gate key is read from the unverified payload; the engine still
    // checks the tag before anything changes.
    let done = match decode_unverified(&scan.token) {
        Ok(payload) => state.commit_visit(payload.visit_id, admit).await?,
        Err(_) => admit(&*state.engine)?,
    };
    let visit = done.visit;
    let entered_at = visit.entered_at().ok_or_else(|| {
        AppError::Internal(format!("admitted visit {} has no entry time", visit.id))
    })?;
    Ok(Json(AdmissionResponse {
        visit_id: visit.id,
        status: visit.status(),
        unit_id: visit.unit_id,
        entered_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_or_oversized_tokens_are_rejected() {
        for token in [String::new(), "  ".into(), "a".repeat(MAX_TOKEN_LEN + 1)] {
            let body = ValidateCredentialBody {
                token,
                unit_id: None,
            };
            assert!(matches!(body.validate(), Err(AppError::Validation(_))));
        }
    }

    #[test]
    fn unit_hint_is_parsed() {
        let scan = ValidateCredentialBody {
            token: "abc.def".into(),
            unit_id: Some("B-1504".into()),
        }
        .validate()
        .unwrap();
        assert_eq!(scan.unit_hint, Some(UnitId::new("B-1504").unwrap()));

        let scan = ValidateCredentialBody {
            token: "abc.def".into(),
            unit_id: Some(String::new()),
        }
        .validate()
        .unwrap();
        assert!(scan.unit_hint.is_none());
    }
}
