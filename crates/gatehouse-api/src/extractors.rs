//! # Request Extraction
//!
//! JSON bodies and path identifiers, with rejections mapped onto
//! [`AppError`] so every failure uses the common error body.

use axum::extract::rejection::JsonRejection;
use axum::Json;

use gatehouse_core::{CorrespondenceId, VisitId};

use crate::error::AppError;

/// Request types that turn themselves into a validated domain request.
pub trait Validate {
    type Output;

    fn validate(self) -> Result<Self::Output, AppError>;
}

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract a JSON body and run its [`Validate`] conversion.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T::Output, AppError> {
    extract_json(result)?.validate()
}

pub fn parse_visit_id(raw: &str) -> Result<VisitId, AppError> {
    Ok(VisitId::parse(raw)?)
}

pub fn parse_correspondence_id(raw: &str) -> Result<CorrespondenceId, AppError> {
    Ok(CorrespondenceId::parse(raw)?)
}

/// Optional free text: trimmed, empty becomes `None`, length capped.
pub fn optional_text(
    value: Option<String>,
    field: &str,
    max_len: usize,
) -> Result<Option<String>, AppError> {
    match value.map(|v| v.trim().to_string()) {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) if v.chars().count() > max_len => Err(AppError::Validation(format!(
            "{field} must be at most {max_len} characters"
        ))),
        Some(v) => Ok(Some(v)),
    }
}
