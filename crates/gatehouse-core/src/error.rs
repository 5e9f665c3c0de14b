//! # Error Types
//!
//! Foundational errors shared by every gatehouse crate. Higher layers wrap
//! these in their own `thiserror` enums.

use thiserror::Error;

/// Errors during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Float values are not permitted in canonical representations.
    #[error("float values are not permitted in canonical representations: {0}")]
    FloatRejected(f64),

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Domain primitive validation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A directory key was empty.
    #[error("{kind} must be non-empty")]
    EmptyIdentifier {
        /// Which identifier kind (e.g. "visitor id").
        kind: &'static str,
    },

    /// A directory key contained characters outside the allowed set or was too long.
    #[error("invalid {kind}: \"{value}\" (expected 1-64 characters of [A-Za-z0-9._:-])")]
    InvalidIdentifier {
        /// Which identifier kind.
        kind: &'static str,
        /// The rejected value.
        value: String,
    },

    /// A UUID-based identifier could not be parsed.
    #[error("invalid {kind}: \"{value}\" (expected a UUID)")]
    InvalidUuid {
        /// Which identifier kind.
        kind: &'static str,
        /// The rejected value.
        value: String,
    },

    /// Timestamp string is not valid UTC ISO 8601.
    #[error("invalid timestamp: \"{value}\" ({reason})")]
    InvalidTimestamp {
        /// The string that failed to parse.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}
