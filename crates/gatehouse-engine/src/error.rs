//! # Engine Errors
//!
//! One taxonomy for every engine operation. The API maps each variant to an
//! HTTP class; security variants carry detail that is logged but never
//! returned to callers.

use thiserror::Error;

use gatehouse_core::VisitId;
use gatehouse_crypto::CryptoError;
use gatehouse_state::{CorrespondenceError, VisitError};

use crate::store::StoreError;

/// Why a credential presentation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityReason {
    /// The token could not be decoded.
    Malformed,
    /// The tag does not match the payload.
    SignatureMismatch,
    /// Presented after its expiry instant.
    Expired,
    /// The single-use credential was already consumed.
    Replayed,
    /// Scanned at a gate bound to a different unit.
    UnitMismatch,
    /// Well-signed, but not the credential on record for the visit.
    UnknownCredential,
}

impl SecurityReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::SignatureMismatch => "signature_mismatch",
            Self::Expired => "expired",
            Self::Replayed => "replayed",
            Self::UnitMismatch => "unit_mismatch",
            Self::UnknownCredential => "unknown_credential",
        }
    }
}

impl std::fmt::Display for SecurityReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by engine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Caller input was rejected.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The referenced record does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Record kind ("visit", "correspondence").
        kind: &'static str,
        /// The identifier that did not resolve.
        id: String,
    },

    /// The operation is not allowed from the record's current status.
    #[error("cannot move from {current} to {attempted}")]
    InvalidTransition {
        /// Current status (storage name).
        current: &'static str,
        /// Attempted status (storage name).
        attempted: &'static str,
    },

    /// A credential presentation was refused.
    #[error("credential rejected: {reason}")]
    Security {
        /// The visit named by the payload, when the tag verified.
        visit_id: Option<VisitId>,
        reason: SecurityReason,
    },

    /// Exit was already registered.
    #[error("visit {0} is already closed")]
    AlreadyClosed(VisitId),

    /// Contention or a transient storage failure. Safe to retry.
    #[error("retryable: {0}")]
    Retryable(String),
}

impl EngineError {
    pub(crate) fn from_store(err: StoreError, kind: &'static str, id: String) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound { kind, id },
            StoreError::LockTimeout(d) => {
                Self::Retryable(format!("{kind} {id} is busy (lock wait exceeded {d:?})"))
            }
        }
    }

    pub(crate) fn security(visit_id: Option<VisitId>, reason: SecurityReason) -> Self {
        Self::Security { visit_id, reason }
    }
}

impl From<VisitError> for EngineError {
    fn from(err: VisitError) -> Self {
        match err {
            VisitError::InvalidTransition { from, to } => Self::InvalidTransition {
                current: from.as_str(),
                attempted: to.as_str(),
            },
            // Callers translate these with the visit id in hand; this arm
            // only fires if one slips through.
            VisitError::AlreadyClosed => Self::InvalidTransition {
                current: "closed",
                attempted: "closed",
            },
            VisitError::CredentialAlreadyUsed => Self::security(None, SecurityReason::Replayed),
        }
    }
}

impl From<CorrespondenceError> for EngineError {
    fn from(err: CorrespondenceError) -> Self {
        match err {
            CorrespondenceError::InvalidTransition { from, to } => Self::InvalidTransition {
                current: from.as_str(),
                attempted: to.as_str(),
            },
            other @ (CorrespondenceError::SignatureTooLarge { .. }
            | CorrespondenceError::EmptyField(_)) => Self::Validation(other.to_string()),
        }
    }
}

impl From<CryptoError> for SecurityReason {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::SignatureMismatch => Self::SignatureMismatch,
            CryptoError::Malformed(_) | CryptoError::KeyError(_) | CryptoError::Canonicalization(_) => {
                Self::Malformed
            }
        }
    }
}
