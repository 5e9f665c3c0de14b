//! Shared transition bookkeeping.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use gatehouse_core::Timestamp;

/// One accepted status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord<S> {
    /// Status before the transition.
    pub from: S,
    /// Status after the transition.
    pub to: S,
    /// When the transition happened.
    pub at: Timestamp,
    /// Free-text reason, when the caller supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A stored status or kind string did not name a known variant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} \"{value}\"")]
pub struct ParseStatusError {
    /// What was being parsed.
    pub kind: &'static str,
    /// The rejected string.
    pub value: String,
}
