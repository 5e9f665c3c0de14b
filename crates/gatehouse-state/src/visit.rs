//! # Visit Lifecycle State Machine
//!
//! ## States
//!
//! ```text
//! Pending ──▶ Authorized ──▶ Admitted ──▶ Closed (terminal)
//!    │            │
//!    │            └──▶ Canceled (terminal)
//!    ├──▶ Denied (terminal)
//!    └──▶ Canceled (terminal)
//! ```
//!
//! ## Record invariants
//!
//! - `entered_at` is set iff status is `Admitted` or `Closed`.
//! - `exited_at` is set iff status is `Closed`.
//! - `credential_used` flips to true exactly once, on entry to `Admitted`.
//! - `valid_until` is written once, on entry to `Authorized`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use gatehouse_core::{Timestamp, UnitId, VisitId, VisitorId};

use crate::transition::{ParseStatusError, TransitionRecord};

// ─── Visit Status ────────────────────────────────────────────────────

/// The lifecycle status of a visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
    /// Requested, not yet decided.
    Pending,
    /// Credential issued, visitor not yet on site.
    Authorized,
    /// Request rejected (terminal).
    Denied,
    /// Visitor is on site.
    Admitted,
    /// Visitor has left (terminal).
    Closed,
    /// Withdrawn or expired unused (terminal).
    Canceled,
}

impl VisitStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [VisitStatus; 6] = [
        Self::Pending,
        Self::Authorized,
        Self::Denied,
        Self::Admitted,
        Self::Closed,
        Self::Canceled,
    ];

    /// The transition table.
    pub fn can_transition_to(self, to: VisitStatus) -> bool {
        use VisitStatus::*;
        match (self, to) {
            (Pending, Authorized) | (Pending, Denied) | (Pending, Canceled) => true,
            (Authorized, Admitted) | (Authorized, Canceled) => true,
            (Admitted, Closed) => true,
            (Pending, _) | (Authorized, _) | (Admitted, _) => false,
            (Denied, _) | (Closed, _) | (Canceled, _) => false,
        }
    }

    /// Whether this status is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Denied | Self::Closed | Self::Canceled)
    }

    /// Wire and storage name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Authorized => "authorized",
            Self::Denied => "denied",
            Self::Admitted => "admitted",
            Self::Closed => "closed",
            Self::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for VisitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Authorized => "AUTHORIZED",
            Self::Denied => "DENIED",
            Self::Admitted => "ADMITTED",
            Self::Closed => "CLOSED",
            Self::Canceled => "CANCELED",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for VisitStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| ParseStatusError {
                kind: "visit status",
                value: s.to_string(),
            })
    }
}

// ─── Visit Kind ──────────────────────────────────────────────────────

/// Category of visit, as recorded by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitKind {
    /// One-off social visit.
    #[default]
    Regular,
    /// A visitor who comes on a schedule (cleaner, caregiver).
    Recurring,
    /// Courier or food delivery.
    Delivery,
    /// Contractor or technician.
    ServiceProvider,
}

impl VisitKind {
    /// Wire and storage name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Recurring => "recurring",
            Self::Delivery => "delivery",
            Self::ServiceProvider => "service_provider",
        }
    }
}

impl std::str::FromStr for VisitKind {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Regular, Self::Recurring, Self::Delivery, Self::ServiceProvider]
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ParseStatusError {
                kind: "visit kind",
                value: s.to_string(),
            })
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors raised by visit transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VisitError {
    /// The requested edge is not in the transition table.
    #[error("invalid visit transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status.
        from: VisitStatus,
        /// Attempted target status.
        to: VisitStatus,
    },

    /// Exit was already registered for this visit.
    #[error("visit is already closed")]
    AlreadyClosed,

    /// The single-use credential has already been consumed.
    #[error("credential for this visit was already used")]
    CredentialAlreadyUsed,
}

// ─── Visit ───────────────────────────────────────────────────────────

/// Parameters of a new visit request.
#[derive(Debug, Clone)]
pub struct NewVisit {
    /// Directory key of the visitor.
    pub visitor_id: VisitorId,
    /// Directory key of the unit being visited.
    pub unit_id: UnitId,
    /// Visit category.
    pub kind: VisitKind,
    /// Free-text purpose of the visit.
    pub reason: Option<String>,
    /// Expected arrival; defaults to creation time.
    pub expected_at: Option<Timestamp>,
}

/// A visit record with its lifecycle status and transition history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visit {
    pub id: VisitId,
    pub visitor_id: VisitorId,
    pub unit_id: UnitId,
    pub kind: VisitKind,
    status: VisitStatus,
    /// Purpose given at request time.
    pub reason: Option<String>,
    pub expected_at: Timestamp,
    pub created_at: Timestamp,
    valid_until: Option<Timestamp>,
    entered_at: Option<Timestamp>,
    exited_at: Option<Timestamp>,
    duration_minutes: Option<i64>,
    /// SHA-256 hex of the issued token. Never the token itself.
    credential_token_hash: Option<String>,
    credential_used: bool,
    transitions: Vec<TransitionRecord<VisitStatus>>,
}

impl Visit {
    /// Create a visit in `Pending`.
    pub fn new(req: NewVisit, now: Timestamp) -> Self {
        Self {
            id: VisitId::new(),
            visitor_id: req.visitor_id,
            unit_id: req.unit_id,
            kind: req.kind,
            status: VisitStatus::Pending,
            reason: req.reason,
            expected_at: req.expected_at.unwrap_or(now),
            created_at: now,
            valid_until: None,
            entered_at: None,
            exited_at: None,
            duration_minutes: None,
            credential_token_hash: None,
            credential_used: false,
            transitions: Vec::new(),
        }
    }

    pub fn status(&self) -> VisitStatus {
        self.status
    }

    pub fn valid_until(&self) -> Option<Timestamp> {
        self.valid_until
    }

    pub fn entered_at(&self) -> Option<Timestamp> {
        self.entered_at
    }

    pub fn exited_at(&self) -> Option<Timestamp> {
        self.exited_at
    }

    pub fn duration_minutes(&self) -> Option<i64> {
        self.duration_minutes
    }

    pub fn credential_token_hash(&self) -> Option<&str> {
        self.credential_token_hash.as_deref()
    }

    pub fn credential_used(&self) -> bool {
        self.credential_used
    }

    /// Ordered log of accepted transitions.
    pub fn transitions(&self) -> &[TransitionRecord<VisitStatus>] {
        &self.transitions
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The reason attached to the most recent transition, if any. For a
    /// denied or canceled visit this is why.
    pub fn status_reason(&self) -> Option<&str> {
        self.transitions.last().and_then(|t| t.reason.as_deref())
    }

    /// Issue accepted (PENDING → AUTHORIZED).
    pub fn authorize(
        &mut self,
        valid_until: Timestamp,
        token_hash: String,
        now: Timestamp,
    ) -> Result<(), VisitError> {
        self.require_edge(VisitStatus::Authorized)?;
        self.valid_until = Some(valid_until);
        self.credential_token_hash = Some(token_hash);
        self.do_transition(VisitStatus::Authorized, now, None);
        Ok(())
    }

    /// Request rejected (PENDING → DENIED).
    pub fn deny(&mut self, reason: impl Into<String>, now: Timestamp) -> Result<(), VisitError> {
        self.require_edge(VisitStatus::Denied)?;
        self.do_transition(VisitStatus::Denied, now, Some(reason.into()));
        Ok(())
    }

    /// Withdraw the visit (PENDING or AUTHORIZED → CANCELED).
    pub fn cancel(&mut self, reason: Option<String>, now: Timestamp) -> Result<(), VisitError> {
        self.require_edge(VisitStatus::Canceled)?;
        self.do_transition(VisitStatus::Canceled, now, reason);
        Ok(())
    }

    /// Credential accepted at the gate (AUTHORIZED → ADMITTED).
    ///
    /// Consumes the single-use credential.
    pub fn admit(&mut self, now: Timestamp) -> Result<(), VisitError> {
        if self.credential_used {
            return Err(VisitError::CredentialAlreadyUsed);
        }
        self.require_edge(VisitStatus::Admitted)?;
        self.credential_used = true;
        self.entered_at = Some(now);
        self.do_transition(VisitStatus::Admitted, now, None);
        Ok(())
    }

    /// Exit registered (ADMITTED → CLOSED). Returns the whole minutes spent
    /// on site.
    pub fn close(&mut self, now: Timestamp) -> Result<i64, VisitError> {
        if self.status == VisitStatus::Closed {
            return Err(VisitError::AlreadyClosed);
        }
        self.require_edge(VisitStatus::Closed)?;
        let entered = self.entered_at.unwrap_or(now);
        let minutes = now.whole_minutes_since(&entered);
        self.exited_at = Some(now);
        self.duration_minutes = Some(minutes);
        self.do_transition(VisitStatus::Closed, now, None);
        Ok(minutes)
    }

    /// Check the record invariants. Returns the first violated one.
    pub fn check_invariants(&self) -> Result<(), String> {
        let inside_or_done = matches!(self.status, VisitStatus::Admitted | VisitStatus::Closed);
        if self.entered_at.is_some() != inside_or_done {
            return Err(format!("entered_at presence does not match status {}", self.status));
        }
        if self.exited_at.is_some() != (self.status == VisitStatus::Closed) {
            return Err(format!("exited_at presence does not match status {}", self.status));
        }
        if self.credential_used != inside_or_done {
            return Err(format!("credential_used does not match status {}", self.status));
        }
        let authorized_once = self.transitions.iter().any(|t| t.to == VisitStatus::Authorized);
        if self.valid_until.is_some() != authorized_once {
            return Err("valid_until set without authorization".to_string());
        }
        let mut at = VisitStatus::Pending;
        for t in &self.transitions {
            if t.from != at || !at.can_transition_to(t.to) {
                return Err(format!("transition log has illegal edge {} -> {}", t.from, t.to));
            }
            at = t.to;
        }
        if at != self.status {
            return Err("transition log does not end at current status".to_string());
        }
        Ok(())
    }

    fn require_edge(&self, to: VisitStatus) -> Result<(), VisitError> {
        if !self.status.can_transition_to(to) {
            return Err(VisitError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        Ok(())
    }

    fn do_transition(&mut self, to: VisitStatus, at: Timestamp, reason: Option<String>) {
        self.transitions.push(TransitionRecord {
            from: self.status,
            to,
            at,
            reason,
        });
        self.status = to;
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
