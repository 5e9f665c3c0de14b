//! # Correspondence Custody State Machine
//!
//! ```text
//! AwaitingPickup ──▶ Delivered    (terminal)
//!        ├─────────▶ Returned     (terminal)
//!        └─────────▶ NotCollected (terminal)
//! ```
//!
//! There is no cryptography here. A delivery may carry a captured signature
//! image, which is stored as an opaque blob and never verified.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use gatehouse_core::{CorrespondenceId, Timestamp, UnitId};

use crate::transition::{ParseStatusError, TransitionRecord};

/// Largest accepted signature blob, in bytes.
pub const MAX_SIGNATURE_BLOB_BYTES: usize = 512 * 1024;

/// Custody status of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrespondenceStatus {
    /// Received at the gate, waiting for the resident.
    AwaitingPickup,
    /// Handed to the resident or an authorized person (terminal).
    Delivered,
    /// Sent back to the sender (terminal).
    Returned,
    /// Never collected (terminal).
    NotCollected,
}

impl CorrespondenceStatus {
    pub const ALL: [CorrespondenceStatus; 4] = [
        Self::AwaitingPickup,
        Self::Delivered,
        Self::Returned,
        Self::NotCollected,
    ];

    /// The transition table.
    pub fn can_transition_to(self, to: CorrespondenceStatus) -> bool {
        use CorrespondenceStatus::*;
        match (self, to) {
            (AwaitingPickup, Delivered) | (AwaitingPickup, Returned) | (AwaitingPickup, NotCollected) => {
                true
            }
            (AwaitingPickup, AwaitingPickup) => false,
            (Delivered, _) | (Returned, _) | (NotCollected, _) => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::AwaitingPickup)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingPickup => "awaiting_pickup",
            Self::Delivered => "delivered",
            Self::Returned => "returned",
            Self::NotCollected => "not_collected",
        }
    }
}

impl std::fmt::Display for CorrespondenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AwaitingPickup => "AWAITING_PICKUP",
            Self::Delivered => "DELIVERED",
            Self::Returned => "RETURNED",
            Self::NotCollected => "NOT_COLLECTED",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for CorrespondenceStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| ParseStatusError {
                kind: "correspondence status",
                value: s.to_string(),
            })
    }
}

/// What kind of item was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrespondenceKind {
    Letter,
    Envelope,
    SmallBox,
    MediumBox,
    LargeBox,
    /// Tracked express parcel.
    Express,
    Telegram,
    /// Official or legal notice.
    Notice,
}

impl CorrespondenceKind {
    const ALL: [CorrespondenceKind; 8] = [
        Self::Letter,
        Self::Envelope,
        Self::SmallBox,
        Self::MediumBox,
        Self::LargeBox,
        Self::Express,
        Self::Telegram,
        Self::Notice,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Letter => "letter",
            Self::Envelope => "envelope",
            Self::SmallBox => "small_box",
            Self::MediumBox => "medium_box",
            Self::LargeBox => "large_box",
            Self::Express => "express",
            Self::Telegram => "telegram",
            Self::Notice => "notice",
        }
    }
}

impl std::str::FromStr for CorrespondenceKind {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ParseStatusError {
                kind: "correspondence kind",
                value: s.to_string(),
            })
    }
}

/// Errors raised by custody transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CorrespondenceError {
    #[error("invalid correspondence transition: {from} -> {to}")]
    InvalidTransition {
        from: CorrespondenceStatus,
        to: CorrespondenceStatus,
    },

    #[error("signature blob is {len} bytes, limit is {max}")]
    SignatureTooLarge { len: usize, max: usize },

    /// A required free-text field was blank.
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
}

/// Receipt details for a new item.
#[derive(Debug, Clone)]
pub struct NewCorrespondence {
    pub unit_id: UnitId,
    /// Addressee as printed on the item.
    pub recipient: String,
    pub kind: CorrespondenceKind,
    pub sender: Option<String>,
    pub tracking_code: Option<String>,
    pub description: Option<String>,
    /// Staff member who received the item at the gate.
    pub received_by: String,
    pub notes: Option<String>,
}

/// Hand-off details.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Person who took the item.
    pub delivered_to: String,
    /// Staff member who handed it over.
    pub delivered_by: String,
    /// Captured signature, opaque.
    pub signature_blob: Option<String>,
}

/// A received item and its custody history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correspondence {
    pub id: CorrespondenceId,
    pub unit_id: UnitId,
    pub recipient: String,
    pub kind: CorrespondenceKind,
    pub sender: Option<String>,
    pub tracking_code: Option<String>,
    pub description: Option<String>,
    status: CorrespondenceStatus,
    pub received_by: String,
    pub received_at: Timestamp,
    delivered_to: Option<String>,
    delivered_by: Option<String>,
    delivered_at: Option<Timestamp>,
    signature_blob: Option<String>,
    pub notes: Option<String>,
    transitions: Vec<TransitionRecord<CorrespondenceStatus>>,
}

impl Correspondence {
    /// Record a newly received item (status `AwaitingPickup`).
    pub fn receive(req: NewCorrespondence, now: Timestamp) -> Result<Self, CorrespondenceError> {
        require_non_empty(&req.recipient, "recipient")?;
        require_non_empty(&req.received_by, "received_by")?;
        Ok(Self {
            id: CorrespondenceId::new(),
            unit_id: req.unit_id,
            recipient: req.recipient,
            kind: req.kind,
            sender: req.sender,
            tracking_code: req.tracking_code,
            description: req.description,
            status: CorrespondenceStatus::AwaitingPickup,
            received_by: req.received_by,
            received_at: now,
            delivered_to: None,
            delivered_by: None,
            delivered_at: None,
            signature_blob: None,
            notes: req.notes,
            transitions: Vec::new(),
        })
    }

    pub fn status(&self) -> CorrespondenceStatus {
        self.status
    }

    pub fn delivered_to(&self) -> Option<&str> {
        self.delivered_to.as_deref()
    }

    pub fn delivered_by(&self) -> Option<&str> {
        self.delivered_by.as_deref()
    }

    pub fn delivered_at(&self) -> Option<Timestamp> {
        self.delivered_at
    }

    pub fn signature_blob(&self) -> Option<&str> {
        self.signature_blob.as_deref()
    }

    pub fn transitions(&self) -> &[TransitionRecord<CorrespondenceStatus>] {
        &self.transitions
    }

    /// Hand the item over (AWAITING_PICKUP → DELIVERED).
    pub fn deliver(&mut self, delivery: Delivery, now: Timestamp) -> Result<(), CorrespondenceError> {
        self.require_edge(CorrespondenceStatus::Delivered)?;
        require_non_empty(&delivery.delivered_to, "delivered_to")?;
        require_non_empty(&delivery.delivered_by, "delivered_by")?;
        if let Some(blob) = &delivery.signature_blob {
            if blob.len() > MAX_SIGNATURE_BLOB_BYTES {
                return Err(CorrespondenceError::SignatureTooLarge {
                    len: blob.len(),
                    max: MAX_SIGNATURE_BLOB_BYTES,
                });
            }
        }
        self.delivered_to = Some(delivery.delivered_to);
        self.delivered_by = Some(delivery.delivered_by);
        self.delivered_at = Some(now);
        self.signature_blob = delivery.signature_blob;
        self.do_transition(CorrespondenceStatus::Delivered, now, None);
        Ok(())
    }

    /// Send the item back (AWAITING_PICKUP → RETURNED).
    pub fn return_to_sender(&mut self, reason: Option<String>, now: Timestamp) -> Result<(), CorrespondenceError> {
        self.require_edge(CorrespondenceStatus::Returned)?;
        self.do_transition(CorrespondenceStatus::Returned, now, reason);
        Ok(())
    }

    /// Give up on pickup (AWAITING_PICKUP → NOT_COLLECTED).
    pub fn mark_not_collected(&mut self, reason: Option<String>, now: Timestamp) -> Result<(), CorrespondenceError> {
        self.require_edge(CorrespondenceStatus::NotCollected)?;
        self.do_transition(CorrespondenceStatus::NotCollected, now, reason);
        Ok(())
    }

    fn require_edge(&self, to: CorrespondenceStatus) -> Result<(), CorrespondenceError> {
        if !self.status.can_transition_to(to) {
            return Err(CorrespondenceError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        Ok(())
    }

    fn do_transition(&mut self, to: CorrespondenceStatus, at: Timestamp, reason: Option<String>) {
        self.transitions.push(TransitionRecord {
            from: self.status,
            to,
            at,
            reason,
        });
        self.status = to;
    }
}

fn require_non_empty(value: &str, field: &'static str) -> Result<(), CorrespondenceError> {
    if value.trim().is_empty() {
        return Err(CorrespondenceError::EmptyField(field));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> Timestamp {
        Timestamp::parse("2026-02-01T09:00:00Z").unwrap()
    }

    fn receive() -> Correspondence {
        Correspondence::receive(
            NewCorrespondence {
                unit_id: UnitId::new("A-101").unwrap(),
                recipient: "Maria Souza".into(),
                kind: CorrespondenceKind::Express,
                sender: Some("Loja X".into()),
                tracking_code: Some("BR123456789".into()),
                description: None,
                received_by: "porter-1".into(),
                notes: None,
            },
            now(),
        )
        .unwrap()
    }

    fn delivery(blob: Option<String>) -> Delivery {
        Delivery {
            delivered_to: "Maria Souza".into(),
            delivered_by: "porter-2".into(),
            signature_blob: blob,
        }
    }

    #[test]
    fn receive_awaits_pickup() {
        let c = receive();
        assert_eq!(c.status(), CorrespondenceStatus::AwaitingPickup);
        assert!(c.delivered_at().is_none());
    }

    #[test]
    fn receive_requires_recipient() {
        let err = Correspondence::receive(
            NewCorrespondence {
                unit_id: UnitId::new("A-101").unwrap(),
                recipient: "  ".into(),
                kind: CorrespondenceKind::Letter,
                sender: None,
                tracking_code: None,
                description: None,
                received_by: "porter-1".into(),
                notes: None,
            },
            now(),
        )
        .unwrap_err();
        assert_eq!(err, CorrespondenceError::EmptyField("recipient"));
    }

    #[test]
    fn deliver_stores_blob_verbatim() {
        let mut c = receive();
        let blob = "data:image/png;base64,iVBORw0KGgo=".to_string();
        c.deliver(delivery(Some(blob.clone())), now()).unwrap();
        assert_eq!(c.status(), CorrespondenceStatus::Delivered);
        assert_eq!(c.signature_blob(), Some(blob.as_str()));
        assert_eq!(c.delivered_to(), Some("Maria Souza"));
        assert_eq!(c.transitions().len(), 1);
    }

    #[test]
    fn second_delivery_rejected_and_unchanged() {
        let mut c = receive();
        c.deliver(delivery(None), now()).unwrap();
        let before = c.clone();
        let err = c.deliver(delivery(None), now()).unwrap_err();
        assert_eq!(
            err,
            CorrespondenceError::InvalidTransition {
                from: CorrespondenceStatus::Delivered,
                to: CorrespondenceStatus::Delivered
            }
        );
        assert_eq!(c, before);
    }

    #[test]
    fn oversized_blob_rejected() {
        let mut c = receive();
        let blob = "x".repeat(MAX_SIGNATURE_BLOB_BYTES + 1);
        let err = c.deliver(delivery(Some(blob)), now()).unwrap_err();
        assert!(matches!(err, CorrespondenceError::SignatureTooLarge { .. }));
        assert_eq!(c.status(), CorrespondenceStatus::AwaitingPickup);
    }

    #[test]
    fn blob_at_limit_accepted() {
        let mut c = receive();
        c.deliver(delivery(Some("x".repeat(MAX_SIGNATURE_BLOB_BYTES))), now()).unwrap();
    }

    #[test]
    fn return_and_not_collected_are_terminal() {
        let mut r = receive();
        r.return_to_sender(Some("address unknown".into()), now()).unwrap();
        assert!(r.status().is_terminal());
        assert!(r.deliver(delivery(None), now()).is_err());

        let mut n = receive();
        n.mark_not_collected(None, now()).unwrap();
        assert!(n.return_to_sender(None, now()).is_err());
    }

    #[test]
    fn transition_table_matrix() {
        for from in CorrespondenceStatus::ALL {
            for to in CorrespondenceStatus::ALL {
                let expected = from == CorrespondenceStatus::AwaitingPickup
                    && to != CorrespondenceStatus::AwaitingPickup;
                assert_eq!(from.can_transition_to(to), expected, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn storage_names_roundtrip() {
        for s in CorrespondenceStatus::ALL {
            assert_eq!(s.as_str().parse::<CorrespondenceStatus>().unwrap(), s);
        }
        for k in CorrespondenceKind::ALL {
            assert_eq!(k.as_str().parse::<CorrespondenceKind>().unwrap(), k);
        }
    }
}
