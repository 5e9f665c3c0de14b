//! # Presence Ledger
//!
//! Index of the visits currently on site. It is derived state: every entry
//! corresponds to a visit in `Admitted`, and the whole ledger can be rebuilt
//! from the visit store at any time. Nothing counts visitors; "how many are
//! inside" is always `len()`.
//!
//! The engine adds and removes entries while holding the owning visit's
//! record lock, so per visit the ledger never disagrees with the store
//! and a reconcile pass corrects one visit at a time under that same lock.

use std::collections::HashSet;

use dashmap::DashMap;
use serde::Serialize;

use gatehouse_core::{Timestamp, UnitId, VisitId};

/// One visit on site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceEntry {
    pub visit_id: VisitId,
    pub unit_id: UnitId,
    pub entered_at: Timestamp,
}

/// The on-site index.
#[derive(Debug, Default)]
pub struct PresenceLedger {
    entries: DashMap<VisitId, PresenceEntry>,
}

impl PresenceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a visit as on site. Replaces any existing entry for it.
    pub fn add(&self, entry: PresenceEntry) {
        self.entries.insert(entry.visit_id, entry);
    }

    /// Drop a visit. Returns whether it was present.
    pub fn remove(&self, visit_id: &VisitId) -> bool {
        self.entries.remove(visit_id).is_some()
    }

    pub fn contains(&self, visit_id: &VisitId) -> bool {
        self.entries.contains_key(visit_id)
    }

    /// All entries, earliest arrival first.
    pub fn list(&self) -> Vec<PresenceEntry> {
        let mut out: Vec<_> = self.entries.iter().map(|e| e.value().clone()).collect();
        out.sort_by(|a, b| a.entered_at.cmp(&b.entered_at).then(a.visit_id.cmp(&b.visit_id)));
        out
    }

    /// Whole minutes the visit has been on site as of `now`.
    pub fn duration_of(&self, visit_id: &VisitId, now: Timestamp) -> Option<i64> {
        self.entries
            .get(visit_id)
            .map(|e| now.whole_minutes_since(&e.entered_at))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> HashSet<VisitId> {
        self.entries.iter().map(|e| *e.key()).collect()
    }
}
