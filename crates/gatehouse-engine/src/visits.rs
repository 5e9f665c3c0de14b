//! # Visit Engine
//!
//! Issues credentials, validates them at the gate, registers exits, and
//! keeps the presence ledger in step with the visit store.
//!
//! Every mutation of a visit runs inside [`RecordStore::with_record`] for
//! that visit, and ledger updates happen inside the same critical section.
//! Two racing validations of one credential therefore see each other's
//! result: exactly one admits, the other observes `credential_used` and is
//! refused as a replay. Two racing exits produce one close and one
//! `AlreadyClosed`.

use std::sync::Arc;
use std::time::Duration;

use subtle::ConstantTimeEq;

use gatehouse_core::{TimeSource, Timestamp, UnitId, VisitId, VisitorId};
use gatehouse_crypto::{open, seal, token_digest, CredentialKey, CredentialPayload};
use gatehouse_state::{NewVisit, Visit, VisitError, VisitKind, VisitStatus};

use crate::directory::Directory;
use crate::error::{EngineError, SecurityReason};
use crate::ledger::{PresenceEntry, PresenceLedger};
use crate::store::{RecordStore, StoreError};

/// Shortest credential validity, in hours.
pub const MIN_VALIDITY_HOURS: u32 = 1;
/// Longest credential validity, in hours (one week).
pub const MAX_VALIDITY_HOURS: u32 = 168;

const EXPIRED_UNUSED: &str = "credential expired unused";

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a caller waits for a record lock before giving up.
    pub lock_timeout: Duration,
    /// Validity used when a request does not name one.
    pub default_validity_hours: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(2_000),
            default_validity_hours: 24,
        }
    }
}

/// A request to pre-authorize a visit.
#[derive(Debug, Clone)]
pub struct CreateVisitRequest {
    pub visitor_id: VisitorId,
    pub unit_id: UnitId,
    pub kind: VisitKind,
    pub reason: Option<String>,
    pub expected_at: Option<Timestamp>,
    /// Credential validity in hours; the configured default when `None`.
    pub validity_hours: Option<u32>,
}

/// Result of [`VisitEngine::create_visit`].
#[derive(Debug, Clone)]
pub struct CreatedVisit {
    /// The stored visit, `Authorized` or `Denied`.
    pub visit: Visit,
    /// The credential token, present iff the visit was authorized.
    pub token: Option<String>,
}

/// A freshly issued credential.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    pub visit: Visit,
    pub token: String,
    pub valid_until: Timestamp,
}

/// A visit snapshot after a transition, with the status it left.
#[derive(Debug, Clone)]
pub struct Transitioned {
    pub visit: Visit,
    pub previous: VisitStatus,
}

/// What the exit registrar returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitRecord {
    pub visit_id: VisitId,
    pub unit_id: UnitId,
    pub entered_at: Timestamp,
    pub exited_at: Timestamp,
    pub duration_minutes: i64,
}

/// A ledger entry with time on site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceView {
    pub visit_id: VisitId,
    pub unit_id: UnitId,
    pub entered_at: Timestamp,
    pub elapsed_minutes: i64,
}

/// Outcome of a ledger reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: usize,
    pub removed: usize,
}

/// The visit authorization and credential engine.
pub struct VisitEngine {
    visits: RecordStore<VisitId, Visit>,
    ledger: PresenceLedger,
    directory: Arc<dyn Directory>,
    key: CredentialKey,
    clock: Arc<dyn TimeSource>,
    config: EngineConfig,
}

impl std::fmt::Debug for VisitEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisitEngine")
            .field("visits", &self.visits)
            .field("on_site", &self.ledger.len())
            .field("key", &self.key)
            .field("config", &self.config)
            .finish()
    }
}

impl VisitEngine {
    pub fn new(
        directory: Arc<dyn Directory>,
        key: CredentialKey,
        clock: Arc<dyn TimeSource>,
        config: EngineConfig,
    ) -> Self {
        Self {
            visits: RecordStore::new(config.lock_timeout),
            ledger: PresenceLedger::new(),
            directory,
            key,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &PresenceLedger {
        &self.ledger
    }

    // ── Create / issue ──────────────────────────────────────────────

    /// Pre-authorize a visit.
    ///
    /// Validity is checked before anything is stored. A blocked visitor
    /// gets a `Denied` visit and no token; everyone else gets an
    /// `Authorized` visit and a credential.
    pub fn create_visit(&self, req: CreateVisitRequest) -> Result<CreatedVisit, EngineError> {
        let hours = self.resolve_validity(req.validity_hours)?;
        let visitor = self.directory.get_visitor(&req.visitor_id).ok_or_else(|| {
            EngineError::Validation(format!("unknown visitor {}", req.visitor_id))
        })?;
        if self.directory.get_unit(&req.unit_id).is_none() {
            return Err(EngineError::Validation(format!("unknown unit {}", req.unit_id)));
        }

        let visit = self.request_visit(NewVisit {
            visitor_id: req.visitor_id,
            unit_id: req.unit_id,
            kind: req.kind,
            reason: req.reason,
            expected_at: req.expected_at,
        });

        if let Some(block) = visitor.blocked_reason {
            let denied = self.deny_visit(visit.id, block)?;
            return Ok(CreatedVisit {
                visit: denied.visit,
                token: None,
            });
        }

        let issued = self.issue_credential(visit.id, Some(hours))?;
        Ok(CreatedVisit {
            visit: issued.visit,
            token: Some(issued.token),
        })
    }

    /// Store a new `Pending` visit without deciding it.
    pub fn request_visit(&self, req: NewVisit) -> Visit {
        let visit = Visit::new(req, self.clock.now());
        self.visits.insert(visit.id, visit.clone());
        tracing::debug!(visit_id = %visit.id, unit_id = %visit.unit_id, "visit requested");
        visit
    }

    /// Mint a credential for a pending visit (PENDING → AUTHORIZED).
    pub fn issue_credential(
        &self,
        visit_id: VisitId,
        validity_hours: Option<u32>,
    ) -> Result<IssuedCredential, EngineError> {
        let hours = self.resolve_validity(validity_hours)?;
        let now = self.clock.now();
        let expires_at = now.plus_hours(hours);

        let outcome = self
            .visits
            .with_record(&visit_id, |visit| -> Result<_, EngineError> {
                if visit.status() != VisitStatus::Pending {
                    return Err(VisitError::InvalidTransition {
                        from: visit.status(),
                        to: VisitStatus::Authorized,
                    }
                    .into());
                }
                let payload = CredentialPayload::new(visit.id, visit.unit_id.clone(), now, expires_at);
                let sealed = seal(&payload, &self.key)
                    .map_err(|e| EngineError::Validation(format!("credential could not be sealed: {e}")))?;
                visit.authorize(expires_at, sealed.token_digest, now)?;
                tracing::info!(
                    visit_id = %visit.id,
                    payload_digest = %sealed.payload_digest,
                    valid_until = %expires_at,
                    "credential issued"
                );
                Ok((visit.clone(), sealed.token))
            })
            .map_err(|e| store_err(e, visit_id))?;

        let (visit, token) = outcome?;
        Ok(IssuedCredential {
            visit,
            token,
            valid_until: expires_at,
        })
    }

    fn deny_visit(&self, visit_id: VisitId, reason: String) -> Result<Transitioned, EngineError> {
        let now = self.clock.now();
        self.transition(visit_id, |visit| {
            visit.deny(reason, now)?;
            tracing::info!(visit_id = %visit.id, "visit denied: visitor is blocked");
            Ok(())
        })
    }

    // ── Validate ────────────────────────────────────────────────────

    /// Check a presented token and admit the visitor (AUTHORIZED → ADMITTED).
    ///
    /// Checks run in a fixed order: decode, tag, unit binding, expiry,
    /// single use, credential identity, status. Security refusals are logged
    /// here with their precise reason.
    pub fn validate_credential(
        &self,
        token: &str,
        scanner_unit: Option<&UnitId>,
    ) -> Result<Transitioned, EngineError> {
        let payload = open(token, &self.key).map_err(|e| self.refuse(None, e.into()))?;
        let visit_id = payload.visit_id;

        if let Some(unit) = scanner_unit {
            if unit != &payload.unit_id {
                return Err(self.refuse(Some(visit_id), SecurityReason::UnitMismatch));
            }
        }

        let now = self.clock.now();
        let digest = token_digest(token);

        if payload.is_expired_at(now) {
            self.cancel_expired(visit_id, &digest, now);
            return Err(self.refuse(Some(visit_id), SecurityReason::Expired));
        }

        let outcome = self
            .visits
            .with_record(&visit_id, |visit| -> Result<Visit, EngineError> {
                if visit.credential_used() {
                    return Err(self.refuse(Some(visit_id), SecurityReason::Replayed));
                }
                if !digest_matches(visit.credential_token_hash(), &digest) {
                    return Err(self.refuse(Some(visit_id), SecurityReason::UnknownCredential));
                }
                visit.admit(now)?;
                self.ledger.add(PresenceEntry {
                    visit_id,
                    unit_id: visit.unit_id.clone(),
                    entered_at: now,
                });
                tracing::info!(visit_id = %visit_id, unit_id = %visit.unit_id, "visitor admitted");
                Ok(visit.clone())
            })
            .map_err(|e| store_err(e, visit_id))?;

        let visit = outcome?;
        Ok(Transitioned {
            visit,
            previous: VisitStatus::Authorized,
        })
    }

    /// Expiry side effect: an authorized visit whose credential was
    /// presented late is canceled. Failures are logged, never returned; the
    /// caller is already refusing the credential.
    fn cancel_expired(&self, visit_id: VisitId, digest: &str, now: Timestamp) {
        let result = self.visits.with_record(&visit_id, |visit| {
            if visit.status() == VisitStatus::Authorized
                && digest_matches(visit.credential_token_hash(), digest)
            {
                visit.cancel(Some(EXPIRED_UNUSED.to_string()), now).is_ok()
            } else {
                false
            }
        });
        match result {
            Ok(true) => tracing::info!(visit_id = %visit_id, "visit canceled: credential expired"),
            Ok(false) | Err(StoreError::NotFound) => {}
            Err(e) => tracing::warn!(visit_id = %visit_id, error = %e, "could not cancel expired visit"),
        }
    }

    fn refuse(&self, visit_id: Option<VisitId>, reason: SecurityReason) -> EngineError {
        match visit_id {
            Some(id) => tracing::warn!(visit_id = %id, reason = %reason, "credential rejected"),
            None => tracing::warn!(reason = %reason, "credential rejected"),
        }
        EngineError::Security { visit_id, reason }
    }

    // ── Exit / cancel ───────────────────────────────────────────────

    /// Close an admitted visit (ADMITTED → CLOSED).
    pub fn register_exit(&self, visit_id: VisitId) -> Result<(ExitRecord, Visit), EngineError> {
        let now = self.clock.now();
        self.visits
            .with_record(&visit_id, |visit| -> Result<_, EngineError> {
                let minutes = match visit.close(now) {
                    Ok(m) => m,
                    Err(VisitError::AlreadyClosed) => return Err(EngineError::AlreadyClosed(visit_id)),
                    Err(e) => return Err(e.into()),
                };
                self.ledger.remove(&visit_id);
                let record = ExitRecord {
                    visit_id,
                    unit_id: visit.unit_id.clone(),
                    entered_at: visit.entered_at().unwrap_or(now),
                    exited_at: now,
                    duration_minutes: minutes,
                };
                tracing::info!(visit_id = %visit_id, duration_minutes = minutes, "exit registered");
                Ok((record, visit.clone()))
            })
            .map_err(|e| store_err(e, visit_id))?
    }

    /// Withdraw a pending or authorized visit.
    pub fn cancel_visit(&self, visit_id: VisitId, reason: Option<String>) -> Result<Transitioned, EngineError> {
        let now = self.clock.now();
        self.transition(visit_id, |visit| {
            visit.cancel(reason, now)?;
            tracing::info!(visit_id = %visit.id, "visit canceled");
            Ok(())
        })
    }

    fn transition(
        &self,
        visit_id: VisitId,
        f: impl FnOnce(&mut Visit) -> Result<(), EngineError>,
    ) -> Result<Transitioned, EngineError> {
        self.visits
            .with_record(&visit_id, |visit| -> Result<Transitioned, EngineError> {
                let previous = visit.status();
                f(visit)?;
                Ok(Transitioned {
                    visit: visit.clone(),
                    previous,
                })
            })
            .map_err(|e| store_err(e, visit_id))?
    }

    // ── Reads ───────────────────────────────────────────────────────

    pub fn get_visit(&self, visit_id: VisitId) -> Result<Visit, EngineError> {
        self.visits.get(&visit_id).map_err(|e| store_err(e, visit_id))
    }

    /// Everyone on site, earliest arrival first.
    pub fn presence(&self) -> Vec<PresenceView> {
        let now = self.clock.now();
        self.ledger
            .list()
            .into_iter()
            .map(|e| PresenceView {
                elapsed_minutes: now.whole_minutes_since(&e.entered_at),
                visit_id: e.visit_id,
                unit_id: e.unit_id,
                entered_at: e.entered_at,
            })
            .collect()
    }

    pub fn visits_inside(&self) -> usize {
        self.ledger.len()
    }

    /// Pending or authorized visits expected on the current UTC day.
    pub fn visits_expected_today(&self) -> usize {
        let today = self.clock.now().as_datetime().date_naive();
        self.visits
            .snapshot()
            .iter()
            .filter(|v| matches!(v.status(), VisitStatus::Pending | VisitStatus::Authorized))
            .filter(|v| v.expected_at.as_datetime().date_naive() == today)
            .count()
    }

    pub fn visit_count(&self) -> usize {
        self.visits.len()
    }

    // ── Maintenance ─────────────────────────────────────────────────

    /// Authorized visits whose validity has lapsed as of now.
    pub fn lapsed_visit_ids(&self) -> Vec<VisitId> {
        let now = self.clock.now();
        self.visits
            .snapshot()
            .into_iter()
            .filter(|v| is_lapsed(v, now))
            .map(|v| v.id)
            .collect()
    }

    /// Cancel one visit if it is still authorized past its validity.
    /// `Ok(None)` when there was nothing to do.
    pub fn expire_if_lapsed(&self, visit_id: VisitId) -> Result<Option<Transitioned>, EngineError> {
        let now = self.clock.now();
        let expired = self
            .visits
            .with_record(&visit_id, |visit| {
                if is_lapsed(visit, now) && visit.cancel(Some(EXPIRED_UNUSED.to_string()), now).is_ok() {
                    Some(Transitioned {
                        visit: visit.clone(),
                        previous: VisitStatus::Authorized,
                    })
                } else {
                    None
                }
            })
            .map_err(|e| store_err(e, visit_id))?;
        if expired.is_some() {
            tracing::info!(visit_id = %visit_id, "visit canceled: credential expired unused");
        }
        Ok(expired)
    }

    /// Cancel every authorized visit whose validity has lapsed.
    pub fn expire_stale(&self) -> Vec<Transitioned> {
        let mut expired = Vec::new();
        for id in self.lapsed_visit_ids() {
            match self.expire_if_lapsed(id) {
                Ok(Some(t)) => expired.push(t),
                Ok(None) | Err(EngineError::NotFound { .. }) => {}
                Err(e) => tracing::debug!(visit_id = %id, error = %e, "skipping busy visit in expiry sweep"),
            }
        }
        expired
    }

    /// Bring the ledger back in line with the store.
    ///
    /// Every correction happens under the lock of the visit it concerns, the
    /// same lock admissions and exits hold, so a pass never undoes a
    /// transition that lands while it runs. A visit whose lock cannot be
    /// taken in time keeps whatever ledger entry it has.
    pub fn reconcile_presence(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for id in self.visits.keys() {
            match self.visits.with_record(&id, |visit| self.sync_ledger(visit)) {
                Ok(LedgerSync::Added) => report.added += 1,
                Ok(LedgerSync::Removed) => report.removed += 1,
                Ok(LedgerSync::Unchanged) | Err(_) => {}
            }
        }
        // Entries for visits the store no longer holds.
        for id in self.ledger.ids() {
            if !self.visits.contains(&id) && self.ledger.remove(&id) {
                report.removed += 1;
            }
        }
        if report.added > 0 || report.removed > 0 {
            tracing::info!(added = report.added, removed = report.removed, "presence ledger reconciled");
        }
        report
    }

    /// Make the ledger entry for `visit` match its status. The caller holds
    /// the visit's record lock.
    fn sync_ledger(&self, visit: &Visit) -> LedgerSync {
        let listed = self.ledger.contains(&visit.id);
        match (visit.status() == VisitStatus::Admitted, listed) {
            (true, false) => {
                self.ledger.add(PresenceEntry {
                    visit_id: visit.id,
                    unit_id: visit.unit_id.clone(),
                    entered_at: visit.entered_at().unwrap_or(visit.created_at),
                });
                LedgerSync::Added
            }
            (false, true) => {
                self.ledger.remove(&visit.id);
                LedgerSync::Removed
            }
            _ => LedgerSync::Unchanged,
        }
    }

    // ── Write-back recovery ─────────────────────────────────────────

    /// Undo a transition whose write to durable storage failed.
    ///
    /// The record goes back to `before` only while it is still in `after`;
    /// anything else means a later transition already replaced it. Returns
    /// whether the record was put back.
    pub fn revert_to(&self, before: &Visit, after: VisitStatus) -> Result<bool, EngineError> {
        self.visits
            .with_record(&before.id, |visit| {
                if visit.status() != after {
                    return false;
                }
                *visit = before.clone();
                self.sync_ledger(visit);
                tracing::warn!(
                    visit_id = %before.id,
                    from = after.as_str(),
                    to = before.status().as_str(),
                    "visit transition reverted"
                );
                true
            })
            .map_err(|e| store_err(e, before.id))
    }

    /// Replace the in-memory record with the stored one.
    pub fn reinstate(&self, stored: Visit) -> Result<(), EngineError> {
        let id = stored.id;
        self.visits
            .with_record(&id, |visit| {
                *visit = stored;
                self.sync_ledger(visit);
            })
            .map_err(|e| store_err(e, id))?;
        tracing::warn!(visit_id = %id, "visit reinstated from storage");
        Ok(())
    }

    /// Forget a visit that never reached durable storage.
    pub fn discard(&self, visit_id: VisitId) -> bool {
        let removed = self.visits.remove(&visit_id);
        self.ledger.remove(&visit_id);
        if removed {
            tracing::warn!(visit_id = %visit_id, "visit discarded");
        }
        removed
    }

    /// Load previously persisted visits and rebuild the ledger from them.
    pub fn restore(&self, visits: impl IntoIterator<Item = Visit>) -> usize {
        let mut n = 0;
        for visit in visits {
            self.visits.insert(visit.id, visit);
            n += 1;
        }
        self.reconcile_presence();
        n
    }

    fn resolve_validity(&self, requested: Option<u32>) -> Result<u32, EngineError> {
        let hours = requested.unwrap_or(self.config.default_validity_hours);
        if !(MIN_VALIDITY_HOURS..=MAX_VALIDITY_HOURS).contains(&hours) {
            return Err(EngineError::Validation(format!(
                "validity_hours must be between {MIN_VALIDITY_HOURS} and {MAX_VALIDITY_HOURS}, got {hours}"
            )));
        }
        Ok(hours)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LedgerSync {
    Added,
    Removed,
    Unchanged,
}

fn is_lapsed(visit: &Visit, now: Timestamp) -> bool {
    visit.status() == VisitStatus::Authorized && visit.valid_until().map_or(false, |until| now > until)
}

fn store_err(err: StoreError, visit_id: VisitId) -> EngineError {
    EngineError::from_store(err, "visit", visit_id.to_string())
}

fn digest_matches(stored: Option<&str>, presented: &str) -> bool {
    match stored {
        Some(stored) => stored.as_bytes().ct_eq(presented.as_bytes()).into(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{InMemoryDirectory, UnitRecord, VisitorRecord};
    use gatehouse_core::ManualTimeSource;
    use std::collections::HashSet;

    struct Harness {
        engine: VisitEngine,
        clock: Arc<ManualTimeSource>,
    }

    fn t0() -> Timestamp {
        Timestamp::parse("2026-01-15T10:00:00Z").unwrap()
    }

    fn harness() -> Harness {
        let dir = InMemoryDirectory::new();
        dir.upsert_visitor(VisitorRecord {
            id: VisitorId::new("v-1").unwrap(),
            name: "Ana".into(),
            document: None,
            blocked_reason: None,
        });
        dir.upsert_visitor(VisitorRecord {
            id: VisitorId::new("v-blocked").unwrap(),
            name: "Blocked".into(),
            document: None,
            blocked_reason: Some("banned by board".into()),
        });
        for unit in ["A-101", "B-202"] {
            dir.upsert_unit(UnitRecord {
                id: UnitId::new(unit).unwrap(),
                label: unit.into(),
            });
        }
        let clock = Arc::new(ManualTimeSource::new(t0()));
        let engine = VisitEngine::new(
            Arc::new(dir),
            CredentialKey::from_bytes(vec![0x11; 32]).unwrap(),
            clock.clone(),
            EngineConfig {
                lock_timeout: Duration::from_millis(200),
                default_validity_hours: 24,
            },
        );
        Harness { engine, clock }
    }

    fn request(visitor: &str, hours: Option<u32>) -> CreateVisitRequest {
        CreateVisitRequest {
            visitor_id: VisitorId::new(visitor).unwrap(),
            unit_id: UnitId::new("A-101").unwrap(),
            kind: VisitKind::Regular,
            reason: Some("visit".into()),
            expected_at: None,
            validity_hours: hours,
        }
    }

    fn create(h: &Harness, hours: Option<u32>) -> (VisitId, String) {
        let created = h.engine.create_visit(request("v-1", hours)).unwrap();
        (created.visit.id, created.token.unwrap())
    }

    #[test]
    fn full_day_scenario() {
        let h = harness();
        let (id, token) = create(&h, Some(24));
        let v = h.engine.get_visit(id).unwrap();
        assert_eq!(v.status(), VisitStatus::Authorized);
        assert_eq!(v.valid_until(), Some(t0().plus_hours(24)));
        assert_eq!(v.credential_token_hash(), Some(token_digest(&token).as_str()));

        h.clock.advance_hours(2);
        let admitted = h.engine.validate_credential(&token, None).unwrap();
        assert_eq!(admitted.visit.status(), VisitStatus::Admitted);
        assert_eq!(h.engine.presence().len(), 1);

        h.clock.advance_hours(3);
        let (exit, visit) = h.engine.register_exit(id).unwrap();
        assert_eq!(exit.duration_minutes, 180);
        assert_eq!(visit.status(), VisitStatus::Closed);
        assert!(h.engine.presence().is_empty());

        let err = h.engine.validate_credential(&token, None).unwrap_err();
        assert_eq!(
            err,
            EngineError::Security {
                visit_id: Some(id),
                reason: SecurityReason::Replayed
            }
        );
    }

    #[test]
    fn late_presentation_expires_and_cancels() {
        let h = harness();
        let (id, token) = create(&h, Some(1));
        h.clock.advance_hours(2);
        let err = h.engine.validate_credential(&token, None).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Security {
                reason: SecurityReason::Expired,
                ..
            }
        ));
        let v = h.engine.get_visit(id).unwrap();
        assert_eq!(v.status(), VisitStatus::Canceled);
        assert_eq!(v.status_reason(), Some(EXPIRED_UNUSED));
        assert!(h.engine.presence().is_empty());
    }

    #[test]
    fn presentation_at_exact_expiry_is_accepted() {
        let h = harness();
        let (_, token) = create(&h, Some(1));
        h.clock.advance_hours(1);
        assert!(h.engine.validate_credential(&token, None).is_ok());
    }

    #[test]
    fn out_of_range_validity_creates_nothing() {
        let h = harness();
        for hours in [0, 169, 200] {
            let err = h.engine.create_visit(request("v-1", Some(hours))).unwrap_err();
            assert!(matches!(err, EngineError::Validation(_)), "{hours}");
        }
        assert_eq!(h.engine.visit_count(), 0);
    }

    #[test]
    fn blocked_visitor_is_denied_without_token() {
        let h = harness();
        let created = h.engine.create_visit(request("v-blocked", None)).unwrap();
        assert!(created.token.is_none());
        assert_eq!(created.visit.status(), VisitStatus::Denied);
        assert_eq!(created.visit.status_reason(), Some("banned by board"));
        assert!(created.visit.credential_token_hash().is_none());
    }

    #[test]
    fn unknown_references_are_validation_errors() {
        let h = harness();
        assert!(matches!(
            h.engine.create_visit(request("v-nobody", None)),
            Err(EngineError::Validation(_))
        ));
        let mut req = request("v-1", None);
        req.unit_id = UnitId::new("Z-9").unwrap();
        assert!(matches!(h.engine.create_visit(req), Err(EngineError::Validation(_))));
    }

    #[test]
    fn garbage_token_is_malformed() {
        let h = harness();
        let err = h.engine.validate_credential("definitely-not-a-token", None).unwrap_err();
        assert_eq!(
            err,
            EngineError::Security {
                visit_id: None,
                reason: SecurityReason::Malformed
            }
        );
    }

    #[test]
    fn token_from_other_key_is_signature_mismatch() {
        let h = harness();
        let (id, _) = create(&h, None);
        let v = h.engine.get_visit(id).unwrap();
        let payload = CredentialPayload::new(id, v.unit_id.clone(), t0(), t0().plus_hours(24));
        let forged = seal(&payload, &CredentialKey::from_bytes(vec![0x99; 32]).unwrap()).unwrap();
        let err = h.engine.validate_credential(&forged.token, None).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Security {
                reason: SecurityReason::SignatureMismatch,
                ..
            }
        ));
        assert_eq!(h.engine.get_visit(id).unwrap().status(), VisitStatus::Authorized);
    }

    #[test]
    fn scanner_at_wrong_unit_is_refused() {
        let h = harness();
        let (id, token) = create(&h, None);
        let err = h
            .engine
            .validate_credential(&token, Some(&UnitId::new("B-202").unwrap()))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Security {
                reason: SecurityReason::UnitMismatch,
                ..
            }
        ));
        assert!(h
            .engine
            .validate_credential(&token, Some(&UnitId::new("A-101").unwrap()))
            .is_ok());
        assert_eq!(h.engine.get_visit(id).unwrap().status(), VisitStatus::Admitted);
    }

    #[test]
    fn second_exit_is_already_closed() {
        let h = harness();
        let (id, token) = create(&h, None);
        h.engine.validate_credential(&token, None).unwrap();
        h.engine.register_exit(id).unwrap();
        assert_eq!(h.engine.register_exit(id).unwrap_err(), EngineError::AlreadyClosed(id));
    }

    #[test]
    fn exit_before_entry_is_invalid_transition() {
        let h = harness();
        let (id, _) = create(&h, None);
        assert_eq!(
            h.engine.register_exit(id).unwrap_err(),
            EngineError::InvalidTransition {
                current: "authorized",
                attempted: "closed"
            }
        );
    }

    #[test]
    fn canceled_visit_cannot_be_admitted() {
        let h = harness();
        let (id, token) = create(&h, None);
        let canceled = h.engine.cancel_visit(id, Some("plans changed".into())).unwrap();
        assert_eq!(canceled.previous, VisitStatus::Authorized);
        let err = h.engine.validate_credential(&token, None).unwrap_err();
        assert_eq!(
            err,
            EngineError::InvalidTransition {
                current: "canceled",
                attempted: "admitted"
            }
        );
    }

    #[test]
    fn issue_on_non_pending_is_invalid_and_missing_is_not_found() {
        let h = harness();
        let (id, _) = create(&h, None);
        assert!(matches!(
            h.engine.issue_credential(id, None),
            Err(EngineError::InvalidTransition { current: "authorized", .. })
        ));
        assert!(matches!(
            h.engine.issue_credential(VisitId::new(), None),
            Err(EngineError::NotFound { kind: "visit", .. })
        ));
    }

    #[test]
    fn issue_for_requested_visit() {
        let h = harness();
        let pending = h.engine.request_visit(NewVisit {
            visitor_id: VisitorId::new("v-1").unwrap(),
            unit_id: UnitId::new("A-101").unwrap(),
            kind: VisitKind::ServiceProvider,
            reason: None,
            expected_at: None,
        });
        let issued = h.engine.issue_credential(pending.id, Some(8)).unwrap();
        assert_eq!(issued.valid_until, t0().plus_hours(8));
        assert_eq!(issued.visit.status(), VisitStatus::Authorized);
    }

    #[test]
    fn expire_stale_cancels_only_lapsed_authorized() {
        let h = harness();
        let (short, _) = create(&h, Some(1));
        let (long, _) = create(&h, Some(48));
        let (inside, token) = create(&h, Some(1));
        h.engine.validate_credential(&token, None).unwrap();
        h.clock.advance_hours(2);
        let expired = h.engine.expire_stale();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].visit.id, short);
        assert_eq!(h.engine.get_visit(long).unwrap().status(), VisitStatus::Authorized);
        assert_eq!(h.engine.get_visit(inside).unwrap().status(), VisitStatus::Admitted);
        assert!(h.engine.expire_stale().is_empty());
    }

    #[test]
    fn reconcile_rebuilds_ledger_from_store() {
        let h = harness();
        let (id, token) = create(&h, None);
        h.engine.validate_credential(&token, None).unwrap();
        h.engine.ledger().remove(&id);
        h.engine.ledger().add(PresenceEntry {
            visit_id: VisitId::new(),
            unit_id: UnitId::new("B-202").unwrap(),
            entered_at: t0(),
        });
        let report = h.engine.reconcile_presence();
        assert_eq!(report, ReconcileReport { added: 1, removed: 1 });
        let expected: HashSet<VisitId> = [id].into_iter().collect();
        assert_eq!(h.engine.ledger().ids(), expected);
    }

    #[test]
    fn reconcile_drops_entry_of_exited_visit() {
        let h = harness();
        let (id, token) = create(&h, None);
        h.engine.validate_credential(&token, None).unwrap();
        let (left, other) = create(&h, None);
        h.engine.validate_credential(&other, None).unwrap();
        h.engine.register_exit(left).unwrap();
        h.engine.ledger().add(PresenceEntry {
            visit_id: left,
            unit_id: UnitId::new("A-101").unwrap(),
            entered_at: t0(),
        });
        assert_eq!(h.engine.reconcile_presence(), ReconcileReport { added: 0, removed: 1 });
        assert_eq!(h.engine.ledger().ids(), HashSet::from([id]));
        assert_eq!(h.engine.reconcile_presence(), ReconcileReport::default());
    }

    #[test]
    fn expire_if_lapsed_is_a_noop_inside_validity() {
        let h = harness();
        let (id, _) = create(&h, Some(1));
        assert!(h.engine.expire_if_lapsed(id).unwrap().is_none());
        assert!(h.engine.lapsed_visit_ids().is_empty());
        h.clock.advance_hours(2);
        assert_eq!(h.engine.lapsed_visit_ids(), vec![id]);
        let done = h.engine.expire_if_lapsed(id).unwrap().unwrap();
        assert_eq!(done.previous, VisitStatus::Authorized);
        assert_eq!(done.visit.status_reason(), Some(EXPIRED_UNUSED));
        assert!(h.engine.expire_if_lapsed(id).unwrap().is_none());
    }

    #[test]
    fn reverted_admission_can_be_presented_again() {
        let h = harness();
        let (id, token) = create(&h, None);
        let before = h.engine.get_visit(id).unwrap();
        h.engine.validate_credential(&token, None).unwrap();
        assert!(h.engine.revert_to(&before, VisitStatus::Admitted).unwrap());

        let v = h.engine.get_visit(id).unwrap();
        assert_eq!(v.status(), VisitStatus::Authorized);
        assert!(!v.credential_used());
        assert!(h.engine.presence().is_empty());

        h.engine.validate_credential(&token, None).unwrap();
        assert_eq!(h.engine.visits_inside(), 1);
    }

    #[test]
    fn revert_skips_a_record_that_moved_on() {
        let h = harness();
        let (id, token) = create(&h, None);
        let before = h.engine.get_visit(id).unwrap();
        h.engine.validate_credential(&token, None).unwrap();
        h.engine.register_exit(id).unwrap();
        assert!(!h.engine.revert_to(&before, VisitStatus::Admitted).unwrap());
        assert_eq!(h.engine.get_visit(id).unwrap().status(), VisitStatus::Closed);
    }

    #[test]
    fn reverted_exit_puts_visitor_back_on_site() {
        let h = harness();
        let (id, token) = create(&h, None);
        let before = h.engine.validate_credential(&token, None).unwrap().visit;
        h.engine.register_exit(id).unwrap();
        assert!(h.engine.presence().is_empty());
        assert!(h.engine.revert_to(&before, VisitStatus::Closed).unwrap());
        assert_eq!(h.engine.presence()[0].visit_id, id);
    }

    #[test]
    fn reinstate_adopts_stored_record() {
        let h = harness();
        let (id, token) = create(&h, None);
        let authorized = h.engine.get_visit(id).unwrap();
        h.engine.validate_credential(&token, None).unwrap();
        h.engine.reinstate(authorized).unwrap();
        assert_eq!(h.engine.get_visit(id).unwrap().status(), VisitStatus::Authorized);
        assert!(h.engine.presence().is_empty());
    }

    #[test]
    fn discarded_visit_is_gone() {
        let h = harness();
        let (id, _) = create(&h, None);
        assert!(h.engine.discard(id));
        assert!(!h.engine.discard(id));
        assert_eq!(h.engine.visit_count(), 0);
        assert!(matches!(h.engine.get_visit(id), Err(EngineError::NotFound { .. })));
    }

    #[test]
    fn restore_rebuilds_presence() {
        let h = harness();
        let (_, token) = create(&h, None);
        let admitted = h.engine.validate_credential(&token, None).unwrap().visit;

        let fresh = harness();
        assert_eq!(fresh.engine.restore(vec![admitted.clone()]), 1);
        assert_eq!(fresh.engine.visits_inside(), 1);
        assert_eq!(fresh.engine.presence()[0].visit_id, admitted.id);
    }

    #[test]
    fn expected_today_counts_open_visits() {
        let h = harness();
        create(&h, None);
        let (id, _) = create(&h, None);
        h.engine.cancel_visit(id, None).unwrap();
        let mut tomorrow = request("v-1", None);
        tomorrow.expected_at = Some(t0().plus_hours(24));
        h.engine.create_visit(tomorrow).unwrap();
        assert_eq!(h.engine.visits_expected_today(), 1);
    }

    #[test]
    fn presence_reports_elapsed_minutes() {
        let h = harness();
        let (_, token) = create(&h, None);
        h.engine.validate_credential(&token, None).unwrap();
        h.clock.advance_secs(45 * 60 + 10);
        assert_eq!(h.engine.presence()[0].elapsed_minutes, 45);
    }
}
