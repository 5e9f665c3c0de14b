//! Shared fixtures: a seeded directory, a manual clock, and an engine.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use gatehouse_core::{ManualTimeSource, Timestamp, UnitId, VisitorId};
use gatehouse_crypto::CredentialKey;
use gatehouse_engine::{
    CreateVisitRequest, CustodyService, EngineConfig, InMemoryDirectory, UnitRecord, VisitEngine,
    VisitorRecord,
};
use gatehouse_state::VisitKind;

pub const UNIT_A: &str = "A-101";
pub const UNIT_B: &str = "B-1504";
pub const VISITOR: &str = "v-ana";
pub const BLOCKED: &str = "v-blocked";

pub fn t0() -> Timestamp {
    Timestamp::parse("2026-03-02T09:00:00Z").unwrap()
}

pub fn key() -> CredentialKey {
    CredentialKey::from_bytes(vec![0x3c; 32]).unwrap()
}

pub fn directory() -> Arc<InMemoryDirectory> {
    let dir = InMemoryDirectory::new();
    dir.upsert_visitor(VisitorRecord {
        id: VisitorId::new(VISITOR).unwrap(),
        name: "Ana Souza".into(),
        document: Some("123.456.789-00".into()),
        blocked_reason: None,
    });
    dir.upsert_visitor(VisitorRecord {
        id: VisitorId::new(BLOCKED).unwrap(),
        name: "Blocked Person".into(),
        document: None,
        blocked_reason: Some("barred by the residents' board".into()),
    });
    for unit in [UNIT_A, UNIT_B] {
        dir.upsert_unit(UnitRecord {
            id: UnitId::new(unit).unwrap(),
            label: unit.into(),
        });
    }
    Arc::new(dir)
}

pub struct Gate {
    pub engine: Arc<VisitEngine>,
    pub custody: Arc<CustodyService>,
    pub clock: Arc<ManualTimeSource>,
}

pub fn gate() -> Gate {
    let clock = Arc::new(ManualTimeSource::new(t0()));
    let dir = directory();
    let lock_timeout = Duration::from_secs(2);
    let engine = VisitEngine::new(
        dir.clone(),
        key(),
        clock.clone(),
        EngineConfig {
            lock_timeout,
            default_validity_hours: 24,
        },
    );
    let custody = CustodyService::new(dir, clock.clone(), lock_timeout);
    Gate {
        engine: Arc::new(engine),
        custody: Arc::new(custody),
        clock,
    }
}

pub fn visit_request(visitor: &str, unit: &str, hours: Option<u32>) -> CreateVisitRequest {
    CreateVisitRequest {
        visitor_id: VisitorId::new(visitor).unwrap(),
        unit_id: UnitId::new(unit).unwrap(),
        kind: VisitKind::Regular,
        reason: None,
        expected_at: None,
        validity_hours: hours,
    }
}
