//! # Directory Port
//!
//! Visitors and units are managed elsewhere. The engine reaches them only
//! through [`Directory`], which answers two lookups. [`InMemoryDirectory`]
//! backs the service when no external directory is wired in and can be
//! seeded from a JSON file.

use std::path::Path;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use gatehouse_core::{UnitId, VisitorId};

/// A visitor as known to the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorRecord {
    pub id: VisitorId,
    pub name: String,
    #[serde(default)]
    pub document: Option<String>,
    /// Set when the visitor may not be admitted; the text is the reason.
    #[serde(default)]
    pub blocked_reason: Option<String>,
}

impl VisitorRecord {
    pub fn is_blocked(&self) -> bool {
        self.blocked_reason.is_some()
    }
}

/// A residential unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub id: UnitId,
    /// Human label, e.g. "Tower B, 1504".
    pub label: String,
}

/// Read-only lookups into the external visitor/unit directory.
pub trait Directory: Send + Sync {
    fn get_visitor(&self, id: &VisitorId) -> Option<VisitorRecord>;
    fn get_unit(&self, id: &UnitId) -> Option<UnitRecord>;
}

/// Failure loading a directory seed.
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("reading directory seed: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing directory seed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Seed file layout.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DirectorySeed {
    #[serde(default)]
    pub visitors: Vec<VisitorRecord>,
    #[serde(default)]
    pub units: Vec<UnitRecord>,
}

/// Directory held in memory.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    visitors: DashMap<VisitorId, VisitorRecord>,
    units: DashMap<UnitId, UnitRecord>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: DirectorySeed) -> Self {
        let dir = Self::new();
        for v in seed.visitors {
            dir.upsert_visitor(v);
        }
        for u in seed.units {
            dir.upsert_unit(u);
        }
        dir
    }

    pub fn from_json_str(json: &str) -> Result<Self, DirectoryError> {
        Ok(Self::from_seed(serde_json::from_str(json)?))
    }

    pub fn from_file(path: &Path) -> Result<Self, DirectoryError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn upsert_visitor(&self, visitor: VisitorRecord) {
        self.visitors.insert(visitor.id.clone(), visitor);
    }

    pub fn upsert_unit(&self, unit: UnitRecord) {
        self.units.insert(unit.id.clone(), unit);
    }

    pub fn visitor_count(&self) -> usize {
        self.visitors.len()
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }
}

impl Directory for InMemoryDirectory {
    fn get_visitor(&self, id: &VisitorId) -> Option<VisitorRecord> {
        self.visitors.get(id).map(|e| e.value().clone())
    }

    fn get_unit(&self, id: &UnitId) -> Option<UnitRecord> {
        self.units.get(id).map(|e| e.value().clone())
    }
}
