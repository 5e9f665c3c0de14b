//! # Correspondence Custody
//!
//! Tracks mail and parcels from receipt at the gate to hand-off. Same
//! per-record locking as visits, no credentials.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use gatehouse_core::{CorrespondenceId, TimeSource, UnitId};
use gatehouse_state::{Correspondence, CorrespondenceStatus, Delivery, NewCorrespondence};

use crate::directory::Directory;
use crate::error::EngineError;
use crate::store::RecordStore;

/// Awaiting-pickup count for one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitBacklog {
    pub unit_id: UnitId,
    pub awaiting: usize,
}

/// The custody desk.
pub struct CustodyService {
    items: RecordStore<CorrespondenceId, Correspondence>,
    directory: Arc<dyn Directory>,
    clock: Arc<dyn TimeSource>,
}

impl std::fmt::Debug for CustodyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustodyService").field("items", &self.items).finish()
    }
}

impl CustodyService {
    pub fn new(directory: Arc<dyn Directory>, clock: Arc<dyn TimeSource>, lock_timeout: Duration) -> Self {
        Self {
            items: RecordStore::new(lock_timeout),
            directory,
            clock,
        }
    }

    /// Log a received item against a unit.
    pub fn receive(&self, req: NewCorrespondence) -> Result<Correspondence, EngineError> {
        if self.directory.get_unit(&req.unit_id).is_none() {
            return Err(EngineError::Validation(format!("unknown unit {}", req.unit_id)));
        }
        let item = Correspondence::receive(req, self.clock.now())?;
        self.items.insert(item.id, item.clone());
        tracing::info!(correspondence_id = %item.id, unit_id = %item.unit_id, kind = item.kind.as_str(), "correspondence received");
        Ok(item)
    }

    /// Hand an item over. The signature blob is stored as given.
    pub fn deliver(&self, id: CorrespondenceId, delivery: Delivery) -> Result<Correspondence, EngineError> {
        let now = self.clock.now();
        let item = self.mutate(id, |item| item.deliver(delivery, now))?;
        tracing::info!(correspondence_id = %id, "correspondence delivered");
        Ok(item)
    }

    pub fn return_to_sender(&self, id: CorrespondenceId, reason: Option<String>) -> Result<Correspondence, EngineError> {
        let now = self.clock.now();
        let item = self.mutate(id, |item| item.return_to_sender(reason, now))?;
        tracing::info!(correspondence_id = %id, "correspondence returned to sender");
        Ok(item)
    }

    pub fn mark_not_collected(&self, id: CorrespondenceId, reason: Option<String>) -> Result<Correspondence, EngineError> {
        let now = self.clock.now();
        let item = self.mutate(id, |item| item.mark_not_collected(reason, now))?;
        tracing::info!(correspondence_id = %id, "correspondence marked not collected");
        Ok(item)
    }

    pub fn get(&self, id: CorrespondenceId) -> Result<Correspondence, EngineError> {
        self.items
            .get(&id)
            .map_err(|e| EngineError::from_store(e, "correspondence", id.to_string()))
    }

    pub fn count_awaiting(&self) -> usize {
        self.items
            .snapshot()
            .iter()
            .filter(|c| c.status() == CorrespondenceStatus::AwaitingPickup)
            .count()
    }

    /// Awaiting-pickup counts per unit, ordered by unit id. Units with
    /// nothing waiting are omitted.
    pub fn awaiting_by_unit(&self) -> Vec<UnitBacklog> {
        let mut counts: BTreeMap<UnitId, usize> = BTreeMap::new();
        for item in self.items.snapshot() {
            if item.status() == CorrespondenceStatus::AwaitingPickup {
                *counts.entry(item.unit_id).or_default() += 1;
            }
        }
        counts
            .into_iter()
            .map(|(unit_id, awaiting)| UnitBacklog { unit_id, awaiting })
            .collect()
    }

    pub fn restore(&self, items: impl IntoIterator<Item = Correspondence>) -> usize {
        let mut n = 0;
        for item in items {
            self.items.insert(item.id, item);
            n += 1;
        }
        n
    }

    /// Put an item back to `before` while it is still in `after`. Returns
    /// whether it was put back.
    pub fn revert_to(&self, before: &Correspondence, after: CorrespondenceStatus) -> Result<bool, EngineError> {
        let reverted = self
            .items
            .with_record(&before.id, |item| {
                if item.status() != after {
                    return false;
                }
                *item = before.clone();
                true
            })
            .map_err(|e| EngineError::from_store(e, "correspondence", before.id.to_string()))?;
        if reverted {
            tracing::warn!(correspondence_id = %before.id, from = after.as_str(), "correspondence transition reverted");
        }
        Ok(reverted)
    }

    /// Replace the in-memory item with the stored one.
    pub fn reinstate(&self, stored: Correspondence) -> Result<(), EngineError> {
        let id = stored.id;
        self.items
            .with_record(&id, |item| *item = stored)
            .map_err(|e| EngineError::from_store(e, "correspondence", id.to_string()))?;
        tracing::warn!(correspondence_id = %id, "correspondence reinstated from storage");
        Ok(())
    }

    /// Forget an item that never reached durable storage.
    pub fn discard(&self, id: CorrespondenceId) -> bool {
        self.items.remove(&id)
    }

    fn mutate<E>(
        &self,
        id: CorrespondenceId,
        f: impl FnOnce(&mut Correspondence) -> Result<(), E>,
    ) -> Result<Correspondence, EngineError>
    where
        EngineError: From<E>,
    {
        self.items
            .with_record(&id, |item| -> Result<Correspondence, EngineError> {
                f(item)?;
                Ok(item.clone())
            })
            .map_err(|e| EngineError::from_store(e, "correspondence", id.to_string()))?
    }
}
