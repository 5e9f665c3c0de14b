//! # Per-Record Write Gates
//!
//! An engine transition and its database write form one unit. The gate for
//! a record is held from before the transition until the write is
//! acknowledged or rolled back, so writes for one record reach the database
//! in the order the engine applied them, and no second transition starts
//! from a state the database never saw.
//!
//! Gates are async mutexes keyed by record id. Waiting is bounded; an entry
//! is dropped once nobody holds or waits on it.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// The gate was not acquired in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateTimeout(pub Duration);

/// Async per-record gates.
#[derive(Clone, Default)]
pub struct WriteGates {
    gates: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for WriteGates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteGates").field("open", &self.gates.len()).finish()
    }
}

/// Exclusive hold on one record's gate. Released on drop.
pub struct GateGuard {
    id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
    gates: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.guard.take();
        // The map's own Arc is the only one left when nobody waits.
        self.gates
            .remove_if(&self.id, |_, gate| Arc::strong_count(gate) == 1);
    }
}

impl WriteGates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait up to `timeout` for the gate of `id`.
    pub async fn acquire(&self, id: Uuid, timeout: Duration) -> Result<GateGuard, GateTimeout> {
        let gate = Arc::clone(self.gates.entry(id).or_default().value());
        let guard = tokio::time::timeout(timeout, gate.lock_owned())
            .await
            .map_err(|_| GateTimeout(timeout))?;
        Ok(GateGuard {
            id,
            guard: Some(guard),
            gates: Arc::clone(&self.gates),
        })
    }

    /// Gates currently held or awaited.
    pub fn open(&self) -> usize {
        self.gates.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_holder_waits_then_times_out() {
        let gates = WriteGates::new();
        let id = Uuid::new_v4();
        let held = gates.acquire(id, Duration::from_millis(50)).await.unwrap();
        let err = gates.acquire(id, Duration::from_millis(20)).await.err();
        assert_eq!(err, Some(GateTimeout(Duration::from_millis(20))));
        drop(held);
        assert!(gates.acquire(id, Duration::from_millis(20)).await.is_ok());
    }

    #[tokio::test]
    async fn distinct_records_do_not_contend() {
        let gates = WriteGates::new();
        let _a = gates.acquire(Uuid::new_v4(), Duration::from_millis(20)).await.unwrap();
        assert!(gates.acquire(Uuid::new_v4(), Duration::from_millis(20)).await.is_ok());
    }

    #[tokio::test]
    async fn released_gates_are_dropped() {
        let gates = WriteGates::new();
        let id = Uuid::new_v4();
        let guard = gates.acquire(id, Duration::from_millis(20)).await.unwrap();
        assert_eq!(gates.open(), 1);
        drop(guard);
        assert_eq!(gates.open(), 0);
    }

    #[tokio::test]
    async fn waiters_are_served_in_turn() {
        let gates = WriteGates::new();
        let id = Uuid::new_v4();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let first = gates.acquire(id, Duration::from_secs(1)).await.unwrap();
        let waiter = {
            let gates = gates.clone();
            let order = order.clone();
            tokio::spawn(async move {
                let _g = gates.acquire(id, Duration::from_secs(1)).await.unwrap();
                order.lock().push(2);
            })
        };
        tokio::task::yield_now().await;
        order.lock().push(1);
        drop(first);
        waiter.await.unwrap();
        assert_eq!(*order.lock(), vec![1, 2]);
        assert_eq!(gates.open(), 0);
    }
}
