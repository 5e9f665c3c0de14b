//! # Record Store
//!
//! Concurrent map of records, each behind its own mutex. Mutations on one
//! record serialize on that record's lock only; there is no store-wide
//! write lock. Lock acquisition is bounded: a caller that cannot get the
//! lock within the configured timeout gets [`StoreError::LockTimeout`]
//! instead of waiting indefinitely.
//!
//! The map shard lock is held only long enough to clone the record's `Arc`,
//! never while a record lock is held or a closure runs.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;

/// Failures of a store access.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No record under that key.
    #[error("record not found")]
    NotFound,
    /// The record lock was not acquired in time.
    #[error("record lock not acquired within {0:?}")]
    LockTimeout(Duration),
}

/// Thread-safe, cloneable store with per-record locks.
pub struct RecordStore<K, V> {
    records: Arc<DashMap<K, Arc<Mutex<V>>>>,
    lock_timeout: Duration,
}

impl<K, V> Clone for RecordStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
            lock_timeout: self.lock_timeout,
        }
    }
}

impl<K: Eq + Hash, V> std::fmt::Debug for RecordStore<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("len", &self.records.len())
            .field("lock_timeout", &self.lock_timeout)
            .finish()
    }
}

impl<K, V> RecordStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an empty store.
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            lock_timeout,
        }
    }

    /// Insert or replace a record.
    pub fn insert(&self, key: K, value: V) {
        self.records.insert(key, Arc::new(Mutex::new(value)));
    }

    /// Drop a record. Returns whether it existed. A caller already holding
    /// the record's lock keeps its `Arc` until it lets go.
    pub fn remove(&self, key: &K) -> bool {
        self.records.remove(key).is_some()
    }

    /// Snapshot of one record.
    pub fn get(&self, key: &K) -> Result<V, StoreError> {
        self.with_record(key, |v| v.clone())
    }

    /// Run `f` with exclusive access to one record.
    ///
    /// Read, validate, and mutate happen under the same lock, so no other
    /// caller can observe or change the record in between.
    pub fn with_record<R>(&self, key: &K, f: impl FnOnce(&mut V) -> R) -> Result<R, StoreError> {
        let cell = self
            .records
            .get(key)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(StoreError::NotFound)?;
        let mut guard = cell
            .try_lock_for(self.lock_timeout)
            .ok_or(StoreError::LockTimeout(self.lock_timeout))?;
        Ok(f(&mut guard))
    }

    /// Keys currently in the store.
    pub fn keys(&self) -> Vec<K> {
        self.records.iter().map(|e| e.key().clone()).collect()
    }

    /// Snapshots of every record whose lock could be taken in time.
    /// Records held past the timeout are skipped.
    pub fn snapshot(&self) -> Vec<V> {
        self.keys()
            .iter()
            .filter_map(|k| self.get(k).ok())
            .collect()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether a record exists.
    pub fn contains(&self, key: &K) -> bool {
        self.records.contains_key(key)
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    fn store() -> RecordStore<u32, i64> {
        RecordStore::new(Duration::from_millis(200))
    }

    #[test]
    fn insert_get_update() {
        let s = store();
        s.insert(1, 10);
        assert_eq!(s.get(&1), Ok(10));
        let out = s.with_record(&1, |v| {
            *v += 5;
            *v
        });
        assert_eq!(out, Ok(15));
        assert_eq!(s.get(&1), Ok(15));
    }

    #[test]
    fn debug_reports_length() {
        let s = store();
        s.insert(1, 1);
        s.insert(2, 2);
        let debug = format!("{s:?}");
        assert!(debug.contains("len: 2"), "{debug}");
    }

    #[test]
    fn missing_key_is_not_found() {
        assert_eq!(store().get(&9), Err(StoreError::NotFound));
    }

    #[test]
    fn removed_record_is_not_found() {
        let s = store();
        s.insert(1, 1);
        assert!(s.remove(&1));
        assert!(!s.remove(&1));
        assert_eq!(s.get(&1), Err(StoreError::NotFound));
        assert!(s.is_empty());
    }

    #[test]
    fn clones_share_data() {
        let a = store();
        let b = a.clone();
        a.insert(1, 1);
        assert!(b.contains(&1));
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn concurrent_increments_are_serialized() {
        let s = store();
        s.insert(1, 0);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = s.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        s.with_record(&1, |v| *v += 1).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(s.get(&1), Ok(800));
    }

    #[test]
    fn held_lock_times_out_instead_of_hanging() {
        let s = RecordStore::<u32, i64>::new(Duration::from_millis(20));
        s.insert(1, 0);
        let holder = s.clone();
        let barrier = Arc::new(Barrier::new(2));
        let b2 = Arc::clone(&barrier);
        let handle = thread::spawn(move || {
            holder
                .with_record(&1, |_| {
                    b2.wait();
                    thread::sleep(Duration::from_millis(200));
                })
                .unwrap();
        });
        barrier.wait();
        assert_eq!(
            s.with_record(&1, |_| ()),
            Err(StoreError::LockTimeout(Duration::from_millis(20)))
        );
        handle.join().unwrap();
    }

    #[test]
    fn other_records_are_not_blocked() {
        let s = RecordStore::<u32, i64>::new(Duration::from_millis(20));
        s.insert(1, 0);
        s.insert(2, 0);
        let holder = s.clone();
        let barrier = Arc::new(Barrier::new(2));
        let b2 = Arc::clone(&barrier);
        let handle = thread::spawn(move || {
            holder
                .with_record(&1, |_| {
                    b2.wait();
                    thread::sleep(Duration::from_millis(100));
                })
                .unwrap();
        });
        barrier.wait();
        assert_eq!(s.with_record(&2, |v| *v + 1), Ok(1));
        handle.join().unwrap();
    }
}
