//! Thread-safe in-memory document store
//!
//! This module provides the `MemoryStore` struct, which keeps every document
//! in a `DashMap` keyed by collection and document key.
//!
//! # Thread Safety
//!
//! DashMap shards its entries and locks per shard, so writers touching
//! different documents rarely block each other. The version check and the
//! write of `update_one` happen while holding the entry's shard lock, which
//! makes each conditional write atomic.
//!
//! # Fault Injection
//!
//! Tests can take the store offline or arm a single write failure after a
//! number of successful writes. Both surface as `StoreUnavailable`, the same
//! error a networked store would report on I/O failure or timeout.

use super::{Document, DocumentStore};
use crate::types::{Entity, LedgerError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

/// In-memory document store
#[derive(Debug)]
pub struct MemoryStore {
    /// Documents by (collection, key)
    documents: DashMap<(Entity, String), Document>,

    /// Every read and write fails while set
    offline: AtomicBool,

    /// Successful writes left before the next write fails; negative when disarmed
    writes_until_failure: AtomicI64,

    /// Whether the armed failure takes the whole store offline
    outage_on_failure: AtomicBool,

    /// Number of successful writes, for tests asserting that nothing changed
    writes: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            documents: DashMap::new(),
            offline: AtomicBool::new(false),
            writes_until_failure: AtomicI64::new(-1),
            outage_on_failure: AtomicBool::new(false),
            writes: AtomicU64::new(0),
        }
    }

    /// Take the store offline (or bring it back)
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Let `successful_writes` more writes through, then fail the next one
    ///
    /// The failure fires once; later writes succeed again.
    pub fn fail_write_after(&self, successful_writes: u32) {
        self.outage_on_failure.store(false, Ordering::SeqCst);
        self.writes_until_failure
            .store(i64::from(successful_writes), Ordering::SeqCst);
    }

    /// Let `successful_writes` more writes through, then go offline
    ///
    /// The store stays offline until `set_offline(false)`.
    pub fn go_offline_after(&self, successful_writes: u32) {
        self.outage_on_failure.store(true, Ordering::SeqCst);
        self.writes_until_failure
            .store(i64::from(successful_writes), Ordering::SeqCst);
    }

    /// Disarm any pending failure and bring the store back online
    pub fn clear_faults(&self) {
        self.writes_until_failure.store(-1, Ordering::SeqCst);
        self.outage_on_failure.store(false, Ordering::SeqCst);
        self.set_offline(false);
    }

    /// Number of writes that have succeeded so far
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_online(&self, collection: Entity, key: &str) -> Result<(), LedgerError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LedgerError::store_unavailable(format!(
                "store offline while accessing {collection} '{key}'"
            )));
        }
        Ok(())
    }

    fn check_write(&self, collection: Entity, key: &str) -> Result<(), LedgerError> {
        self.check_online(collection, key)?;

        let previous =
            self.writes_until_failure
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                    l if l < 0 => None,
                    0 => Some(-1),
                    l => Some(l - 1),
                });

        if previous == Ok(0) {
            if self.outage_on_failure.load(Ordering::SeqCst) {
                self.set_offline(true);
            }
            return Err(LedgerError::store_unavailable(format!(
                "write to {collection} '{key}' failed"
            )));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryStore {
    fn find_one(&self, collection: Entity, key: &str) -> Result<Option<Document>, LedgerError> {
        self.check_online(collection, key)?;
        Ok(self
            .documents
            .get(&(collection, key.to_string()))
            .map(|entry| entry.value().clone()))
    }

    fn insert_one(
        &self,
        collection: Entity,
        key: &str,
        body: Value,
    ) -> Result<Document, LedgerError> {
        self.check_write(collection, key)?;

        match self.documents.entry((collection, key.to_string())) {
            Entry::Occupied(_) => Err(LedgerError::already_exists(collection, key)),
            Entry::Vacant(vacant) => {
                let document = Document { version: 1, body };
                vacant.insert(document.clone());
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(document)
            }
        }
    }

    fn update_one(
        &self,
        collection: Entity,
        key: &str,
        expected_version: u64,
        body: Value,
    ) -> Result<Document, LedgerError> {
        self.check_write(collection, key)?;

        let mut entry = self
            .documents
            .get_mut(&(collection, key.to_string()))
            .ok_or_else(|| LedgerError::not_found(collection, key))?;

        if entry.version != expected_version {
            return Err(LedgerError::version_conflict(collection, key));
        }

        let document = entry.value_mut();
        document.version += 1;
        document.body = body;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(document.clone())
    }

    fn keys(&self, collection: Entity) -> Result<Vec<String>, LedgerError> {
        self.check_online(collection, "*")?;

        let mut keys: Vec<String> = self
            .documents
            .iter()
            .filter(|entry| entry.key().0 == collection)
            .map(|entry| entry.key().1.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_insert_starts_at_version_one() {
        let store = MemoryStore::new();

        let document = store
            .insert_one(Entity::Account, "alice", json!({"balance": "10"}))
            .unwrap();

        assert_eq!(document.version, 1);
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn test_insert_rejects_existing_key() {
        let store = MemoryStore::new();
        store
            .insert_one(Entity::Account, "alice", json!({}))
            .unwrap();

        let result = store.insert_one(Entity::Account, "alice", json!({}));
        assert_eq!(
            result.unwrap_err(),
            LedgerError::already_exists(Entity::Account, "alice")
        );
    }

    #[test]
    fn test_collections_are_separate() {
        let store = MemoryStore::new();
        store.insert_one(Entity::Account, "x", json!(1)).unwrap();
        store.insert_one(Entity::Product, "x", json!(2)).unwrap();

        assert_eq!(
            store.find_one(Entity::Account, "x").unwrap().unwrap().body,
            json!(1)
        );
        assert_eq!(store.keys(Entity::Product).unwrap(), vec!["x".to_string()]);
        assert!(store.keys(Entity::Receipt).unwrap().is_empty());
    }

    #[test]
    fn test_update_bumps_version() {
        let store = MemoryStore::new();
        store.insert_one(Entity::Account, "alice", json!(1)).unwrap();

        let document = store
            .update_one(Entity::Account, "alice", 1, json!(2))
            .unwrap();

        assert_eq!(document.version, 2);
        assert_eq!(document.body, json!(2));
    }

    #[test]
    fn test_update_with_stale_version_conflicts() {
        let store = MemoryStore::new();
        store.insert_one(Entity::Account, "alice", json!(1)).unwrap();
        store
            .update_one(Entity::Account, "alice", 1, json!(2))
            .unwrap();

        let result = store.update_one(Entity::Account, "alice", 1, json!(3));

        assert_eq!(
            result.unwrap_err(),
            LedgerError::version_conflict(Entity::Account, "alice")
        );
        assert_eq!(
            store.find_one(Entity::Account, "alice").unwrap().unwrap().body,
            json!(2)
        );
    }

    #[test]
    fn test_update_missing_document() {
        let store = MemoryStore::new();

        let result = store.update_one(Entity::Account, "ghost", 1, json!(1));
        assert_eq!(
            result.unwrap_err(),
            LedgerError::not_found(Entity::Account, "ghost")
        );
    }

    #[test]
    fn test_offline_store_rejects_reads_and_writes() {
        let store = MemoryStore::new();
        store.insert_one(Entity::Account, "alice", json!(1)).unwrap();
        store.set_offline(true);

        assert!(matches!(
            store.find_one(Entity::Account, "alice"),
            Err(LedgerError::StoreUnavailable { .. })
        ));
        assert!(matches!(
            store.update_one(Entity::Account, "alice", 1, json!(2)),
            Err(LedgerError::StoreUnavailable { .. })
        ));

        store.set_offline(false);
        assert!(store.find_one(Entity::Account, "alice").unwrap().is_some());
    }

    #[test]
    fn test_armed_write_failure_fires_once() {
        let store = MemoryStore::new();
        store.fail_write_after(1);

        assert!(store.insert_one(Entity::Account, "a", json!(1)).is_ok());
        assert!(matches!(
            store.insert_one(Entity::Account, "b", json!(1)),
            Err(LedgerError::StoreUnavailable { .. })
        ));
        assert!(store.insert_one(Entity::Account, "b", json!(1)).is_ok());
        assert_eq!(store.write_count(), 2);
    }

    #[test]
    fn test_outage_after_writes_persists() {
        let store = MemoryStore::new();
        store.go_offline_after(1);

        assert!(store.insert_one(Entity::Account, "a", json!(1)).is_ok());
        assert!(store.insert_one(Entity::Account, "b", json!(1)).is_err());
        assert!(store.find_one(Entity::Account, "a").is_err());

        store.set_offline(false);
        assert!(store.insert_one(Entity::Account, "b", json!(1)).is_ok());
    }

    #[test]
    fn test_clear_faults_disarms_pending_failure() {
        let store = MemoryStore::new();
        store.go_offline_after(0);
        store.clear_faults();

        assert!(store.insert_one(Entity::Account, "a", json!(1)).is_ok());
        assert!(store.insert_one(Entity::Account, "b", json!(1)).is_ok());
    }

    #[test]
    fn test_concurrent_conditional_writes_have_one_winner_per_version() {
        let store = Arc::new(MemoryStore::new());
        store.insert_one(Entity::Counter, "c", json!(0)).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.update_one(Entity::Counter, "c", 1, json!(i)).is_ok())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert_eq!(
            store.find_one(Entity::Counter, "c").unwrap().unwrap().version,
            2
        );
    }
}
