//! Document store abstraction
//!
//! The ledger persists every entity as a JSON document in a logical
//! collection (one per [`Entity`] kind), keyed by the entity's natural id.
//! Each document carries a version that starts at 1 and grows by one with
//! every write; updates are conditional on the version the writer read, so
//! read-modify-write cycles from concurrent callers cannot silently overwrite
//! each other.
//!
//! # Components
//!
//! - [`DocumentStore`] - the storage trait the ledger components depend on
//! - [`MemoryStore`] - thread-safe in-memory implementation with fault injection
//! - typed helpers ([`fetch`], [`insert`], [`replace`]) that handle serde
//!   encoding, and [`retry_on_conflict`] for optimistic update loops

pub mod memory;

pub use memory::MemoryStore;

use crate::types::{Entity, LedgerError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// A stored document with its version
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Monotonic per-document version, 1 after the first insert
    pub version: u64,
    pub body: Value,
}

/// Generic keyed document store
///
/// Implementations must make `insert_one` and `update_one` atomic with
/// respect to the version check.
pub trait DocumentStore: Send + Sync {
    /// Look up a document by key
    fn find_one(&self, collection: Entity, key: &str) -> Result<Option<Document>, LedgerError>;

    /// Insert a new document at version 1
    ///
    /// Fails with `AlreadyExists` if the key is taken.
    fn insert_one(&self, collection: Entity, key: &str, body: Value)
        -> Result<Document, LedgerError>;

    /// Replace a document if it is still at `expected_version`
    ///
    /// Fails with `NotFound` if the key is absent and `VersionConflict` if
    /// another writer got there first.
    fn update_one(
        &self,
        collection: Entity,
        key: &str,
        expected_version: u64,
        body: Value,
    ) -> Result<Document, LedgerError>;

    /// All keys of a collection, sorted
    fn keys(&self, collection: Entity) -> Result<Vec<String>, LedgerError>;
}

/// A decoded document together with the version it was read at
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

/// Load and decode a document
pub fn fetch<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: Entity,
    key: &str,
) -> Result<Option<Versioned<T>>, LedgerError> {
    match store.find_one(collection, key)? {
        Some(document) => {
            let value = serde_json::from_value(document.body)
                .map_err(|e| LedgerError::corrupt(collection, key, e))?;
            Ok(Some(Versioned {
                version: document.version,
                value,
            }))
        }
        None => Ok(None),
    }
}

/// Load and decode a document, failing with `NotFound` if it is absent
pub fn fetch_required<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: Entity,
    key: &str,
) -> Result<Versioned<T>, LedgerError> {
    fetch(store, collection, key)?.ok_or_else(|| LedgerError::not_found(collection, key))
}

/// Encode and insert a new document, returning its version
pub fn insert<T: Serialize>(
    store: &dyn DocumentStore,
    collection: Entity,
    key: &str,
    value: &T,
) -> Result<u64, LedgerError> {
    let body = serde_json::to_value(value).map_err(|e| LedgerError::corrupt(collection, key, e))?;
    Ok(store.insert_one(collection, key, body)?.version)
}

/// Encode and conditionally replace a document, returning its new version
pub fn replace<T: Serialize>(
    store: &dyn DocumentStore,
    collection: Entity,
    key: &str,
    expected_version: u64,
    value: &T,
) -> Result<u64, LedgerError> {
    let body = serde_json::to_value(value).map_err(|e| LedgerError::corrupt(collection, key, e))?;
    Ok(store
        .update_one(collection, key, expected_version, body)?
        .version)
}

/// Load every document of a collection
pub fn fetch_all<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: Entity,
) -> Result<Vec<T>, LedgerError> {
    let mut values = Vec::new();
    for key in store.keys(collection)? {
        values.push(fetch_required::<T>(store, collection, &key)?.value);
    }
    Ok(values)
}

/// Run an optimistic read-modify-write cycle until it stops conflicting
///
/// `op` is re-run from scratch (including its reads) whenever it fails with a
/// conflict. Any other error is returned as is. After `attempts` conflicting
/// runs the loop gives up with `Contention`.
pub fn retry_on_conflict<R, F>(
    collection: Entity,
    key: &str,
    attempts: u32,
    mut op: F,
) -> Result<R, LedgerError>
where
    F: FnMut() -> Result<R, LedgerError>,
{
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        match op() {
            Err(e) if e.is_conflict() => {
                tracing::debug!(%collection, key, attempt, "conditional write conflicted, retrying");
            }
            other => return other,
        }
    }
    tracing::warn!(%collection, key, attempts, "giving up after repeated write conflicts");
    Err(LedgerError::contention(collection, key, attempts))
}
