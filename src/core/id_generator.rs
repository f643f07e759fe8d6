//! Receipt identifier generation
//!
//! Receipt ids come from a single counter document holding the next id to
//! hand out. Advancing the counter is a conditional write on the version that
//! was read, so two callers can never receive the same id: the loser of a race
//! re-reads the counter and tries again.

use crate::store::{self, DocumentStore};
use crate::types::{Entity, LedgerError, ReceiptId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Key of the receipt counter in the counters collection
const RECEIPT_COUNTER: &str = "receipts";

/// Counter document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct IdCounter {
    next: ReceiptId,
}

/// Strictly increasing receipt id source
#[derive(Clone)]
pub struct IdGenerator {
    store: Arc<dyn DocumentStore>,
    first_id: ReceiptId,
    conflict_retries: u32,
}

impl IdGenerator {
    /// Create a generator over `store`
    ///
    /// `first_id` is only used when the counter document does not exist yet.
    pub fn new(store: Arc<dyn DocumentStore>, first_id: ReceiptId, conflict_retries: u32) -> Self {
        Self {
            store,
            first_id,
            conflict_retries,
        }
    }

    /// Hand out the next receipt id
    ///
    /// # Errors
    ///
    /// - `StoreUnavailable` if the counter cannot be read or written
    /// - `Contention` if concurrent callers kept winning the race
    /// - `ArithmeticOverflow` if the id space is exhausted
    pub fn next(&self) -> Result<ReceiptId, LedgerError> {
        let store = self.store.as_ref();

        store::retry_on_conflict(
            Entity::Counter,
            RECEIPT_COUNTER,
            self.conflict_retries,
            || match store::fetch::<IdCounter>(store, Entity::Counter, RECEIPT_COUNTER)? {
                Some(counter) => {
                    let id = counter.value.next;
                    let next = id.checked_add(1).ok_or_else(|| {
                        LedgerError::arithmetic_overflow("next id", RECEIPT_COUNTER)
                    })?;
                    store::replace(
                        store,
                        Entity::Counter,
                        RECEIPT_COUNTER,
                        counter.version,
                        &IdCounter { next },
                    )?;
                    Ok(id)
                }
                None => {
                    let id = self.first_id;
                    let next = id.checked_add(1).ok_or_else(|| {
                        LedgerError::arithmetic_overflow("next id", RECEIPT_COUNTER)
                    })?;
                    // A concurrent first caller makes this fail with
                    // AlreadyExists, which is retried like a conflict.
                    store::insert(store, Entity::Counter, RECEIPT_COUNTER, &IdCounter { next })?;
                    Ok(id)
                }
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::collections::HashSet;
    use std::thread;

    fn generator(store: &Arc<MemoryStore>, first_id: ReceiptId) -> IdGenerator {
        IdGenerator::new(store.clone() as Arc<dyn DocumentStore>, first_id, 64)
    }

    #[test]
    fn test_fresh_counter_starts_at_first_id() {
        let store = Arc::new(MemoryStore::new());
        let ids = generator(&store, 1);

        assert_eq!(ids.next().unwrap(), 1);
        assert_eq!(ids.next().unwrap(), 2);
        assert_eq!(ids.next().unwrap(), 3);
    }

    #[test]
    fn test_existing_counter_wins_over_first_id() {
        let store = Arc::new(MemoryStore::new());
        generator(&store, 100).next().unwrap();

        // A second generator configured differently continues the shared counter
        assert_eq!(generator(&store, 1).next().unwrap(), 101);
    }

    #[test]
    fn test_store_failure_is_reported() {
        let store = Arc::new(MemoryStore::new());
        let ids = generator(&store, 1);
        store.set_offline(true);

        assert!(matches!(
            ids.next(),
            Err(LedgerError::StoreUnavailable { .. })
        ));
    }

    #[test]
    fn test_failed_increment_does_not_consume_an_id() {
        let store = Arc::new(MemoryStore::new());
        let ids = generator(&store, 1);
        assert_eq!(ids.next().unwrap(), 1);

        store.fail_write_after(0);
        assert!(ids.next().is_err());

        assert_eq!(ids.next().unwrap(), 2);
    }

    #[test]
    fn test_concurrent_callers_get_unique_ids() {
        let store = Arc::new(MemoryStore::new());
        let ids = IdGenerator::new(store.clone() as Arc<dyn DocumentStore>, 1, 10_000);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = ids.clone();
                thread::spawn(move || (0..50).map(|_| ids.next().unwrap()).collect::<Vec<_>>())
            })
            .collect();

        let all: Vec<ReceiptId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let unique: HashSet<ReceiptId> = all.iter().copied().collect();

        assert_eq!(all.len(), 400);
        assert_eq!(unique.len(), 400);
        assert_eq!(unique.iter().copied().max(), Some(400));
    }
}
