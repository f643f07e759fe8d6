//! Core business logic module
//!
//! This module contains the ledger components, leaves first:
//! - `id_generator` - Strictly increasing receipt ids
//! - `inventory` - Products, stock lots and FIFO depletion
//! - `account_ledger` - Account balances and the overdraft policy
//! - `directory` - Username to account resolution
//! - `receipt_engine` - Receipt creation and settlement
//! - `marketplace` - Facade wiring everything to one store
//! - `batch_processor` - Concurrent settlement of independent confirmations

pub mod account_ledger;
pub mod batch_processor;
pub mod directory;
pub mod id_generator;
pub mod inventory;
pub mod marketplace;
pub mod receipt_engine;

pub use account_ledger::AccountLedger;
pub use batch_processor::BatchProcessor;
pub use directory::UserDirectory;
pub use id_generator::IdGenerator;
pub use inventory::InventoryLedger;
pub use marketplace::{CommandOutcome, LedgerSnapshot, Marketplace};
pub use receipt_engine::{ReceiptEngine, Settled};

/// Result of applying a change to a loaded document
///
/// `Unchanged` skips the write, so replays and no-ops leave the document
/// version alone.
pub(crate) enum Change<R> {
    Changed(R),
    Unchanged(R),
}
