//! Batch processing with conflict-based grouping of receipt confirmations
//!
//! This module provides the `BatchProcessor` struct, which runs a batch of
//! ledger commands against a shared marketplace, settling independent
//! receipt confirmations in parallel.
//!
//! # Design
//!
//! Commands other than confirmations (opening accounts, restocking, creating
//! receipts) are cheap and order-sensitive, so they run one at a time in input
//! order. Consecutive confirmations form a run. Within a run each confirmation
//! has a footprint: its receipt, both accounts and every product on the
//! receipt. Confirmations whose footprints overlap land in the same group and
//! run sequentially in input order; different groups run concurrently.
//!
//! This keeps the outcome identical to sequential processing: two
//! confirmations that could observe each other's effects (a shared product
//! running out, a shared payer hitting the overdraft limit) never race.
//!
//! # Architecture
//!
//! ```text
//! BatchProcessor
//!     └── Arc<Marketplace>  (shared, thread-safe ledger)
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use super::marketplace::{CommandOutcome, Marketplace};
use crate::types::{LedgerCommand, LedgerError};

/// Result of processing a single command
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    /// The command that was processed
    pub command: LedgerCommand,

    /// The result of processing (success or error)
    pub result: Result<CommandOutcome, LedgerError>,
}

/// Keys a confirmation reads or writes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Footprint {
    Receipt(u64),
    Account(String),
    Product(String),
}

/// Confirmations that must run in order, and the keys they touch
#[derive(Debug, Default)]
struct Group {
    keys: HashSet<Footprint>,
    commands: Vec<LedgerCommand>,
}

/// Batch processor with conflict-based grouping
#[derive(Clone)]
pub struct BatchProcessor {
    /// Shared ledger; every operation takes `&self`
    marketplace: Arc<Marketplace>,
}

impl BatchProcessor {
    /// Create a new BatchProcessor over a shared marketplace
    pub fn new(marketplace: Arc<Marketplace>) -> Self {
        Self { marketplace }
    }

    /// Process a batch of commands
    ///
    /// Non-confirmation commands act as barriers: every confirmation before
    /// them has finished when they run.
    ///
    /// # Returns
    ///
    /// One `ProcessingResult` per command. Results of a concurrent run come
    /// back group by group, so they may be out of input order.
    pub async fn process_batch(&self, batch: Vec<LedgerCommand>) -> Vec<ProcessingResult> {
        let mut results = Vec::with_capacity(batch.len());
        let mut run = Vec::new();

        for command in batch {
            if matches!(command, LedgerCommand::ConfirmReceipt { .. }) {
                run.push(command);
                continue;
            }

            if !run.is_empty() {
                results.extend(self.process_confirmations(std::mem::take(&mut run)).await);
            }
            results.push(self.process_one(command));
        }

        if !run.is_empty() {
            results.extend(self.process_confirmations(run).await);
        }
        results
    }

    /// Split a run of confirmations into independent groups
    ///
    /// # Guarantees
    ///
    /// - Each command appears in exactly one group
    /// - Commands within a group keep their input order
    /// - No two groups share a receipt, an account or a product
    fn partition_confirmations(&self, run: Vec<LedgerCommand>) -> Vec<Vec<LedgerCommand>> {
        let mut groups: Vec<Group> = Vec::new();

        for command in run {
            let keys = self.footprint(&command);

            let (overlapping, disjoint): (Vec<Group>, Vec<Group>) = groups
                .into_iter()
                .partition(|group| !group.keys.is_disjoint(&keys));
            groups = disjoint;

            let mut merged = Group::default();
            for group in overlapping {
                merged.keys.extend(group.keys);
                merged.commands.extend(group.commands);
            }
            merged.keys.extend(keys);
            merged.commands.push(command);
            groups.push(merged);
        }

        groups.into_iter().map(|group| group.commands).collect()
    }

    fn footprint(&self, command: &LedgerCommand) -> HashSet<Footprint> {
        let mut keys = HashSet::new();
        if let LedgerCommand::ConfirmReceipt {
            receipt,
            payer,
            payee,
        } = command
        {
            keys.insert(Footprint::Receipt(*receipt));
            keys.insert(Footprint::Account(payer.clone()));
            keys.insert(Footprint::Account(payee.clone()));

            // An unknown receipt fails on its own; its accounts still group it
            if let Ok(receipt) = self.marketplace.get_receipt(*receipt) {
                for line in receipt.lines {
                    keys.insert(Footprint::Product(line.product_id));
                }
            }
        }
        keys
    }

    /// Process a run of confirmations, groups in parallel
    async fn process_confirmations(&self, run: Vec<LedgerCommand>) -> Vec<ProcessingResult> {
        let groups = self.partition_confirmations(run);
        tracing::debug!(groups = groups.len(), "settling confirmation groups");

        let mut tasks = Vec::with_capacity(groups.len());
        for commands in groups {
            let processor = self.clone();
            tasks.push(tokio::task::spawn_blocking(move || {
                commands
                    .into_iter()
                    .map(|command| processor.process_one(command))
                    .collect::<Vec<_>>()
            }));
        }

        let mut results = Vec::new();
        for task in tasks {
            match task.await {
                Ok(group_results) => results.extend(group_results),
                Err(e) => tracing::error!(error = %e, "settlement task panicked"),
            }
        }
        results
    }

    fn process_one(&self, command: LedgerCommand) -> ProcessingResult {
        let result = self.marketplace.process(command.clone());
        ProcessingResult { command, result }
    }
}
