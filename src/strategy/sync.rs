//! Synchronous processing strategy
//!
//! This module provides a synchronous, single-threaded implementation of the
//! ProcessingStrategy trait. It orchestrates replay by coordinating between
//! the SyncReader (for CSV input) and the Marketplace (for business logic).
//!
//! # Design
//!
//! The SyncProcessingStrategy focuses on orchestration, delegating:
//! - CSV parsing to `SyncReader` (iterator interface)
//! - Command processing to `Marketplace` (business logic)
//! - CSV output to `csv_format::write_accounts_csv` (format handling)

use crate::config::LedgerConfig;
use crate::core::{LedgerSnapshot, Marketplace};
use crate::io::csv_format::write_accounts_csv;
use crate::io::sync_reader::SyncReader;
use crate::strategy::{log_result, ProcessingStrategy};
use std::io::Write;
use std::path::Path;

/// Synchronous processing strategy
///
/// # Examples
///
/// ```no_run
/// use marketplace_ledger::config::LedgerConfig;
/// use marketplace_ledger::strategy::{ProcessingStrategy, SyncProcessingStrategy};
/// use std::path::Path;
/// use std::io;
///
/// let strategy = SyncProcessingStrategy::new(LedgerConfig::default());
/// let mut output = io::stdout();
///
/// strategy.process(Path::new("commands.csv"), &mut output)
///     .expect("Processing failed");
/// ```
#[derive(Debug, Clone)]
pub struct SyncProcessingStrategy {
    ledger: LedgerConfig,
}

impl SyncProcessingStrategy {
    pub fn new(ledger: LedgerConfig) -> Self {
        Self { ledger }
    }
}

impl ProcessingStrategy for SyncProcessingStrategy {
    /// Replay commands from input file and write balances to output
    ///
    /// 1. Creates a SyncReader to stream commands from the CSV file
    /// 2. Creates an in-memory Marketplace
    /// 3. Applies each command in file order
    /// 4. Writes the final balances using csv_format::write_accounts_csv
    fn process(
        &self,
        input_path: &Path,
        output: &mut dyn Write,
    ) -> Result<LedgerSnapshot, String> {
        let marketplace = Marketplace::in_memory(self.ledger.clone());
        let reader = SyncReader::new(input_path)?;

        for result in reader {
            match result {
                Ok(command) => {
                    let outcome = marketplace.process(command.clone());
                    log_result(&command, &outcome);
                }
                Err(e) => tracing::warn!(error = %e, "skipping malformed record"),
            }
        }

        let snapshot = marketplace
            .snapshot()
            .map_err(|e| format!("Failed to read final ledger state: {}", e))?;
        write_accounts_csv(&snapshot.accounts, output)?;

        Ok(snapshot)
    }
}
