//! Asynchronous batch processing strategy
//!
//! This module provides an asynchronous, multi-threaded implementation of the
//! ProcessingStrategy trait. It replays commands in batches and settles
//! independent receipt confirmations in parallel.
//!
//! # Architecture
//!
//! ```text
//! AsyncProcessingStrategy
//!     ├── BatchConfig (batch_size, max_concurrent_batches)
//!     ├── AsyncReader (batch CSV reading)
//!     ├── BatchProcessor (footprint grouping + blocking worker pool)
//!     └── Marketplace (shared ledger)
//!         ├── InventoryLedger
//!         ├── AccountLedger
//!         └── ReceiptEngine
//! ```
//!
//! # Ordering
//!
//! - Batches are processed one after another
//! - Inside a batch, only confirmations with disjoint footprints overlap
//! - Every other command runs alone, in input order
//!
//! The final ledger state therefore matches the synchronous strategy.

use crate::config::LedgerConfig;
use crate::core::{BatchProcessor, LedgerSnapshot, Marketplace};
use crate::io::async_reader::AsyncReader;
use crate::io::csv_format::write_accounts_csv;
use crate::strategy::{log_result, ProcessingStrategy};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Configuration for batch processing
///
/// Controls how commands are batched and the number of worker threads
/// settling confirmations within each batch.
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// Number of commands per batch
    pub batch_size: usize,
    /// Maximum number of confirmation groups settling concurrently
    pub max_concurrent_batches: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_concurrent_batches: num_cpus::get(),
        }
    }
}

impl BatchConfig {
    /// Create a new BatchConfig with custom values
    ///
    /// Zero values fall back to the defaults with a warning.
    pub fn new(batch_size: usize, max_concurrent_batches: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            tracing::warn!(
                default = default.batch_size,
                "invalid batch_size (0), using default"
            );
            default.batch_size
        } else {
            batch_size
        };

        let max_concurrent_batches = if max_concurrent_batches == 0 {
            tracing::warn!(
                default = default.max_concurrent_batches,
                "invalid max_concurrent_batches (0), using default"
            );
            default.max_concurrent_batches
        } else {
            max_concurrent_batches
        };

        Self {
            batch_size,
            max_concurrent_batches,
        }
    }
}

/// Asynchronous batch processing strategy
///
/// Commands are read in batches and processed batch by batch. Within a
/// batch, confirmations that share no receipt, account or product settle on
/// separate blocking threads.
///
/// # Configuration
///
/// - `batch_size`: Number of commands per batch (default: 1000)
/// - `max_concurrent_batches`: Number of worker threads (default: CPU cores)
#[derive(Debug, Clone)]
pub struct AsyncProcessingStrategy {
    ledger: LedgerConfig,
    /// Batch processing configuration
    config: BatchConfig,
}

impl AsyncProcessingStrategy {
    /// Create a new AsyncProcessingStrategy
    ///
    /// # Arguments
    ///
    /// * `ledger` - Ledger settings (overdraft policy, retry budget)
    /// * `config` - BatchConfig with batch_size and max_concurrent_batches
    pub fn new(ledger: LedgerConfig, config: BatchConfig) -> Self {
        Self { ledger, config }
    }
}

impl ProcessingStrategy for AsyncProcessingStrategy {
    /// Replay commands from input file and write balances to output
    ///
    /// 1. Creates a tokio multi-threaded runtime
    /// 2. Creates a shared Marketplace and a BatchProcessor over it
    /// 3. Reads commands in batches from CSV using AsyncReader
    /// 4. Processes each batch, waiting for completion before the next
    /// 5. Writes the final balances using csv_format::write_accounts_csv
    ///
    /// # Error Handling
    ///
    /// Fatal errors (file not found, I/O errors, runtime errors) are returned
    /// immediately. Rejected commands are logged and processing continues.
    fn process(
        &self,
        input_path: &Path,
        output: &mut dyn Write,
    ) -> Result<LedgerSnapshot, String> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.max_concurrent_batches)
            .max_blocking_threads(self.config.max_concurrent_batches)
            .build()
            .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

        runtime.block_on(async {
            let marketplace = Arc::new(Marketplace::in_memory(self.ledger.clone()));
            let processor = BatchProcessor::new(Arc::clone(&marketplace));

            let file = tokio::fs::File::open(input_path)
                .await
                .map_err(|e| format!("Failed to open file '{}': {}", input_path.display(), e))?;

            // csv-async reads futures::io::AsyncRead
            let compat_file = tokio_util::compat::TokioAsyncReadCompatExt::compat(file);
            let mut reader = AsyncReader::new(compat_file);

            loop {
                let batch = reader.read_batch(self.config.batch_size).await;
                if batch.is_empty() {
                    break;
                }

                for processed in processor.process_batch(batch).await {
                    log_result(&processed.command, &processed.result);
                }
            }

            let snapshot = marketplace
                .snapshot()
                .map_err(|e| format!("Failed to read final ledger state: {}", e))?;
            write_accounts_csv(&snapshot.accounts, output)?;

            Ok(snapshot)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::SyncProcessingStrategy;
    use crate::types::ReceiptStatus;
    use rstest::rstest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "type,account,counterparty,product,lot,name,price,quantity,amount,receipt,lines\n";

    fn create_temp_csv(rows: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(HEADER.as_bytes())
            .and_then(|_| file.write_all(rows.as_bytes()))
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    // Two buyers compete for 5 apples; the first confirmation in file order wins.
    const CONTESTED: &str = "open,alice,,,,,,,100,,\n\
                             open,bob,,,,,,,100,,\n\
                             open,carol,,,,,,,100,,\n\
                             open,shop,,,,,,,0,,\n\
                             restock,,,apple,apple-1,Apple,10,5,,,\n\
                             restock,,,pear,pear-1,Pear,4,10,,,\n\
                             receipt,,,,,,,,,,apple:4\n\
                             receipt,,,,,,,,,,apple:3\n\
                             receipt,,,,,,,,,,pear:2\n\
                             confirm,alice,shop,,,,,,,1,\n\
                             confirm,bob,shop,,,,,,,2,\n\
                             confirm,carol,shop,,,,,,,3,\n\
                             confirm,alice,shop,,,,,,,1,\n";

    #[test]
    fn test_async_strategy_settles_purchase() {
        let file = create_temp_csv(CONTESTED);
        let strategy = AsyncProcessingStrategy::new(LedgerConfig::default(), BatchConfig::default());
        let mut output = Vec::new();

        let snapshot = strategy.process(file.path(), &mut output).unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "account,balance\nalice,60.00\nbob,100.00\ncarol,92.00\nshop,48.00\n"
        );
        let statuses: Vec<_> = snapshot.receipts.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![ReceiptStatus::Closed, ReceiptStatus::Opened, ReceiptStatus::Closed]
        );
    }

    #[rstest]
    #[case::single_row_batches(1, 4)]
    #[case::small_batches(3, 2)]
    #[case::one_batch(1000, 8)]
    fn test_async_strategy_matches_sync(#[case] batch_size: usize, #[case] workers: usize) {
        let file = create_temp_csv(CONTESTED);

        let mut expected = Vec::new();
        SyncProcessingStrategy::new(LedgerConfig::default())
            .process(file.path(), &mut expected)
            .unwrap();

        let strategy = AsyncProcessingStrategy::new(
            LedgerConfig::default(),
            BatchConfig::new(batch_size, workers),
        );
        let mut output = Vec::new();
        strategy.process(file.path(), &mut output).unwrap();

        assert_eq!(output, expected);
    }

    #[test]
    fn test_async_strategy_handles_missing_file() {
        let strategy = AsyncProcessingStrategy::new(LedgerConfig::default(), BatchConfig::default());
        let mut output = Vec::new();

        let result = strategy.process(Path::new("nonexistent.csv"), &mut output);
        assert!(result.unwrap_err().contains("Failed to open file"));
    }

    #[test]
    fn test_batch_config_zero_values_fall_back() {
        let config = BatchConfig::new(0, 0);
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.max_concurrent_batches, num_cpus::get());
    }
}
