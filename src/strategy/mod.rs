//! Processing strategy module for command journal replay
//!
//! This module defines the Strategy pattern for complete replay pipelines,
//! encompassing both CSV parsing and ledger processing. This allows different
//! processing implementations (synchronous, asynchronous batch) to be selected
//! at runtime.

use crate::cli::StrategyType;
use crate::config::LedgerConfig;
use crate::core::LedgerSnapshot;
use crate::types::{LedgerCommand, LedgerError};
use std::io::Write;
use std::path::Path;

pub mod r#async;
pub mod sync;

pub use self::r#async::{AsyncProcessingStrategy, BatchConfig};
pub use sync::SyncProcessingStrategy;

/// Processing strategy trait for complete replay pipelines
///
/// Each strategy reads ledger commands from a CSV file, applies them to a
/// fresh marketplace, writes the final account balances to output and hands
/// back the final ledger state.
pub trait ProcessingStrategy: Send + Sync {
    /// Replay commands from input file and write balances to output
    ///
    /// # Arguments
    ///
    /// * `input_path` - Path to the input CSV command journal
    /// * `output` - Writer receiving the `account,balance` report
    ///
    /// # Returns
    ///
    /// * `Ok(LedgerSnapshot)` with the final state if processing completed
    /// * `Err(String)` if a fatal error occurred (file not found, I/O error, etc.)
    ///
    /// Malformed rows and rejected commands are logged and skipped; they do
    /// not make this method fail.
    fn process(&self, input_path: &Path, output: &mut dyn Write)
        -> Result<LedgerSnapshot, String>;
}

/// Create a processing strategy based on the specified strategy type
///
/// # Arguments
///
/// * `strategy_type` - The type of processing strategy to create (Sync or Async)
/// * `ledger` - Ledger settings shared by both strategies
/// * `config` - Optional configuration for async batch processing (ignored for sync)
pub fn create_strategy(
    strategy_type: StrategyType,
    ledger: LedgerConfig,
    config: Option<BatchConfig>,
) -> Box<dyn ProcessingStrategy> {
    match strategy_type {
        StrategyType::Sync => Box::new(SyncProcessingStrategy::new(ledger)),
        StrategyType::Async => {
            let config = config.unwrap_or_default();
            Box::new(AsyncProcessingStrategy::new(ledger, config))
        }
    }
}

/// Log the outcome of one command
pub(crate) fn log_result<T>(command: &LedgerCommand, result: &Result<T, LedgerError>) {
    match result {
        Ok(_) => tracing::debug!(command = command.kind(), "command applied"),
        Err(error) => tracing::warn!(command = command.kind(), %error, "command rejected"),
    }
}
