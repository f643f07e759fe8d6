use crate::config::LedgerConfig;
use crate::strategy::BatchConfig;
use crate::types::OverdraftPolicy;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Replay a marketplace command journal and settle receipts
#[derive(Parser, Debug)]
#[command(name = "marketplace-ledger")]
#[command(about = "Replay a marketplace command journal and settle receipts", long_about = None)]
pub struct CliArgs {
    /// Input CSV file path containing ledger commands
    #[arg(value_name = "INPUT", help = "Path to the input CSV command journal")]
    pub input_file: PathBuf,

    /// Processing strategy to use for replaying commands
    #[arg(
        long = "strategy",
        value_name = "STRATEGY",
        default_value = "async",
        help = "Processing strategy: 'sync' for synchronous or 'async' for asynchronous"
    )]
    pub strategy: StrategyType,

    /// Number of commands per batch (async mode only)
    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Number of commands per batch (default: 1000)"
    )]
    pub batch_size: Option<usize>,

    /// Maximum number of concurrent settlement groups (async mode only)
    #[arg(
        long = "max-concurrent",
        value_name = "COUNT",
        help = "Maximum number of confirmation groups settling concurrently (default: CPU cores)"
    )]
    pub max_concurrent_batches: Option<usize>,

    /// Whether settlement may push a payer below zero
    #[arg(
        long = "overdraft",
        value_name = "POLICY",
        default_value = "allow",
        help = "Overdraft policy: 'allow' lets balances go negative, 'deny' rejects such debits"
    )]
    pub overdraft: OverdraftArg,

    /// Retry budget for optimistic document updates
    #[arg(
        long = "conflict-retries",
        value_name = "COUNT",
        help = "Attempts per contended update before giving up (default: 16)"
    )]
    pub conflict_retries: Option<u32>,

    /// Optional path for the final inventory report
    #[arg(
        long = "inventory-out",
        value_name = "PATH",
        help = "Also write the final inventory as CSV to this path"
    )]
    pub inventory_out: Option<PathBuf>,
}

/// Available processing strategies for command replay
#[derive(Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyType {
    Sync,
    Async,
}

/// Overdraft policy as accepted on the command line
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OverdraftArg {
    Allow,
    Deny,
}

impl From<OverdraftArg> for OverdraftPolicy {
    fn from(arg: OverdraftArg) -> Self {
        match arg {
            OverdraftArg::Allow => OverdraftPolicy::Allow,
            OverdraftArg::Deny => OverdraftPolicy::Deny,
        }
    }
}

impl CliArgs {
    /// Create a BatchConfig from CLI arguments
    ///
    /// Uses the provided values or falls back to defaults. Zero values are
    /// replaced by the defaults with a warning.
    pub fn to_batch_config(&self) -> BatchConfig {
        if self.batch_size.is_some() || self.max_concurrent_batches.is_some() {
            let default = BatchConfig::default();
            BatchConfig::new(
                self.batch_size.unwrap_or(default.batch_size),
                self.max_concurrent_batches
                    .unwrap_or(default.max_concurrent_batches),
            )
        } else {
            BatchConfig::default()
        }
    }

    /// Create the ledger settings from CLI arguments
    pub fn to_ledger_config(&self) -> LedgerConfig {
        let config = LedgerConfig::default().with_overdraft(self.overdraft.into());
        match self.conflict_retries {
            Some(retries) => config.with_conflict_retries(retries),
            None => config,
        }
    }
}
