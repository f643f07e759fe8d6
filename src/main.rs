//! Marketplace Ledger CLI
//!
//! Command-line interface for replaying marketplace command journals.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- commands.csv > accounts.csv
//! cargo run -- --strategy sync commands.csv > accounts.csv
//! cargo run -- --strategy async --batch-size 2000 --max-concurrent 8 commands.csv > accounts.csv
//! cargo run -- --overdraft deny --inventory-out inventory.csv commands.csv > accounts.csv
//! ```
//!
//! The program replays the commands from the input CSV file and writes the
//! final account balances to stdout. Diagnostics go to stderr through
//! `tracing`; set `RUST_LOG` to change verbosity.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (missing arguments, file not found, file not readable, etc.)

use marketplace_ledger::io::write_inventory_csv;
use marketplace_ledger::{cli, strategy, telemetry};
use std::fs::File;
use std::io::BufWriter;
use std::process;

fn main() {
    telemetry::init();

    let args = cli::parse_args();

    let strategy = {
        let config = if matches!(args.strategy, cli::StrategyType::Async) {
            Some(args.to_batch_config())
        } else {
            None
        };
        strategy::create_strategy(args.strategy.clone(), args.to_ledger_config(), config)
    };

    let mut output = std::io::stdout();
    let snapshot = match strategy.process(&args.input_file, &mut output) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::error!(error = %e, "processing failed");
            process::exit(1);
        }
    };

    if let Some(path) = &args.inventory_out {
        let result = File::create(path)
            .map_err(|e| format!("Failed to create '{}': {}", path.display(), e))
            .and_then(|file| write_inventory_csv(&snapshot.products, &mut BufWriter::new(file)));
        if let Err(e) = result {
            tracing::error!(error = %e, "inventory report failed");
            process::exit(1);
        }
    }
}
