//! Marketplace Ledger Library
//! # Overview
//!
//! This library keeps the books of a small marketplace: product inventory
//! held as FIFO stock lots, account balances, and receipts that move money
//! from a payer to a payee while depleting the purchased stock. Commands can
//! be replayed from a CSV journal with a sync or an async strategy.
//!
//! # Architecture
//!
//! - [`types`] - Core data types (Account, Product, Receipt, LedgerCommand, etc.)
//! - [`store`] - Versioned document store the ledgers persist into
//! - [`config`] - Ledger settings (overdraft policy, retry budget)
//! - [`core`] - Business logic components:
//!   - [`core::id_generator`] - Strictly increasing receipt ids
//!   - [`core::inventory`] - Stock lots and FIFO depletion
//!   - [`core::account_ledger`] - Balances and the overdraft policy
//!   - [`core::receipt_engine`] - Receipt pricing and settlement
//!   - [`core::marketplace`] - Facade over all of the above
//! - [`io`] - CSV command journals and reports
//! - [`strategy`] - Pluggable replay strategies
//! - [`cli`] - CLI arguments parsing
//! - [`telemetry`] - Tracing subscriber setup
//!
//! # Receipt Lifecycle
//!
//! - **Opened**: priced from current list prices, nothing moved yet
//! - **Settling**: confirmation in progress; money and stock are moving
//! - **Closed**: payer debited, payee credited, every line depleted
//!
//! A confirmation that fails part way is compensated and the receipt goes
//! back to Opened. Confirming a Closed receipt again with the same parties
//! changes nothing.

// Module declarations
pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod store;
pub mod strategy;
pub mod telemetry;
pub mod types;

pub use config::LedgerConfig;
pub use core::{CommandOutcome, LedgerSnapshot, Marketplace, Settled};
pub use io::{write_accounts_csv, write_inventory_csv};
pub use types::{
    Account, AccountId, LedgerCommand, LedgerError, OverdraftPolicy, Product, ProductId, Receipt,
    ReceiptId, ReceiptLine, ReceiptStatus, StockLot,
};
