//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `account`: Account documents, users and the overdraft policy
//! - `product`: Products, stock lots and lot draws
//! - `receipt`: Receipts, lines and their read models
//! - `command`: Commands routed through the marketplace
//! - `error`: Error types for the marketplace ledger

pub mod account;
pub mod command;
pub mod error;
pub mod product;
pub mod receipt;

pub use account::{Account, AccountId, OverdraftPolicy, User};
pub use command::LedgerCommand;
pub use error::{Entity, LedgerError};
pub use product::{LotDraw, LotId, LotStatus, Product, ProductId, ProductSummary, StockLot};
pub use receipt::{
    Receipt, ReceiptId, ReceiptLine, ReceiptLineView, ReceiptStatus, ReceiptView, Settlement,
};
