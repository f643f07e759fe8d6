//! Ledger commands
//!
//! A command is one request against the marketplace, as read from a command
//! journal or issued by a caller. Commands are routed by
//! [`crate::core::Marketplace::process`].

use rust_decimal::Decimal;

use super::account::AccountId;
use super::product::{ProductId, StockLot};
use super::receipt::{ReceiptId, ReceiptLine};

/// Command types supported by the marketplace
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerCommand {
    /// Create an account holding an opening balance
    OpenAccount { account: AccountId, balance: Decimal },

    /// Bind a username to an account
    RegisterUser { username: String, account: AccountId },

    /// Append a stock lot to a product, creating the product if needed
    Restock { product: ProductId, lot: StockLot },

    /// Change a product's list price
    Reprice { product: ProductId, price: Decimal },

    /// Price a list of lines and open a receipt for them
    CreateReceipt { lines: Vec<ReceiptLine> },

    /// Settle an open receipt from `payer` to `payee`
    ConfirmReceipt {
        receipt: ReceiptId,
        payer: AccountId,
        payee: AccountId,
    },
}

impl LedgerCommand {
    /// Short command name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerCommand::OpenAccount { .. } => "open",
            LedgerCommand::RegisterUser { .. } => "user",
            LedgerCommand::Restock { .. } => "restock",
            LedgerCommand::Reprice { .. } => "reprice",
            LedgerCommand::CreateReceipt { .. } => "receipt",
            LedgerCommand::ConfirmReceipt { .. } => "confirm",
        }
    }
}
