//! Receipt-related types for the marketplace ledger
//!
//! A receipt is the unit of a single purchase: a list of product quantities
//! priced at creation time and settled once by confirmation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::account::AccountId;
use super::product::ProductId;

/// Receipt identifier, handed out by the id generator
pub type ReceiptId = u64;

/// Lifecycle of a receipt
///
/// `Opened -> Settling -> Closed`. A settlement that fails and is compensated
/// returns the receipt to `Opened`; `Closed` is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    /// Priced and waiting for confirmation
    #[default]
    Opened,
    /// Confirmation in progress; funds and stock may be partially moved
    Settling,
    /// Funds transferred and stock depleted
    Closed,
}

impl fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReceiptStatus::Opened => "opened",
            ReceiptStatus::Settling => "settling",
            ReceiptStatus::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Request to purchase a quantity of a product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub product_id: ProductId,
    pub quantity: Decimal,
}

impl ReceiptLine {
    pub fn new(product_id: impl Into<ProductId>, quantity: Decimal) -> Self {
        ReceiptLine {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// Parties of a settlement, recorded when the receipt enters `Settling`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub payer: AccountId,
    pub payee: AccountId,
}

/// Receipt as persisted in the receipts collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: ReceiptId,
    pub lines: Vec<ReceiptLine>,

    /// Total computed from product prices at creation time
    pub total_price: Decimal,

    pub status: ReceiptStatus,

    /// Who pays whom; set while settling and kept once closed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement: Option<Settlement>,
}

impl Receipt {
    /// Whether this receipt is (being) settled between exactly these parties
    pub fn settled_between(&self, payer: &str, payee: &str) -> bool {
        self.settlement
            .as_ref()
            .is_some_and(|s| s.payer == payer && s.payee == payee)
    }
}

/// Receipt line joined with the product's current name and price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptLineView {
    pub product_id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Receipt as reported to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptView {
    pub id: ReceiptId,
    pub lines: Vec<ReceiptLineView>,
    pub total_price: Decimal,
    pub status: ReceiptStatus,
}
