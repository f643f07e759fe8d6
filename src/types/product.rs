//! Product and stock lot types for the marketplace ledger
//!
//! A product is sold out of an ordered sequence of stock lots, one lot per
//! restock batch. Lots are depleted oldest first.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Product identifier
pub type ProductId = String;

/// Stock lot identifier
pub type LotId = String;

/// Availability of a single stock lot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LotStatus {
    /// Some quantity is still available
    #[default]
    Available,
    /// Nothing left in the lot
    Sold,
}

/// One restock batch of a product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockLot {
    pub id: LotId,
    pub name: String,
    pub price: Decimal,
    pub total_available: Decimal,
    pub total_sold: Decimal,
    pub status: LotStatus,
}

impl StockLot {
    /// Create a fresh lot with `quantity` available and nothing sold
    pub fn new(
        id: impl Into<LotId>,
        name: impl Into<String>,
        price: Decimal,
        quantity: Decimal,
    ) -> Self {
        let mut lot = StockLot {
            id: id.into(),
            name: name.into(),
            price,
            total_available: quantity,
            total_sold: Decimal::ZERO,
            status: LotStatus::Available,
        };
        lot.refresh_status();
        lot
    }

    /// Re-derive `status` from `total_available`
    ///
    /// A lot is `Sold` exactly when nothing is available in it.
    pub fn refresh_status(&mut self) {
        self.status = if self.total_available.is_zero() {
            LotStatus::Sold
        } else {
            LotStatus::Available
        };
    }
}

/// Quantity taken from one lot by a single depletion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotDraw {
    /// Position of the lot in the product's lot sequence
    pub lot: usize,
    /// Quantity moved from available to sold
    pub quantity: Decimal,
}

/// Product state as persisted in the products collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,

    /// Current list price used when receipts are created
    pub price: Decimal,

    /// Sum of `total_available` over all lots
    pub total_available: Decimal,

    /// Sum of `total_sold` over all lots
    pub total_sold: Decimal,

    /// Lots in restock order (oldest first)
    pub stocks: Vec<StockLot>,

    /// Lot draws applied under settlement step keys
    ///
    /// Used to make settlement depletion idempotent and to reverse it.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub journal: BTreeMap<String, Vec<LotDraw>>,
}

impl Product {
    /// Create a product with no lots, taking its identity from `lot`
    pub fn from_lot(id: impl Into<ProductId>, lot: &StockLot) -> Self {
        Product {
            id: id.into(),
            name: lot.name.clone(),
            price: lot.price,
            total_available: Decimal::ZERO,
            total_sold: Decimal::ZERO,
            stocks: Vec::new(),
            journal: BTreeMap::new(),
        }
    }

    /// Read model without the lot sequence
    pub fn summary(&self) -> ProductSummary {
        ProductSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            price: self.price,
            total_available: self.total_available,
            total_sold: self.total_sold,
        }
    }
}

/// Product as reported to callers, without its lots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub total_available: Decimal,
    pub total_sold: Decimal,
}
