//! Error types for the marketplace ledger
//!
//! This module defines all error types that can occur while restocking,
//! creating receipts and settling them.
//!
//! # Error Categories
//!
//! - **Lookup Errors**: referenced account, product, receipt or user is absent
//! - **Validation Errors**: negative quantities or prices, empty receipts
//! - **Settlement Errors**: insufficient stock or funds, receipt in the wrong state
//! - **Store Errors**: the backing store is unavailable, a conditional write lost a race,
//!   or a stored document could not be decoded
//! - **Arithmetic Errors**: overflow in balance, price or quantity calculations

use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

use super::receipt::{ReceiptId, ReceiptStatus};

/// Kind of entity an error refers to
///
/// Each entity kind is persisted in its own logical collection of the
/// document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Entity {
    Account,
    Product,
    Receipt,
    Counter,
    User,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Account => "account",
            Entity::Product => "product",
            Entity::Receipt => "receipt",
            Entity::Counter => "counter",
            Entity::User => "user",
        };
        f.write_str(name)
    }
}

/// Main error type for the marketplace ledger
///
/// Every component returns this type, so errors raised deep in the inventory
/// or account ledgers reach the caller of the receipt engine unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// Referenced entity does not exist
    #[error("{entity} '{id}' not found")]
    NotFound {
        /// Kind of the missing entity
        entity: Entity,
        /// Identifier that was looked up
        id: String,
    },

    /// Entity with the same identifier already exists
    #[error("{entity} '{id}' already exists")]
    AlreadyExists {
        /// Kind of the entity
        entity: Entity,
        /// Identifier that is taken
        id: String,
    },

    /// Requested depletion exceeds the quantity available across all lots
    ///
    /// Raised before any lot is touched, so the product is left unchanged.
    #[error("Insufficient stock for product '{product}': available {available}, requested {requested}")]
    InsufficientStock {
        /// Product identifier
        product: String,
        /// Quantity available across all lots
        available: Decimal,
        /// Quantity requested
        requested: Decimal,
    },

    /// Debit would take the balance below zero while overdrafts are denied
    #[error("Insufficient funds in account '{account}': balance {balance}, requested {requested}")]
    InsufficientFunds {
        /// Account identifier
        account: String,
        /// Current balance
        balance: Decimal,
        /// Amount requested
        requested: Decimal,
    },

    /// Backing store I/O failure, including timeouts
    #[error("Store unavailable: {message}")]
    StoreUnavailable {
        /// Description of the failure
        message: String,
    },

    /// Receipt cannot be confirmed from its current state
    #[error("Receipt {receipt} is {status} and cannot be confirmed: {reason}")]
    InvalidState {
        /// Receipt identifier
        receipt: ReceiptId,
        /// Status the receipt was found in
        status: ReceiptStatus,
        /// Why the transition was refused
        reason: String,
    },

    /// Quantity is negative (or zero where a positive quantity is required)
    #[error("Invalid quantity {quantity} for {context}")]
    InvalidQuantity {
        /// Offending quantity
        quantity: Decimal,
        /// Where the quantity was supplied
        context: String,
    },

    /// Price is negative
    #[error("Invalid price {price} for product '{product}'")]
    InvalidPrice {
        /// Product identifier
        product: String,
        /// Offending price
        price: Decimal,
    },

    /// Receipt request is malformed
    #[error("Invalid receipt: {reason}")]
    InvalidReceipt {
        /// Description of the problem
        reason: String,
    },

    /// Conditional write lost a race against a concurrent writer
    ///
    /// Components retry on this error; callers only see it if they use the
    /// store directly.
    #[error("Version conflict on {entity} '{id}'")]
    VersionConflict {
        /// Kind of the contended entity
        entity: Entity,
        /// Identifier of the contended entity
        id: String,
    },

    /// Conditional write kept losing races until the retry budget ran out
    #[error("Gave up on {entity} '{id}' after {attempts} conflicting attempts")]
    Contention {
        /// Kind of the contended entity
        entity: Entity,
        /// Identifier of the contended entity
        id: String,
        /// Number of attempts made
        attempts: u32,
    },

    /// Stored document could not be encoded or decoded
    #[error("Corrupt {entity} document '{id}': {message}")]
    CorruptDocument {
        /// Kind of the entity
        entity: Entity,
        /// Identifier of the document
        id: String,
        /// Serialization error
        message: String,
    },

    /// Arithmetic overflow would occur
    #[error("Arithmetic overflow in {operation} for {target}")]
    ArithmeticOverflow {
        /// Operation that would overflow
        operation: String,
        /// Entity the operation applied to
        target: String,
    },
}

// Helper functions for creating common errors

impl LedgerError {
    /// Create a NotFound error
    pub fn not_found(entity: Entity, id: impl ToString) -> Self {
        LedgerError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create an AlreadyExists error
    pub fn already_exists(entity: Entity, id: impl ToString) -> Self {
        LedgerError::AlreadyExists {
            entity,
            id: id.to_string(),
        }
    }

    /// Create an InsufficientStock error
    pub fn insufficient_stock(product: &str, available: Decimal, requested: Decimal) -> Self {
        LedgerError::InsufficientStock {
            product: product.to_string(),
            available,
            requested,
        }
    }

    /// Create an InsufficientFunds error
    pub fn insufficient_funds(account: &str, balance: Decimal, requested: Decimal) -> Self {
        LedgerError::InsufficientFunds {
            account: account.to_string(),
            balance,
            requested,
        }
    }

    /// Create a StoreUnavailable error
    pub fn store_unavailable(message: impl ToString) -> Self {
        LedgerError::StoreUnavailable {
            message: message.to_string(),
        }
    }

    /// Create an InvalidState error
    pub fn invalid_state(receipt: ReceiptId, status: ReceiptStatus, reason: &str) -> Self {
        LedgerError::InvalidState {
            receipt,
            status,
            reason: reason.to_string(),
        }
    }

    /// Create an InvalidQuantity error
    pub fn invalid_quantity(quantity: Decimal, context: &str) -> Self {
        LedgerError::InvalidQuantity {
            quantity,
            context: context.to_string(),
        }
    }

    /// Create an InvalidPrice error
    pub fn invalid_price(product: &str, price: Decimal) -> Self {
        LedgerError::InvalidPrice {
            product: product.to_string(),
            price,
        }
    }

    /// Create an InvalidReceipt error
    pub fn invalid_receipt(reason: &str) -> Self {
        LedgerError::InvalidReceipt {
            reason: reason.to_string(),
        }
    }

    /// Create a VersionConflict error
    pub fn version_conflict(entity: Entity, id: impl ToString) -> Self {
        LedgerError::VersionConflict {
            entity,
            id: id.to_string(),
        }
    }

    /// Create a Contention error
    pub fn contention(entity: Entity, id: impl ToString, attempts: u32) -> Self {
        LedgerError::Contention {
            entity,
            id: id.to_string(),
            attempts,
        }
    }

    /// Create a CorruptDocument error
    pub fn corrupt(entity: Entity, id: impl ToString, error: serde_json::Error) -> Self {
        LedgerError::CorruptDocument {
            entity,
            id: id.to_string(),
            message: error.to_string(),
        }
    }

    /// Create an ArithmeticOverflow error
    pub fn arithmetic_overflow(operation: &str, target: impl ToString) -> Self {
        LedgerError::ArithmeticOverflow {
            operation: operation.to_string(),
            target: target.to_string(),
        }
    }

    /// Whether the error is a lost conditional-write race worth retrying
    ///
    /// An insert that collides with a concurrent insert of the same key is
    /// treated like a version conflict: the next attempt re-reads the winner.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            LedgerError::VersionConflict { .. } | LedgerError::AlreadyExists { .. }
        )
    }
}
