//! Account-related types for the marketplace ledger
//!
//! This module defines the Account document and the overdraft policy that
//! governs how far a balance may fall.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Account identifier
pub type AccountId = String;

/// Account state as persisted in the accounts collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// The account identifier
    pub id: AccountId,

    /// Current balance
    ///
    /// Starts at the opening balance and moves only through settlement
    /// deltas applied by the account ledger.
    pub balance: Decimal,

    /// Deltas applied under settlement step keys
    ///
    /// A key present here has already been applied to `balance`; applying it
    /// again is a no-op. Compensation removes the key along with its delta.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub journal: BTreeMap<String, Decimal>,
}

impl Account {
    /// Create a new account holding the given opening balance
    pub fn new(id: impl Into<AccountId>, balance: Decimal) -> Self {
        Account {
            id: id.into(),
            balance,
            journal: BTreeMap::new(),
        }
    }
}

/// Whether a debit may take a balance below zero
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverdraftPolicy {
    /// Balances may go negative
    #[default]
    Allow,
    /// Debits that would leave a negative balance are rejected
    Deny,
}

/// Directory entry mapping a marketplace username to its account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub account: AccountId,
}
