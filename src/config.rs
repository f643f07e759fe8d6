//! Ledger configuration.

use crate::types::OverdraftPolicy;
use serde::Deserialize;

/// Settings shared by all ledger components.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LedgerConfig {
    /// Whether settlement may take a payer's balance below zero.
    #[serde(default)]
    pub overdraft: OverdraftPolicy,
    /// Attempts per optimistic update before giving up with `Contention`.
    #[serde(default = "default_conflict_retries")]
    pub conflict_retries: u32,
    /// Id handed out by a fresh receipt counter.
    #[serde(default = "default_first_receipt_id")]
    pub first_receipt_id: u64,
}

fn default_conflict_retries() -> u32 {
    16
}

fn default_first_receipt_id() -> u64 {
    1
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            overdraft: OverdraftPolicy::default(),
            conflict_retries: default_conflict_retries(),
            first_receipt_id: default_first_receipt_id(),
        }
    }
}

impl LedgerConfig {
    /// Override the overdraft policy.
    pub fn with_overdraft(mut self, overdraft: OverdraftPolicy) -> Self {
        self.overdraft = overdraft;
        self
    }

    /// Override the conflict retry budget; zero keeps the default.
    pub fn with_conflict_retries(mut self, conflict_retries: u32) -> Self {
        if conflict_retries == 0 {
            tracing::warn!(
                default = default_conflict_retries(),
                "invalid conflict_retries (0), using default"
            );
        } else {
            self.conflict_retries = conflict_retries;
        }
        self
    }
}
