//! Account ledger
//!
//! This module provides the `AccountLedger` struct, the only component that
//! mutates account balances.
//!
//! Balances move through signed deltas: a settlement debits the payer with a
//! negative delta and credits the payee with a positive one. Whether a debit
//! may take a balance below zero is decided by the configured
//! [`OverdraftPolicy`].

use super::Change;
use crate::store::{self, DocumentStore};
use crate::types::{Account, Entity, LedgerError, OverdraftPolicy};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Owns all account balances
#[derive(Clone)]
pub struct AccountLedger {
    store: Arc<dyn DocumentStore>,
    overdraft: OverdraftPolicy,
    conflict_retries: u32,
}

impl AccountLedger {
    /// Create an account ledger over `store`
    pub fn new(
        store: Arc<dyn DocumentStore>,
        overdraft: OverdraftPolicy,
        conflict_retries: u32,
    ) -> Self {
        Self {
            store,
            overdraft,
            conflict_retries,
        }
    }

    /// Overdraft policy applied to debits
    pub fn overdraft(&self) -> OverdraftPolicy {
        self.overdraft
    }

    /// Get an account
    ///
    /// # Errors
    ///
    /// `NotFound` if no account is stored under `id`.
    pub fn get_account(&self, id: &str) -> Result<Account, LedgerError> {
        Ok(store::fetch_required(self.store.as_ref(), Entity::Account, id)?.value)
    }

    /// All accounts, sorted by id
    pub fn list_accounts(&self) -> Result<Vec<Account>, LedgerError> {
        store::fetch_all(self.store.as_ref(), Entity::Account)
    }

    /// Create an account holding an opening balance
    ///
    /// Account creation belongs to the caller's onboarding flow; the ledger
    /// only records the result.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the id is taken.
    pub fn open_account(&self, id: &str, balance: Decimal) -> Result<Account, LedgerError> {
        let account = Account::new(id, balance);
        store::insert(self.store.as_ref(), Entity::Account, id, &account)?;
        tracing::debug!(account = id, %balance, "account opened");
        Ok(account)
    }

    /// Add a signed delta to a balance
    ///
    /// # Arguments
    ///
    /// * `id` - Account to change
    /// * `delta` - Amount to add; negative for a debit
    ///
    /// # Returns
    ///
    /// The new balance
    ///
    /// # Errors
    ///
    /// - `NotFound` if the account does not exist
    /// - `InsufficientFunds` if overdrafts are denied and a debit would leave
    ///   a negative balance
    /// - `ArithmeticOverflow` if the balance would overflow
    pub fn apply_delta(&self, id: &str, delta: Decimal) -> Result<Decimal, LedgerError> {
        let policy = self.overdraft;
        self.update(id, |account| {
            apply(account, delta, policy)?;
            Ok(Change::Changed(account.balance))
        })
    }

    /// Apply a delta once per settlement step
    ///
    /// If `key` is already journalled the balance is returned unchanged.
    /// Otherwise the delta and its journal entry are written together.
    pub fn apply_delta_once(
        &self,
        id: &str,
        delta: Decimal,
        key: &str,
    ) -> Result<Decimal, LedgerError> {
        let policy = self.overdraft;
        self.update(id, |account| {
            if account.journal.contains_key(key) {
                tracing::debug!(account = id, key, "delta already applied");
                return Ok(Change::Unchanged(account.balance));
            }
            apply(account, delta, policy)?;
            account.journal.insert(key.to_string(), delta);
            Ok(Change::Changed(account.balance))
        })
    }

    /// Undo the delta journalled under `key`
    ///
    /// Compensation always goes through, whatever the overdraft policy: a
    /// reverted credit may leave the payee below zero if they spent it.
    ///
    /// # Returns
    ///
    /// `true` if a delta was reverted, `false` if nothing was journalled
    /// under `key`
    pub fn revert(&self, id: &str, key: &str) -> Result<bool, LedgerError> {
        self.update(id, |account| match account.journal.remove(key) {
            Some(delta) => {
                apply(account, -delta, OverdraftPolicy::Allow)?;
                Ok(Change::Changed(true))
            }
            None => Ok(Change::Unchanged(false)),
        })
    }

    /// Drop the journal entry of a settlement step that has completed
    ///
    /// The delta stays applied; only the record of it goes.
    ///
    /// # Returns
    ///
    /// `true` if an entry was removed
    pub fn forget(&self, id: &str, key: &str) -> Result<bool, LedgerError> {
        self.update(id, |account| match account.journal.remove(key) {
            Some(_) => Ok(Change::Changed(true)),
            None => Ok(Change::Unchanged(false)),
        })
    }

    /// Check that `id` could be debited `amount` right now
    ///
    /// Always succeeds for existing accounts when overdrafts are allowed.
    pub fn check_funds(&self, id: &str, amount: Decimal) -> Result<(), LedgerError> {
        let account = self.get_account(id)?;
        if self.overdraft == OverdraftPolicy::Deny && account.balance < amount {
            return Err(LedgerError::insufficient_funds(id, account.balance, amount));
        }
        Ok(())
    }

    fn update<R, F>(&self, id: &str, mut change: F) -> Result<R, LedgerError>
    where
        F: FnMut(&mut Account) -> Result<Change<R>, LedgerError>,
    {
        let store = self.store.as_ref();
        store::retry_on_conflict(Entity::Account, id, self.conflict_retries, || {
            let current = store::fetch_required::<Account>(store, Entity::Account, id)?;
            let mut account = current.value;
            match change(&mut account)? {
                Change::Changed(result) => {
                    store::replace(store, Entity::Account, id, current.version, &account)?;
                    Ok(result)
                }
                Change::Unchanged(result) => Ok(result),
            }
        })
    }
}

fn apply(account: &mut Account, delta: Decimal, policy: OverdraftPolicy) -> Result<(), LedgerError> {
    let balance = account
        .balance
        .checked_add(delta)
        .ok_or_else(|| LedgerError::arithmetic_overflow("balance update", &account.id))?;

    if policy == OverdraftPolicy::Deny && delta < Decimal::ZERO && balance < Decimal::ZERO {
        return Err(LedgerError::insufficient_funds(
            &account.id,
            account.balance,
            -delta,
        ));
    }

    account.balance = balance;
    Ok(())
}
