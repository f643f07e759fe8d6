//! Receipt engine
//!
//! This module provides the `ReceiptEngine` struct, which owns the receipt
//! lifecycle: pricing and opening receipts, and settling them on
//! confirmation.
//!
//! # Settlement
//!
//! Confirming a receipt touches several documents (two accounts and one
//! product per line) that cannot be written atomically together. Settlement
//! therefore runs as a saga with the receipt status as its durable pivot:
//!
//! 1. `Opened -> Settling`, recording payer and payee, before anything moves
//! 2. debit payer, credit payee, deplete each line; every step is journalled
//!    under a key derived from the receipt id, so replaying it is a no-op
//! 3. `Settling -> Closed`
//!
//! If a step fails, the steps already applied are reversed and the receipt
//! goes back to `Opened`. If the reversal itself fails, the receipt stays
//! `Settling` and confirming it again with the same parties finishes the
//! settlement without applying any step twice.
//!
//! # Thread Safety
//!
//! Confirmations of one receipt are serialized by a per-receipt mutex, held
//! in a lock table only while some confirmation of that receipt is running.
//! Across processes sharing a store, the conditional `Opened -> Settling`
//! write and the step journals keep settlement exactly-once. Journal entries
//! are dropped once the receipt is closed.

use super::account_ledger::AccountLedger;
use super::directory::UserDirectory;
use super::id_generator::IdGenerator;
use super::inventory::InventoryLedger;
use crate::store::{self, DocumentStore, Versioned};
use crate::types::{
    Entity, LedgerError, Receipt, ReceiptId, ReceiptLine, ReceiptLineView, ReceiptStatus,
    ReceiptView, Settlement,
};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Outcome of a successful confirmation
#[derive(Debug, Clone, PartialEq)]
pub enum Settled {
    /// This call settled the receipt
    Closed(Receipt),
    /// The receipt had already been settled between the same parties
    AlreadyClosed(Receipt),
}

impl Settled {
    pub fn receipt(&self) -> &Receipt {
        match self {
            Settled::Closed(receipt) | Settled::AlreadyClosed(receipt) => receipt,
        }
    }
}

/// Journal key of one settlement step
fn step_key(receipt: ReceiptId, step: &str) -> String {
    format!("receipt:{receipt}:{step}")
}

fn line_key(receipt: ReceiptId, line: usize) -> String {
    format!("receipt:{receipt}:line:{line}")
}

/// Where a confirmation starts from after the receipt has been read
enum Start {
    /// Nothing to do
    Done(Receipt),
    /// Receipt is `Settling` between the requested parties
    Settle(Versioned<Receipt>),
}

/// Owns receipts and drives their settlement
pub struct ReceiptEngine {
    store: Arc<dyn DocumentStore>,
    ids: IdGenerator,
    inventory: InventoryLedger,
    accounts: AccountLedger,
    directory: UserDirectory,
    conflict_retries: u32,

    /// One mutex per receipt that has been confirmed in this process
    locks: DashMap<ReceiptId, Arc<Mutex<()>>>,
}

impl ReceiptEngine {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        ids: IdGenerator,
        inventory: InventoryLedger,
        accounts: AccountLedger,
        directory: UserDirectory,
        conflict_retries: u32,
    ) -> Self {
        Self {
            store,
            ids,
            inventory,
            accounts,
            directory,
            conflict_retries,
            locks: DashMap::new(),
        }
    }

    /// Price `lines` and persist them as an open receipt
    ///
    /// Prices are looked up once, at creation; later repricing does not
    /// change the receipt's total. The id is taken only after every line has
    /// been priced, so rejected requests do not consume ids.
    ///
    /// # Errors
    ///
    /// - `InvalidReceipt` if `lines` is empty
    /// - `InvalidQuantity` if a line's quantity is not positive
    /// - `NotFound` if a line names an unknown product
    /// - `ArithmeticOverflow` if the total would overflow
    /// - `StoreUnavailable` / `Contention` from the store or id generator
    pub fn create(&self, lines: Vec<ReceiptLine>) -> Result<Receipt, LedgerError> {
        if lines.is_empty() {
            return Err(LedgerError::invalid_receipt("receipt has no lines"));
        }

        let mut total_price = Decimal::ZERO;
        for line in &lines {
            if line.quantity <= Decimal::ZERO {
                return Err(LedgerError::invalid_quantity(
                    line.quantity,
                    &format!("receipt line '{}'", line.product_id),
                ));
            }

            let price = self.inventory.price_of(&line.product_id)?;
            total_price = price
                .checked_mul(line.quantity)
                .and_then(|subtotal| total_price.checked_add(subtotal))
                .ok_or_else(|| LedgerError::arithmetic_overflow("receipt total", &line.product_id))?;
        }

        let id = self.ids.next()?;
        let receipt = Receipt {
            id,
            lines,
            total_price,
            status: ReceiptStatus::Opened,
            settlement: None,
        };
        store::insert(self.store.as_ref(), Entity::Receipt, &id.to_string(), &receipt)?;

        tracing::info!(receipt = id, total = %total_price, lines = receipt.lines.len(), "receipt opened");
        Ok(receipt)
    }

    /// Get a receipt
    pub fn get(&self, id: ReceiptId) -> Result<Receipt, LedgerError> {
        Ok(store::fetch_required(self.store.as_ref(), Entity::Receipt, &id.to_string())?.value)
    }

    /// Get a receipt joined with the current name and price of each product
    ///
    /// The total stays the one computed at creation.
    pub fn view(&self, id: ReceiptId) -> Result<ReceiptView, LedgerError> {
        let receipt = self.get(id)?;

        let lines = receipt
            .lines
            .iter()
            .map(|line| {
                let product = self.inventory.summary(&line.product_id)?;
                Ok(ReceiptLineView {
                    product_id: product.id,
                    name: product.name,
                    price: product.price,
                    quantity: line.quantity,
                })
            })
            .collect::<Result<Vec<_>, LedgerError>>()?;

        Ok(ReceiptView {
            id: receipt.id,
            lines,
            total_price: receipt.total_price,
            status: receipt.status,
        })
    }

    /// All receipts, sorted by id
    pub fn list(&self) -> Result<Vec<Receipt>, LedgerError> {
        let mut receipts: Vec<Receipt> = store::fetch_all(self.store.as_ref(), Entity::Receipt)?;
        receipts.sort_by_key(|receipt| receipt.id);
        Ok(receipts)
    }

    /// Settle a receipt: debit `payer`, credit `payee`, deplete every line
    ///
    /// # Arguments
    ///
    /// * `id` - Receipt to settle
    /// * `payer` - Account debited with the receipt total
    /// * `payee` - Account credited with the receipt total
    ///
    /// # Returns
    ///
    /// * `Settled::Closed` - this call settled the receipt
    /// * `Settled::AlreadyClosed` - the receipt was already settled between
    ///   the same parties; nothing moved
    ///
    /// # Errors
    ///
    /// - `NotFound` if either account or the receipt does not exist
    /// - `InvalidState` if the receipt is settled or being settled between
    ///   other parties
    /// - `InsufficientStock` if a line cannot be covered
    /// - `InsufficientFunds` if overdrafts are denied and the payer cannot pay
    /// - `StoreUnavailable` / `Contention` from the store
    ///
    /// A failure after the receipt entered `Settling` is compensated before
    /// the error is returned.
    pub fn confirm(&self, id: ReceiptId, payer: &str, payee: &str) -> Result<Settled, LedgerError> {
        let lock = self.lock_for(id);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.settle(id, payer, payee)
        };

        // The last confirmation out drops the mutex; a waiter still holds a clone
        drop(lock);
        self.locks.remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    /// Body of [`Self::confirm`], run under the receipt's lock
    fn settle(&self, id: ReceiptId, payer: &str, payee: &str) -> Result<Settled, LedgerError> {
        self.accounts.get_account(payer)?;
        self.accounts.get_account(payee)?;

        let key = id.to_string();
        let start = store::retry_on_conflict(Entity::Receipt, &key, self.conflict_retries, || {
            self.begin(id, payer, payee)
        })?;

        let receipt = match start {
            Start::Done(receipt) => {
                tracing::debug!(receipt = id, "receipt already closed");
                self.forget_steps(&receipt, payer, payee);
                return Ok(Settled::AlreadyClosed(receipt));
            }
            Start::Settle(receipt) => receipt.value,
        };

        if let Err(error) = self.apply_steps(&receipt, payer, payee) {
            tracing::warn!(receipt = id, %error, "settlement failed, compensating");
            return Err(self.abort(&receipt, payer, payee, error));
        }

        let closed = self.finish(id, payer, payee)?;
        self.forget_steps(&closed, payer, payee);
        tracing::info!(receipt = id, payer, payee, total = %closed.total_price, "receipt settled");
        Ok(Settled::Closed(closed))
    }

    /// Settle a receipt between two registered users
    ///
    /// # Errors
    ///
    /// `NotFound` if either username is unknown, then as [`Self::confirm`].
    pub fn confirm_between_users(
        &self,
        id: ReceiptId,
        from_user: &str,
        to_user: &str,
    ) -> Result<Settled, LedgerError> {
        let payer = self.directory.account_of(from_user)?;
        let payee = self.directory.account_of(to_user)?;
        self.confirm(id, &payer, &payee)
    }

    fn lock_for(&self, id: ReceiptId) -> Arc<Mutex<()>> {
        self.locks.entry(id).or_default().clone()
    }

    /// Read the receipt and move it to `Settling` if it is `Opened`
    fn begin(&self, id: ReceiptId, payer: &str, payee: &str) -> Result<Start, LedgerError> {
        let key = id.to_string();
        let current =
            store::fetch_required::<Receipt>(self.store.as_ref(), Entity::Receipt, &key)?;
        let status = current.value.status;
        let same_parties = current.value.settled_between(payer, payee);

        match status {
            ReceiptStatus::Closed if same_parties => Ok(Start::Done(current.value)),
            ReceiptStatus::Closed => Err(LedgerError::invalid_state(
                id,
                status,
                "already settled between other accounts",
            )),
            ReceiptStatus::Settling if same_parties => {
                tracing::info!(receipt = id, "resuming interrupted settlement");
                Ok(Start::Settle(current))
            }
            ReceiptStatus::Settling => Err(LedgerError::invalid_state(
                id,
                status,
                "being settled between other accounts",
            )),
            ReceiptStatus::Opened => {
                self.precheck(&current.value, payer)?;

                let mut settling = current.value;
                settling.status = ReceiptStatus::Settling;
                settling.settlement = Some(Settlement {
                    payer: payer.to_string(),
                    payee: payee.to_string(),
                });
                let version = store::replace(
                    self.store.as_ref(),
                    Entity::Receipt,
                    &key,
                    current.version,
                    &settling,
                )?;
                Ok(Start::Settle(Versioned {
                    version,
                    value: settling,
                }))
            }
        }
    }

    /// Reject settlements that are bound to fail before anything moves
    fn precheck(&self, receipt: &Receipt, payer: &str) -> Result<(), LedgerError> {
        let mut needed: BTreeMap<&str, Decimal> = BTreeMap::new();
        for line in &receipt.lines {
            let quantity = needed.entry(line.product_id.as_str()).or_default();
            *quantity = quantity
                .checked_add(line.quantity)
                .ok_or_else(|| LedgerError::arithmetic_overflow("stock check", &line.product_id))?;
        }

        for (product, quantity) in needed {
            let available = self.inventory.available(product)?;
            if available < quantity {
                return Err(LedgerError::insufficient_stock(product, available, quantity));
            }
        }

        self.accounts.check_funds(payer, receipt.total_price)
    }

    fn apply_steps(&self, receipt: &Receipt, payer: &str, payee: &str) -> Result<(), LedgerError> {
        let id = receipt.id;
        let total = receipt.total_price;

        self.accounts
            .apply_delta_once(payer, -total, &step_key(id, "debit"))?;
        self.accounts
            .apply_delta_once(payee, total, &step_key(id, "credit"))?;

        for (index, line) in receipt.lines.iter().enumerate() {
            let draws =
                self.inventory
                    .deplete_once(&line.product_id, line.quantity, &line_key(id, index))?;
            tracing::debug!(receipt = id, product = %line.product_id, lots = draws.len(), "line depleted");
        }
        Ok(())
    }

    /// Reverse every applied step and reopen the receipt
    ///
    /// Returns the error that made the settlement fail. If reversing fails
    /// the receipt is left `Settling` so that a later confirmation can finish
    /// it.
    fn abort(
        &self,
        receipt: &Receipt,
        payer: &str,
        payee: &str,
        error: LedgerError,
    ) -> LedgerError {
        let id = receipt.id;
        if let Err(compensation) = self.compensate(receipt, payer, payee) {
            tracing::error!(
                receipt = id,
                %compensation,
                "compensation failed, receipt left settling"
            );
            return error;
        }

        if let Err(reopen) = self.reopen(id, payer, payee) {
            tracing::error!(receipt = id, %reopen, "could not reopen compensated receipt");
        }
        error
    }

    fn compensate(&self, receipt: &Receipt, payer: &str, payee: &str) -> Result<(), LedgerError> {
        let id = receipt.id;
        for (index, line) in receipt.lines.iter().enumerate().rev() {
            self.inventory
                .restore(&line.product_id, &line_key(id, index))?;
        }
        self.accounts.revert(payee, &step_key(id, "credit"))?;
        self.accounts.revert(payer, &step_key(id, "debit"))?;
        Ok(())
    }

    /// Drop the step journal entries of a closed receipt
    ///
    /// A closed receipt never replays its steps, so the entries are dead
    /// weight on every later write of those documents. Failures are only
    /// logged: the settlement stands, and the next confirmation of the same
    /// receipt retries the cleanup.
    fn forget_steps(&self, receipt: &Receipt, payer: &str, payee: &str) {
        let id = receipt.id;
        let accounts = [(payer, step_key(id, "debit")), (payee, step_key(id, "credit"))];
        for (account, key) in &accounts {
            if let Err(error) = self.accounts.forget(account, key) {
                tracing::warn!(receipt = id, account = *account, %error, "could not prune settlement journal");
            }
        }
        for (index, line) in receipt.lines.iter().enumerate() {
            if let Err(error) = self.inventory.forget(&line.product_id, &line_key(id, index)) {
                tracing::warn!(receipt = id, product = %line.product_id, %error, "could not prune settlement journal");
            }
        }
    }

    /// `Settling -> Opened`, dropping the recorded parties
    fn reopen(&self, id: ReceiptId, payer: &str, payee: &str) -> Result<Receipt, LedgerError> {
        self.transition(id, payer, payee, |receipt| {
            receipt.status = ReceiptStatus::Opened;
            receipt.settlement = None;
        })
    }

    /// `Settling -> Closed`
    fn finish(&self, id: ReceiptId, payer: &str, payee: &str) -> Result<Receipt, LedgerError> {
        self.transition(id, payer, payee, |receipt| {
            receipt.status = ReceiptStatus::Closed;
        })
    }

    /// Conditional write out of `Settling` between `payer` and `payee`
    fn transition<F>(
        &self,
        id: ReceiptId,
        payer: &str,
        payee: &str,
        change: F,
    ) -> Result<Receipt, LedgerError>
    where
        F: Fn(&mut Receipt),
    {
        let store = self.store.as_ref();
        let key = id.to_string();
        store::retry_on_conflict(Entity::Receipt, &key, self.conflict_retries, || {
            let current = store::fetch_required::<Receipt>(store, Entity::Receipt, &key)?;
            let mut receipt = current.value;
            if receipt.status != ReceiptStatus::Settling || !receipt.settled_between(payer, payee) {
                return Err(LedgerError::invalid_state(
                    id,
                    receipt.status,
                    "settlement was taken over by another confirmation",
                ));
            }
            change(&mut receipt);
            store::replace(store, Entity::Receipt, &key, current.version, &receipt)?;
            Ok(receipt)
        })
    }
}
