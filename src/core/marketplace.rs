//! Marketplace facade
//!
//! This module provides the `Marketplace` struct, which wires the ledgers and
//! the receipt engine to one document store and routes ledger commands to
//! them.

use super::account_ledger::AccountLedger;
use super::directory::UserDirectory;
use super::id_generator::IdGenerator;
use super::inventory::InventoryLedger;
use super::receipt_engine::{ReceiptEngine, Settled};
use crate::config::LedgerConfig;
use crate::store::{DocumentStore, MemoryStore};
use crate::types::{
    Account, LedgerCommand, LedgerError, Product, ProductSummary, Receipt, ReceiptId, ReceiptLine,
    ReceiptView, StockLot, User,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

/// Result of a processed command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    AccountOpened(Account),
    UserRegistered(User),
    Restocked(Product),
    Repriced(Product),
    ReceiptCreated(Receipt),
    Settled(Settled),
}

/// Full ledger state, every collection sorted by id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerSnapshot {
    pub accounts: Vec<Account>,
    pub products: Vec<Product>,
    pub receipts: Vec<Receipt>,
}

/// Caller-facing entry point of the ledger
///
/// Safe to share between threads; every operation takes `&self`.
pub struct Marketplace {
    config: LedgerConfig,
    inventory: InventoryLedger,
    accounts: AccountLedger,
    directory: UserDirectory,
    receipts: ReceiptEngine,
}

impl Marketplace {
    /// Build a marketplace over `store`
    pub fn new(store: Arc<dyn DocumentStore>, config: LedgerConfig) -> Self {
        let retries = config.conflict_retries;
        let inventory = InventoryLedger::new(store.clone(), retries);
        let accounts = AccountLedger::new(store.clone(), config.overdraft, retries);
        let directory = UserDirectory::new(store.clone());
        let ids = IdGenerator::new(store.clone(), config.first_receipt_id, retries);
        let receipts = ReceiptEngine::new(
            store,
            ids,
            inventory.clone(),
            accounts.clone(),
            directory.clone(),
            retries,
        );

        Self {
            config,
            inventory,
            accounts,
            directory,
            receipts,
        }
    }

    /// Build a marketplace over a fresh in-memory store
    pub fn in_memory(config: LedgerConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new()), config)
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Route a command to the component that owns it
    pub fn process(&self, command: LedgerCommand) -> Result<CommandOutcome, LedgerError> {
        match command {
            LedgerCommand::OpenAccount { account, balance } => self
                .open_account(&account, balance)
                .map(CommandOutcome::AccountOpened),
            LedgerCommand::RegisterUser { username, account } => self
                .register_user(&username, &account)
                .map(CommandOutcome::UserRegistered),
            LedgerCommand::Restock { product, lot } => self
                .add_stock(&product, lot)
                .map(CommandOutcome::Restocked),
            LedgerCommand::Reprice { product, price } => self
                .reprice(&product, price)
                .map(CommandOutcome::Repriced),
            LedgerCommand::CreateReceipt { lines } => self
                .create_receipt(lines)
                .map(CommandOutcome::ReceiptCreated),
            LedgerCommand::ConfirmReceipt {
                receipt,
                payer,
                payee,
            } => self
                .confirm_receipt(receipt, &payer, &payee)
                .map(CommandOutcome::Settled),
        }
    }

    pub fn open_account(&self, account: &str, balance: Decimal) -> Result<Account, LedgerError> {
        self.accounts.open_account(account, balance)
    }

    pub fn get_account(&self, account: &str) -> Result<Account, LedgerError> {
        self.accounts.get_account(account)
    }

    pub fn list_accounts(&self) -> Result<Vec<Account>, LedgerError> {
        self.accounts.list_accounts()
    }

    pub fn register_user(&self, username: &str, account: &str) -> Result<User, LedgerError> {
        self.directory.register(username, account)
    }

    /// Append a stock lot to a product, creating the product if needed
    pub fn add_stock(&self, product_id: &str, lot: StockLot) -> Result<Product, LedgerError> {
        self.inventory.add_stock(product_id, lot)
    }

    pub fn reprice(&self, product_id: &str, price: Decimal) -> Result<Product, LedgerError> {
        self.inventory.reprice(product_id, price)
    }

    pub fn get_product(&self, product_id: &str) -> Result<Product, LedgerError> {
        self.inventory.get_product(product_id)
    }

    pub fn product_summary(&self, product_id: &str) -> Result<ProductSummary, LedgerError> {
        self.inventory.summary(product_id)
    }

    pub fn list_products(&self) -> Result<Vec<Product>, LedgerError> {
        self.inventory.list_products()
    }

    /// Price `lines` and open a receipt for them
    pub fn create_receipt(&self, lines: Vec<ReceiptLine>) -> Result<Receipt, LedgerError> {
        self.receipts.create(lines)
    }

    /// Settle a receipt from `payer` to `payee`
    pub fn confirm_receipt(
        &self,
        receipt: ReceiptId,
        payer: &str,
        payee: &str,
    ) -> Result<Settled, LedgerError> {
        self.receipts.confirm(receipt, payer, payee)
    }

    /// Settle a receipt between two registered users
    pub fn confirm_between_users(
        &self,
        receipt: ReceiptId,
        from_user: &str,
        to_user: &str,
    ) -> Result<Settled, LedgerError> {
        self.receipts
            .confirm_between_users(receipt, from_user, to_user)
    }

    pub fn get_receipt(&self, receipt: ReceiptId) -> Result<Receipt, LedgerError> {
        self.receipts.get(receipt)
    }

    pub fn view_receipt(&self, receipt: ReceiptId) -> Result<ReceiptView, LedgerError> {
        self.receipts.view(receipt)
    }

    pub fn list_receipts(&self) -> Result<Vec<Receipt>, LedgerError> {
        self.receipts.list()
    }

    /// Read every collection
    ///
    /// Not a consistent point-in-time view while writers are active.
    pub fn snapshot(&self) -> Result<LedgerSnapshot, LedgerError> {
        Ok(LedgerSnapshot {
            accounts: self.list_accounts()?,
            products: self.list_products()?,
            receipts: self.list_receipts()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OverdraftPolicy, ReceiptStatus};
    use rstest::rstest;

    fn commands() -> Vec<LedgerCommand> {
        vec![
            LedgerCommand::OpenAccount {
                account: "buyer".to_string(),
                balance: Decimal::from(100),
            },
            LedgerCommand::OpenAccount {
                account: "seller".to_string(),
                balance: Decimal::ZERO,
            },
            LedgerCommand::Restock {
                product: "apple".to_string(),
                lot: StockLot::new("apple-1", "Apple", Decimal::TEN, Decimal::from(5)),
            },
            LedgerCommand::Restock {
                product: "apple".to_string(),
                lot: StockLot::new("apple-2", "Apple", Decimal::TEN, Decimal::from(3)),
            },
            LedgerCommand::CreateReceipt {
                lines: vec![ReceiptLine::new("apple", Decimal::from(2))],
            },
        ]
    }

    fn seeded(config: LedgerConfig) -> Marketplace {
        let marketplace = Marketplace::in_memory(config);
        for command in commands() {
            marketplace.process(command).unwrap();
        }
        marketplace
    }

    #[test]
    fn test_process_routes_commands() {
        let marketplace = seeded(LedgerConfig::default());

        let outcome = marketplace
            .process(LedgerCommand::ConfirmReceipt {
                receipt: 1,
                payer: "buyer".to_string(),
                payee: "seller".to_string(),
            })
            .unwrap();

        assert!(matches!(outcome, CommandOutcome::Settled(Settled::Closed(_))));
        assert_eq!(
            marketplace.get_account("buyer").unwrap().balance,
            Decimal::from(80)
        );
        assert_eq!(
            marketplace.get_account("seller").unwrap().balance,
            Decimal::from(20)
        );
        assert_eq!(
            marketplace.get_receipt(1).unwrap().status,
            ReceiptStatus::Closed
        );
    }

    #[test]
    fn test_register_and_confirm_between_users() {
        let marketplace = seeded(LedgerConfig::default());
        marketplace
            .process(LedgerCommand::RegisterUser {
                username: "bea".to_string(),
                account: "buyer".to_string(),
            })
            .unwrap();
        marketplace.register_user("sam", "seller").unwrap();

        marketplace.confirm_between_users(1, "bea", "sam").unwrap();

        assert_eq!(
            marketplace.get_account("seller").unwrap().balance,
            Decimal::from(20)
        );
    }

    #[test]
    fn test_first_receipt_id_is_configurable() {
        let config = LedgerConfig {
            first_receipt_id: 1000,
            ..LedgerConfig::default()
        };
        let marketplace = seeded(config);

        assert_eq!(marketplace.list_receipts().unwrap()[0].id, 1000);
    }

    #[rstest]
    #[case::allow(OverdraftPolicy::Allow, true)]
    #[case::deny(OverdraftPolicy::Deny, false)]
    fn test_overdraft_policy_reaches_settlement(
        #[case] policy: OverdraftPolicy,
        #[case] settles: bool,
    ) {
        let marketplace = seeded(LedgerConfig::default().with_overdraft(policy));
        marketplace
            .process(LedgerCommand::Reprice {
                product: "apple".to_string(),
                price: Decimal::from(20),
            })
            .unwrap();
        let receipt = marketplace
            .create_receipt(vec![ReceiptLine::new("apple", Decimal::from(6))])
            .unwrap();
        marketplace.confirm_receipt(1, "buyer", "seller").unwrap();

        // 120 owed with 80 left after the first receipt
        let result = marketplace.confirm_receipt(receipt.id, "buyer", "seller");

        assert_eq!(result.is_ok(), settles);
        let buyer = marketplace.get_account("buyer").unwrap().balance;
        if settles {
            assert_eq!(buyer, Decimal::from(-40));
        } else {
            assert_eq!(buyer, Decimal::from(80));
            assert_eq!(
                marketplace.get_receipt(receipt.id).unwrap().status,
                ReceiptStatus::Opened
            );
        }
    }

    #[test]
    fn test_snapshot_lists_everything_sorted() {
        let marketplace = seeded(LedgerConfig::default());
        marketplace
            .add_stock(
                "banana",
                StockLot::new("banana-1", "Banana", Decimal::ONE, Decimal::ONE),
            )
            .unwrap();

        let snapshot = marketplace.snapshot().unwrap();

        let accounts: Vec<_> = snapshot.accounts.iter().map(|a| a.id.as_str()).collect();
        let products: Vec<_> = snapshot.products.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(accounts, vec!["buyer", "seller"]);
        assert_eq!(products, vec!["apple", "banana"]);
        assert_eq!(snapshot.receipts.len(), 1);
        assert_eq!(
            marketplace.product_summary("apple").unwrap().total_available,
            Decimal::from(8)
        );
    }

    #[test]
    fn test_view_receipt_uses_current_prices() {
        let marketplace = seeded(LedgerConfig::default());
        marketplace.reprice("apple", Decimal::from(11)).unwrap();

        let view = marketplace.view_receipt(1).unwrap();

        assert_eq!(view.lines[0].price, Decimal::from(11));
        assert_eq!(view.total_price, Decimal::from(20));
    }
}
