//! Inventory ledger
//!
//! This module provides the `InventoryLedger` struct, the only component that
//! mutates products and their stock lots.
//!
//! The InventoryLedger is responsible for:
//! - Creating products on their first restock and appending lots afterwards
//! - Keeping the product aggregates equal to the sums over its lots
//! - Depleting lots oldest first, all or nothing
//! - Journalling settlement depletions so they apply once and can be reversed
//!
//! Every mutation is an optimistic read-modify-write of the product document,
//! retried when a concurrent writer bumps the version in between.

use super::Change;
use crate::store::{self, DocumentStore};
use crate::types::{Entity, LedgerError, LotDraw, Product, ProductSummary, StockLot};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Owns all product and stock lot state
#[derive(Clone)]
pub struct InventoryLedger {
    store: Arc<dyn DocumentStore>,
    conflict_retries: u32,
}

impl InventoryLedger {
    /// Create an inventory ledger over `store`
    pub fn new(store: Arc<dyn DocumentStore>, conflict_retries: u32) -> Self {
        Self {
            store,
            conflict_retries,
        }
    }

    /// Get a product with its lots
    ///
    /// # Errors
    ///
    /// `NotFound` if no product is stored under `product_id`.
    pub fn get_product(&self, product_id: &str) -> Result<Product, LedgerError> {
        Ok(store::fetch_required(self.store.as_ref(), Entity::Product, product_id)?.value)
    }

    /// Get a product without its lots
    pub fn summary(&self, product_id: &str) -> Result<ProductSummary, LedgerError> {
        Ok(self.get_product(product_id)?.summary())
    }

    /// All products, sorted by id
    pub fn list_products(&self) -> Result<Vec<Product>, LedgerError> {
        store::fetch_all(self.store.as_ref(), Entity::Product)
    }

    /// Current list price of a product
    pub fn price_of(&self, product_id: &str) -> Result<Decimal, LedgerError> {
        Ok(self.get_product(product_id)?.price)
    }

    /// Quantity available across all lots of a product
    pub fn available(&self, product_id: &str) -> Result<Decimal, LedgerError> {
        Ok(self.get_product(product_id)?.total_available)
    }

    /// Append a stock lot to a product, creating the product if needed
    ///
    /// A new product is keyed by `product_id` and takes its name and price
    /// from the lot. For an existing product only the lot sequence and the
    /// aggregates change. The lot's status is re-derived from its
    /// availability before it is stored.
    ///
    /// # Arguments
    ///
    /// * `product_id` - Product to restock
    /// * `lot` - The restock batch
    ///
    /// # Returns
    ///
    /// The product as stored after the restock
    ///
    /// # Errors
    ///
    /// - `InvalidQuantity` if the lot's available or sold quantity is negative
    /// - `InvalidPrice` if the lot's price is negative
    /// - `ArithmeticOverflow` if an aggregate would overflow
    /// - `StoreUnavailable` / `Contention` from the store
    pub fn add_stock(&self, product_id: &str, mut lot: StockLot) -> Result<Product, LedgerError> {
        validate_lot(product_id, &lot)?;
        lot.refresh_status();

        let store = self.store.as_ref();
        store::retry_on_conflict(Entity::Product, product_id, self.conflict_retries, || {
            match store::fetch::<Product>(store, Entity::Product, product_id)? {
                Some(current) => {
                    let mut product = current.value;
                    append_lot(&mut product, lot.clone())?;
                    store::replace(store, Entity::Product, product_id, current.version, &product)?;
                    Ok(product)
                }
                None => {
                    let mut product = Product::from_lot(product_id, &lot);
                    append_lot(&mut product, lot.clone())?;
                    store::insert(store, Entity::Product, product_id, &product)?;
                    Ok(product)
                }
            }
        })
        .inspect(|product| {
            tracing::debug!(
                product = product_id,
                lot = %lot.id,
                available = %product.total_available,
                "stock added"
            );
        })
    }

    /// Change the list price used for receipts created from now on
    ///
    /// # Errors
    ///
    /// - `InvalidPrice` if `price` is negative
    /// - `NotFound` if the product does not exist
    pub fn reprice(&self, product_id: &str, price: Decimal) -> Result<Product, LedgerError> {
        if price.is_sign_negative() {
            return Err(LedgerError::invalid_price(product_id, price));
        }

        self.update(product_id, |product| {
            if product.price == price {
                return Ok(Change::Unchanged(product.clone()));
            }
            product.price = price;
            Ok(Change::Changed(product.clone()))
        })
    }

    /// Move `quantity` from available to sold, oldest lots first
    ///
    /// The total availability is checked before any lot is touched, so a
    /// depletion either succeeds completely or leaves the product unchanged.
    ///
    /// # Returns
    ///
    /// The draws taken from each lot, in lot order. A zero quantity takes
    /// nothing and writes nothing.
    ///
    /// # Errors
    ///
    /// - `InvalidQuantity` if `quantity` is negative
    /// - `InsufficientStock` if the lots hold less than `quantity`
    /// - `NotFound` if the product does not exist
    pub fn deplete(&self, product_id: &str, quantity: Decimal) -> Result<Vec<LotDraw>, LedgerError> {
        validate_depletion(product_id, quantity)?;

        self.update(product_id, |product| {
            if quantity.is_zero() {
                return Ok(Change::Unchanged(Vec::new()));
            }
            Ok(Change::Changed(draw(product, quantity)?))
        })
    }

    /// Deplete once per settlement step
    ///
    /// If `key` was already applied, the journalled draws are returned and
    /// the product is left alone. Otherwise the depletion and its journal
    /// entry are written together.
    pub fn deplete_once(
        &self,
        product_id: &str,
        quantity: Decimal,
        key: &str,
    ) -> Result<Vec<LotDraw>, LedgerError> {
        validate_depletion(product_id, quantity)?;

        self.update(product_id, |product| {
            if let Some(draws) = product.journal.get(key) {
                tracing::debug!(product = product_id, key, "depletion already applied");
                return Ok(Change::Unchanged(draws.clone()));
            }
            let draws = draw(product, quantity)?;
            product.journal.insert(key.to_string(), draws.clone());
            Ok(Change::Changed(draws))
        })
    }

    /// Reverse the depletion journalled under `key`
    ///
    /// Lots regain what was drawn from them and reopen if they had sold out.
    ///
    /// # Returns
    ///
    /// `true` if a depletion was reversed, `false` if nothing was journalled
    /// under `key`
    pub fn restore(&self, product_id: &str, key: &str) -> Result<bool, LedgerError> {
        self.update(product_id, |product| match product.journal.remove(key) {
            Some(draws) => {
                undraw(product, &draws)?;
                Ok(Change::Changed(true))
            }
            None => Ok(Change::Unchanged(false)),
        })
    }

    /// Drop the journal entry of a settlement that has completed
    ///
    /// The draws stay applied; only the record of them goes. Used once the
    /// receipt is closed and the entry can no longer be replayed.
    ///
    /// # Returns
    ///
    /// `true` if an entry was removed
    pub fn forget(&self, product_id: &str, key: &str) -> Result<bool, LedgerError> {
        self.update(product_id, |product| match product.journal.remove(key) {
            Some(_) => Ok(Change::Changed(true)),
            None => Ok(Change::Unchanged(false)),
        })
    }

    /// Optimistic read-modify-write of an existing product
    fn update<R, F>(&self, product_id: &str, mut apply: F) -> Result<R, LedgerError>
    where
        F: FnMut(&mut Product) -> Result<Change<R>, LedgerError>,
    {
        let store = self.store.as_ref();
        store::retry_on_conflict(Entity::Product, product_id, self.conflict_retries, || {
            let current = store::fetch_required::<Product>(store, Entity::Product, product_id)?;
            let mut product = current.value;
            match apply(&mut product)? {
                Change::Changed(result) => {
                    store::replace(store, Entity::Product, product_id, current.version, &product)?;
                    Ok(result)
                }
                Change::Unchanged(result) => Ok(result),
            }
        })
    }
}

fn validate_lot(product_id: &str, lot: &StockLot) -> Result<(), LedgerError> {
    if lot.total_available.is_sign_negative() {
        return Err(LedgerError::invalid_quantity(
            lot.total_available,
            &format!("restock of product '{product_id}'"),
        ));
    }
    if lot.total_sold.is_sign_negative() {
        return Err(LedgerError::invalid_quantity(
            lot.total_sold,
            &format!("sold quantity of lot '{}'", lot.id),
        ));
    }
    if lot.price.is_sign_negative() {
        return Err(LedgerError::invalid_price(product_id, lot.price));
    }
    Ok(())
}

fn validate_depletion(product_id: &str, quantity: Decimal) -> Result<(), LedgerError> {
    if quantity.is_sign_negative() && !quantity.is_zero() {
        return Err(LedgerError::invalid_quantity(
            quantity,
            &format!("depletion of product '{product_id}'"),
        ));
    }
    Ok(())
}

/// Add a lot to the end of the sequence and to the aggregates
fn append_lot(product: &mut Product, lot: StockLot) -> Result<(), LedgerError> {
    product.total_available = product
        .total_available
        .checked_add(lot.total_available)
        .ok_or_else(|| LedgerError::arithmetic_overflow("restock", &product.id))?;
    product.total_sold = product
        .total_sold
        .checked_add(lot.total_sold)
        .ok_or_else(|| LedgerError::arithmetic_overflow("restock", &product.id))?;
    product.stocks.push(lot);
    Ok(())
}

/// FIFO walk over the lots
///
/// Each lot gives up to what it holds; the walk stops once `quantity` is
/// covered. Lots are changed in place, so an error leaves `product` half
/// drawn; callers discard it without writing.
fn draw(product: &mut Product, quantity: Decimal) -> Result<Vec<LotDraw>, LedgerError> {
    let available: Decimal = product.stocks.iter().map(|lot| lot.total_available).sum();
    if available < quantity {
        return Err(LedgerError::insufficient_stock(
            &product.id,
            available,
            quantity,
        ));
    }

    let mut remaining = quantity;
    let mut draws = Vec::new();
    for (index, lot) in product.stocks.iter_mut().enumerate() {
        if remaining.is_zero() {
            break;
        }
        if lot.total_available.is_zero() {
            continue;
        }

        let taken = lot.total_available.min(remaining);
        lot.total_available = checked_sub(lot.total_available, taken, "depletion", &lot.id)?;
        lot.total_sold = checked_add(lot.total_sold, taken, "depletion", &lot.id)?;
        lot.refresh_status();
        remaining -= taken;

        draws.push(LotDraw {
            lot: index,
            quantity: taken,
        });
    }

    product.total_available =
        checked_sub(product.total_available, quantity, "depletion", &product.id)?;
    product.total_sold = checked_add(product.total_sold, quantity, "depletion", &product.id)?;
    Ok(draws)
}

/// Give back what `draws` took
fn undraw(product: &mut Product, draws: &[LotDraw]) -> Result<(), LedgerError> {
    for draw in draws {
        let lot = product.stocks.get_mut(draw.lot).ok_or_else(|| {
            LedgerError::invalid_quantity(draw.quantity, &format!("restore of lot #{}", draw.lot))
        })?;
        lot.total_available = checked_add(lot.total_available, draw.quantity, "restore", &lot.id)?;
        lot.total_sold = checked_sub(lot.total_sold, draw.quantity, "restore", &lot.id)?;
        lot.refresh_status();

        product.total_available =
            checked_add(product.total_available, draw.quantity, "restore", &product.id)?;
        product.total_sold = checked_sub(product.total_sold, draw.quantity, "restore", &product.id)?;
    }
    Ok(())
}

fn checked_add(
    value: Decimal,
    delta: Decimal,
    operation: &str,
    target: &str,
) -> Result<Decimal, LedgerError> {
    value
        .checked_add(delta)
        .ok_or_else(|| LedgerError::arithmetic_overflow(operation, target))
}

fn checked_sub(
    value: Decimal,
    delta: Decimal,
    operation: &str,
    target: &str,
) -> Result<Decimal, LedgerError> {
    value
        .checked_sub(delta)
        .ok_or_else(|| LedgerError::arithmetic_overflow(operation, target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::LotStatus;
    use rstest::rstest;
    use std::thread;

    fn setup() -> (Arc<MemoryStore>, InventoryLedger) {
        let store = Arc::new(MemoryStore::new());
        let ledger = InventoryLedger::new(store.clone() as Arc<dyn DocumentStore>, 64);
        (store, ledger)
    }

    fn lot(id: &str, quantity: i64) -> StockLot {
        StockLot::new(id, "Apple", Decimal::TEN, Decimal::from(quantity))
    }

    /// Product with lots [5 @ 10, 3 @ 10]
    fn stocked() -> (Arc<MemoryStore>, InventoryLedger) {
        let (store, ledger) = setup();
        ledger.add_stock("apple", lot("lot-1", 5)).unwrap();
        ledger.add_stock("apple", lot("lot-2", 3)).unwrap();
        (store, ledger)
    }

    #[test]
    fn test_first_restock_creates_product() {
        let (_, ledger) = setup();

        let product = ledger.add_stock("apple", lot("lot-1", 5)).unwrap();

        assert_eq!(product.id, "apple");
        assert_eq!(product.name, "Apple");
        assert_eq!(product.price, Decimal::TEN);
        assert_eq!(product.total_available, Decimal::from(5));
        assert_eq!(product.total_sold, Decimal::ZERO);
        assert_eq!(product.stocks.len(), 1);
        assert_eq!(ledger.get_product("apple").unwrap(), product);
    }

    #[test]
    fn test_restocks_accumulate() {
        let (_, ledger) = setup();

        for (i, quantity) in [5, 3, 7].into_iter().enumerate() {
            ledger
                .add_stock("apple", lot(&format!("lot-{i}"), quantity))
                .unwrap();
        }

        let product = ledger.get_product("apple").unwrap();
        assert_eq!(product.total_available, Decimal::from(15));
        assert_eq!(product.total_sold, Decimal::ZERO);
        assert_eq!(product.stocks.len(), 3);
    }

    #[test]
    fn test_restock_keeps_existing_identity() {
        let (_, ledger) = setup();
        ledger.add_stock("apple", lot("lot-1", 5)).unwrap();

        let other = StockLot::new("lot-2", "Green apple", Decimal::ONE, Decimal::ONE);
        let product = ledger.add_stock("apple", other).unwrap();

        assert_eq!(product.name, "Apple");
        assert_eq!(product.price, Decimal::TEN);
        assert_eq!(product.stocks[1].name, "Green apple");
    }

    #[test]
    fn test_restock_normalizes_lot_status() {
        let (_, ledger) = setup();
        let mut empty = lot("lot-1", 0);
        empty.status = LotStatus::Available;

        let product = ledger.add_stock("apple", empty).unwrap();
        assert_eq!(product.stocks[0].status, LotStatus::Sold);
    }

    #[test]
    fn test_restock_counts_presold_quantity() {
        let (_, ledger) = setup();
        let mut partly_sold = lot("lot-1", 4);
        partly_sold.total_sold = Decimal::from(2);

        let product = ledger.add_stock("apple", partly_sold).unwrap();
        assert_eq!(product.total_available, Decimal::from(4));
        assert_eq!(product.total_sold, Decimal::from(2));
    }

    #[rstest]
    #[case::negative_quantity(StockLot::new("l", "Apple", Decimal::TEN, Decimal::NEGATIVE_ONE))]
    #[case::negative_price(StockLot::new("l", "Apple", Decimal::NEGATIVE_ONE, Decimal::ONE))]
    fn test_restock_rejects_invalid_lot(#[case] bad: StockLot) {
        let (store, ledger) = setup();

        let result = ledger.add_stock("apple", bad);

        assert!(matches!(
            result,
            Err(LedgerError::InvalidQuantity { .. } | LedgerError::InvalidPrice { .. })
        ));
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_deplete_spans_lots_in_order() {
        let (_, ledger) = stocked();

        let draws = ledger.deplete("apple", Decimal::from(6)).unwrap();

        assert_eq!(
            draws,
            vec![
                LotDraw { lot: 0, quantity: Decimal::from(5) },
                LotDraw { lot: 1, quantity: Decimal::ONE },
            ]
        );

        let product = ledger.get_product("apple").unwrap();
        assert_eq!(product.stocks[0].total_available, Decimal::ZERO);
        assert_eq!(product.stocks[0].status, LotStatus::Sold);
        assert_eq!(product.stocks[1].total_available, Decimal::from(2));
        assert_eq!(product.stocks[1].status, LotStatus::Available);
        assert_eq!(product.total_sold, Decimal::from(6));
        assert_eq!(product.total_available, Decimal::from(2));
    }

    #[rstest]
    #[case::within_first_lot(3, 2, 3)]
    #[case::exactly_first_lot(5, 0, 5)]
    #[case::everything(8, 0, 8)]
    fn test_deplete_moves_exact_quantity(
        #[case] quantity: i64,
        #[case] first_lot_left: i64,
        #[case] sold: i64,
    ) {
        let (_, ledger) = stocked();

        ledger.deplete("apple", Decimal::from(quantity)).unwrap();

        let product = ledger.get_product("apple").unwrap();
        assert_eq!(product.stocks[0].total_available, Decimal::from(first_lot_left));
        assert_eq!(product.total_sold, Decimal::from(sold));
        assert_eq!(product.total_available, Decimal::from(8 - sold));
        for lot in &product.stocks {
            assert_eq!(lot.status == LotStatus::Sold, lot.total_available.is_zero());
        }
    }

    #[test]
    fn test_deplete_more_than_available_changes_nothing() {
        let (store, ledger) = stocked();
        let before = ledger.get_product("apple").unwrap();
        let writes = store.write_count();

        let result = ledger.deplete("apple", Decimal::from(9));

        assert_eq!(
            result.unwrap_err(),
            LedgerError::insufficient_stock("apple", Decimal::from(8), Decimal::from(9))
        );
        assert_eq!(ledger.get_product("apple").unwrap(), before);
        assert_eq!(store.write_count(), writes);
    }

    #[test]
    fn test_deplete_overflow_is_an_error() {
        let (store, ledger) = setup();
        let mut stock = lot("lot-1", 5);
        stock.total_sold = Decimal::MAX;
        ledger.add_stock("apple", stock).unwrap();
        let writes = store.write_count();

        let result = ledger.deplete("apple", Decimal::ONE);

        assert!(matches!(result, Err(LedgerError::ArithmeticOverflow { .. })));
        assert_eq!(store.write_count(), writes);
        assert_eq!(ledger.available("apple").unwrap(), Decimal::from(5));
    }

    #[test]
    fn test_forget_drops_journal_entry_only() {
        let (_, ledger) = stocked();
        ledger
            .deplete_once("apple", Decimal::from(6), "receipt:1:line:0")
            .unwrap();

        assert!(ledger.forget("apple", "receipt:1:line:0").unwrap());
        assert!(!ledger.forget("apple", "receipt:1:line:0").unwrap());

        let product = ledger.get_product("apple").unwrap();
        assert!(product.journal.is_empty());
        assert_eq!(product.total_sold, Decimal::from(6));
        assert_eq!(product.total_available, Decimal::from(2));
    }

    #[test]
    fn test_deplete_zero_is_noop() {
        let (store, ledger) = stocked();
        let writes = store.write_count();

        assert!(ledger.deplete("apple", Decimal::ZERO).unwrap().is_empty());
        assert_eq!(store.write_count(), writes);
    }

    #[test]
    fn test_deplete_negative_is_rejected() {
        let (_, ledger) = stocked();

        assert!(matches!(
            ledger.deplete("apple", Decimal::NEGATIVE_ONE),
            Err(LedgerError::InvalidQuantity { .. })
        ));
    }

    #[test]
    fn test_deplete_unknown_product() {
        let (_, ledger) = setup();

        assert_eq!(
            ledger.deplete("pear", Decimal::ONE).unwrap_err(),
            LedgerError::not_found(Entity::Product, "pear")
        );
    }

    #[test]
    fn test_deplete_once_applies_once() {
        let (_, ledger) = stocked();

        let first = ledger
            .deplete_once("apple", Decimal::from(6), "receipt:1:line:0")
            .unwrap();
        let second = ledger
            .deplete_once("apple", Decimal::from(6), "receipt:1:line:0")
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(
            ledger.get_product("apple").unwrap().total_sold,
            Decimal::from(6)
        );
    }

    #[test]
    fn test_restore_reopens_sold_lots() {
        let (_, ledger) = stocked();
        let before = ledger.get_product("apple").unwrap();
        ledger
            .deplete_once("apple", Decimal::from(6), "receipt:1:line:0")
            .unwrap();

        assert!(ledger.restore("apple", "receipt:1:line:0").unwrap());
        assert!(!ledger.restore("apple", "receipt:1:line:0").unwrap());

        assert_eq!(ledger.get_product("apple").unwrap(), before);
    }

    #[test]
    fn test_reprice_changes_list_price_only() {
        let (_, ledger) = stocked();

        let product = ledger.reprice("apple", Decimal::from(12)).unwrap();

        assert_eq!(product.price, Decimal::from(12));
        assert_eq!(product.stocks[0].price, Decimal::TEN);
        assert_eq!(ledger.price_of("apple").unwrap(), Decimal::from(12));
    }

    #[test]
    fn test_reprice_rejects_negative_price() {
        let (_, ledger) = stocked();

        assert!(matches!(
            ledger.reprice("apple", Decimal::NEGATIVE_ONE),
            Err(LedgerError::InvalidPrice { .. })
        ));
    }

    #[test]
    fn test_summary_and_listing() {
        let (_, ledger) = stocked();
        ledger
            .add_stock("banana", StockLot::new("b-1", "Banana", Decimal::ONE, Decimal::TEN))
            .unwrap();

        let summary = ledger.summary("apple").unwrap();
        assert_eq!(summary.total_available, Decimal::from(8));
        assert_eq!(ledger.available("banana").unwrap(), Decimal::TEN);

        let ids: Vec<_> = ledger
            .list_products()
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec!["apple", "banana"]);
    }

    #[test]
    fn test_store_outage_surfaces() {
        let (store, ledger) = stocked();
        store.set_offline(true);

        assert!(matches!(
            ledger.add_stock("apple", lot("lot-3", 1)),
            Err(LedgerError::StoreUnavailable { .. })
        ));
        assert!(matches!(
            ledger.get_product("apple"),
            Err(LedgerError::StoreUnavailable { .. })
        ));
    }

    #[test]
    fn test_concurrent_depletions_conserve_stock() {
        let (store, _) = setup();
        let ledger = InventoryLedger::new(store.clone() as Arc<dyn DocumentStore>, 10_000);
        ledger.add_stock("apple", lot("lot-1", 30)).unwrap();
        ledger.add_stock("apple", lot("lot-2", 30)).unwrap();

        // 8 threads x 10 units of one each, 60 available: exactly 60 succeed
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                thread::spawn(move || {
                    (0..10)
                        .filter(|_| ledger.deplete("apple", Decimal::ONE).is_ok())
                        .count()
                })
            })
            .collect();

        let succeeded: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        let product = ledger.get_product("apple").unwrap();

        assert_eq!(succeeded, 60);
        assert_eq!(product.total_available, Decimal::ZERO);
        assert_eq!(product.total_sold, Decimal::from(60));
        assert!(product.stocks.iter().all(|l| l.status == LotStatus::Sold));
    }

    #[test]
    fn test_concurrent_first_restocks_create_one_product() {
        let (store, _) = setup();
        let ledger = InventoryLedger::new(store.clone() as Arc<dyn DocumentStore>, 10_000);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ledger = ledger.clone();
                thread::spawn(move || ledger.add_stock("apple", lot(&format!("lot-{i}"), 2)))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        let product = ledger.get_product("apple").unwrap();
        assert_eq!(product.stocks.len(), 8);
        assert_eq!(product.total_available, Decimal::from(16));
    }
}
