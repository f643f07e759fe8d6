//! CSV format handling for command records and ledger output
//!
//! This module centralizes all CSV format concerns, providing:
//! - CsvRecord structure for deserialization
//! - Conversion from CSV records to ledger commands
//! - Account and inventory output serialization
//!
//! All functions are pure (no I/O) for easy testing.

use crate::types::{Account, LedgerCommand, Product, ReceiptLine, StockLot};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

/// CSV record structure for deserialization
///
/// Matches the command journal columns:
/// `type,account,counterparty,product,lot,name,price,quantity,amount,receipt,lines`.
/// Every column except `type` is optional; which ones a row needs depends
/// on its type.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct CsvRecord {
    #[serde(rename = "type")]
    pub command_type: String,
    pub account: Option<String>,
    pub counterparty: Option<String>,
    pub product: Option<String>,
    pub lot: Option<String>,
    pub name: Option<String>,
    pub price: Option<String>,
    pub quantity: Option<String>,
    pub amount: Option<String>,
    pub receipt: Option<String>,
    pub lines: Option<String>,
}

/// Value of a column that the command type needs
fn required<'a>(value: &'a Option<String>, column: &str, kind: &str) -> Result<&'a str, String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(format!("'{}' command requires {}", kind, column)),
    }
}

fn parse_decimal(value: &str, column: &str) -> Result<Decimal, String> {
    Decimal::from_str(value.trim()).map_err(|_| format!("Invalid {} '{}'", column, value))
}

/// Parse `product:quantity;product:quantity` into receipt lines
///
/// Empty segments are skipped, so an empty field yields no lines.
pub fn parse_lines(lines: &str) -> Result<Vec<ReceiptLine>, String> {
    lines
        .split(';')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let (product, quantity) = segment
                .split_once(':')
                .ok_or_else(|| format!("Invalid receipt line '{}', expected product:quantity", segment))?;
            let product = product.trim();
            if product.is_empty() {
                return Err(format!("Invalid receipt line '{}', missing product", segment));
            }
            Ok(ReceiptLine::new(product, parse_decimal(quantity, "quantity")?))
        })
        .collect()
}

/// Convert a CsvRecord to a LedgerCommand
///
/// This function:
/// - Parses the command type (case insensitive)
/// - Checks that the columns the type needs are present
/// - Parses decimals, receipt ids and receipt lines
///
/// Semantic checks (negative quantities, unknown products) are left to the
/// ledger so that they are reported the same way for every caller.
///
/// # Returns
///
/// Result containing either:
/// - Ok(LedgerCommand) - Successfully converted record
/// - Err(String) - Error message describing the conversion failure
pub fn convert_csv_record(csv_record: CsvRecord) -> Result<LedgerCommand, String> {
    let kind = csv_record.command_type.trim().to_lowercase();

    match kind.as_str() {
        "open" => {
            let account = required(&csv_record.account, "account", &kind)?;
            let balance = match csv_record.amount.as_deref().map(str::trim) {
                Some(amount) if !amount.is_empty() => parse_decimal(amount, "amount")?,
                _ => Decimal::ZERO,
            };
            Ok(LedgerCommand::OpenAccount {
                account: account.to_string(),
                balance,
            })
        }
        "user" => Ok(LedgerCommand::RegisterUser {
            username: required(&csv_record.name, "name", &kind)?.to_string(),
            account: required(&csv_record.account, "account", &kind)?.to_string(),
        }),
        "restock" => {
            let product = required(&csv_record.product, "product", &kind)?;
            let lot = csv_record
                .lot
                .as_deref()
                .map(str::trim)
                .filter(|lot| !lot.is_empty())
                .unwrap_or(product);
            let name = csv_record
                .name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .unwrap_or(product);
            let price = parse_decimal(required(&csv_record.price, "price", &kind)?, "price")?;
            let quantity =
                parse_decimal(required(&csv_record.quantity, "quantity", &kind)?, "quantity")?;

            Ok(LedgerCommand::Restock {
                product: product.to_string(),
                lot: StockLot::new(lot, name, price, quantity),
            })
        }
        "reprice" => Ok(LedgerCommand::Reprice {
            product: required(&csv_record.product, "product", &kind)?.to_string(),
            price: parse_decimal(required(&csv_record.price, "price", &kind)?, "price")?,
        }),
        "receipt" => Ok(LedgerCommand::CreateReceipt {
            lines: parse_lines(csv_record.lines.as_deref().unwrap_or_default())?,
        }),
        "confirm" => {
            let receipt = required(&csv_record.receipt, "receipt", &kind)?;
            let receipt = receipt
                .parse::<u64>()
                .map_err(|_| format!("Invalid receipt id '{}'", receipt))?;
            Ok(LedgerCommand::ConfirmReceipt {
                receipt,
                payer: required(&csv_record.account, "account", &kind)?.to_string(),
                payee: required(&csv_record.counterparty, "counterparty", &kind)?.to_string(),
            })
        }
        _ => Err(format!(
            "Invalid command type: '{}'",
            csv_record.command_type
        )),
    }
}

/// Write account balances to CSV format
///
/// Writes accounts with columns: account, balance. Accounts are sorted by id
/// for deterministic output and balances are rounded to two decimals.
///
/// # Returns
///
/// * `Ok(())` if writing succeeded
/// * `Err(String)` if a write error occurred
pub fn write_accounts_csv(accounts: &[Account], output: &mut dyn Write) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);

    writer
        .write_record(["account", "balance"])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted_accounts: Vec<&Account> = accounts.iter().collect();
    sorted_accounts.sort_by(|a, b| a.id.cmp(&b.id));

    for account in sorted_accounts {
        writer
            .write_record([account.id.clone(), format!("{:.2}", account.balance)])
            .map_err(|e| format!("Failed to write account record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}

/// Write product inventory to CSV format
///
/// Columns: product, name, price, available, sold, lots. Products are sorted
/// by id; quantities are printed without trailing zeros.
pub fn write_inventory_csv(products: &[Product], output: &mut dyn Write) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);

    writer
        .write_record(["product", "name", "price", "available", "sold", "lots"])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted_products: Vec<&Product> = products.iter().collect();
    sorted_products.sort_by(|a, b| a.id.cmp(&b.id));

    for product in sorted_products {
        writer
            .write_record([
                product.id.clone(),
                product.name.clone(),
                format!("{:.2}", product.price),
                product.total_available.normalize().to_string(),
                product.total_sold.normalize().to_string(),
                product.stocks.len().to_string(),
            ])
            .map_err(|e| format!("Failed to write product record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}
