//! Benchmark suite for comparing processing strategies
//!
//! This benchmark compares the sync and async strategies on generated
//! command journals using the divan benchmarking framework.
//!
//! # Running Benchmarks
//!
//! ```bash
//! cargo bench
//! ```
//!
//! # Generated Journals
//!
//! Each journal opens one buyer and one seller account per shopper, stocks
//! a handful of products in several lots, then creates and confirms one
//! receipt per shopper. Shoppers buy from different products so the async
//! strategy can settle many confirmations at once.

use marketplace_ledger::cli::StrategyType;
use marketplace_ledger::strategy::{create_strategy, BatchConfig};
use marketplace_ledger::LedgerConfig;
use std::io::Write;
use tempfile::NamedTempFile;

const PRODUCTS: usize = 16;

fn main() {
    divan::main();
}

/// Write a journal with `shoppers` purchases to a temporary file
fn journal(shoppers: usize) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    let mut rows = String::from("type,account,counterparty,product,lot,name,price,quantity,amount,receipt,lines\n");

    for shopper in 0..shoppers {
        rows.push_str(&format!("open,buyer-{shopper},,,,,,,1000,,\n"));
        rows.push_str(&format!("open,seller-{shopper},,,,,,,0,,\n"));
    }
    for product in 0..PRODUCTS {
        for lot in 0..4 {
            rows.push_str(&format!(
                "restock,,,p{product},p{product}-{lot},Product {product},2.50,{},,,\n",
                shoppers
            ));
        }
    }
    for shopper in 0..shoppers {
        rows.push_str(&format!(
            "receipt,,,,,,,,,,p{}:2;p{}:1\n",
            shopper % PRODUCTS,
            (shopper + 1) % PRODUCTS
        ));
    }
    for shopper in 0..shoppers {
        rows.push_str(&format!(
            "confirm,buyer-{shopper},seller-{shopper},,,,,,,{},\n",
            shopper + 1
        ));
    }

    file.write_all(rows.as_bytes())
        .and_then(|_| file.flush())
        .expect("Failed to write journal");
    file
}

#[divan::bench(args = [100, 1_000, 10_000])]
fn sync_strategy(bencher: divan::Bencher, shoppers: usize) {
    bencher.with_inputs(|| journal(shoppers)).bench_values(|file| {
        let strategy = create_strategy(StrategyType::Sync, LedgerConfig::default(), None);
        let mut output = Vec::new();

        strategy
            .process(file.path(), &mut output)
            .expect("Processing failed");
    });
}

#[divan::bench(args = [100, 1_000, 10_000])]
fn async_strategy(bencher: divan::Bencher, shoppers: usize) {
    bencher.with_inputs(|| journal(shoppers)).bench_values(|file| {
        let strategy = create_strategy(
            StrategyType::Async,
            LedgerConfig::default(),
            Some(BatchConfig::default()),
        );
        let mut output = Vec::new();

        strategy
            .process(file.path(), &mut output)
            .expect("Processing failed");
    });
}
