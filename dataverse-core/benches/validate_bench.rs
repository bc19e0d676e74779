//! Criterion benchmarks for the per-run hot paths.
//!
//! Benchmarks:
//! 1. Candidate validation (crypto and stock, mixed valid/invalid)
//! 2. Bronze CSV encoding
//! 3. Silver cleaning plus gold aggregation

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value};

use dataverse_core::domain::{Batch, Source};
use dataverse_core::storage::encode_csv;
use dataverse_core::transform::{aggregate, clean};
use dataverse_core::validate::{partition, CRYPTO_SCHEMA, STOCK_SCHEMA};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_coins(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| {
            // Every tenth coin is missing its price.
            let price = if i % 10 == 9 {
                Value::Null
            } else {
                json!(1.0 + i as f64)
            };
            json!({
                "id": format!("coin-{i}"),
                "symbol": format!("c{i}"),
                "name": format!("Coin {i}"),
                "current_price": price,
                "market_cap": 1e6 * (i as f64 + 1.0).powi(3),
                "total_volume": 1e5 * (i as f64 + 1.0),
                "price_change_percentage_24h": (i as f64 * 0.37).sin() * 10.0,
                "last_updated": "2024-03-01T12:00:00.000Z"
            })
        })
        .collect()
}

fn make_quotes(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| {
            let price = 100.0 + (i as f64 * 0.1).sin() * 10.0;
            json!({
                "symbol": format!("S{i}"),
                "name": format!("Stock {i}"),
                "price": price,
                "open": price - 0.5,
                "dayHigh": price + 1.0,
                "dayLow": price - 1.0,
                "volume": 1_000_000 + i,
                "changesPercentage": (i as f64 * 0.2).cos(),
                "timestamp": 1_709_294_400 + i as i64
            })
        })
        .collect()
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_validation(c: &mut Criterion) {
    let observed = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let mut group = c.benchmark_group("validate");

    for n in [10usize, 250, 5_000] {
        let coins = make_coins(n);
        group.bench_with_input(BenchmarkId::new("crypto", n), &coins, |b, coins| {
            b.iter(|| partition(black_box(coins), &CRYPTO_SCHEMA, observed))
        });

        let quotes = make_quotes(n);
        group.bench_with_input(BenchmarkId::new("stock", n), &quotes, |b, quotes| {
            b.iter(|| partition(black_box(quotes), &STOCK_SCHEMA, observed))
        });
    }
    group.finish();
}

fn bench_encode_and_promote(c: &mut Criterion) {
    let observed = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let (records, dropped) = partition(&make_coins(1_000), &CRYPTO_SCHEMA, observed);
    let batch = Batch::new(Source::Crypto, observed, records, dropped).unwrap();

    c.bench_function("bronze_csv_1000", |b| {
        b.iter(|| encode_csv(black_box(&batch)).unwrap())
    });

    c.bench_function("silver_gold_1000", |b| {
        b.iter(|| {
            let silver = clean(
                black_box(batch.records().to_vec()),
                Source::Crypto,
                observed,
                observed,
            )
            .unwrap();
            aggregate(&silver, observed)
        })
    });
}

criterion_group!(benches, bench_validation, bench_encode_and_promote);
criterion_main!(benches);
