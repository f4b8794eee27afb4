//! Benchmarks for intranet hot paths
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use intranet::storage::*;
use intranet::theme::{derive_theme, hex_to_hsl, ThemeMode};
use std::sync::Arc;
use tempfile::tempdir;

fn bench_theme(c: &mut Criterion) {
    let mut group = c.benchmark_group("theme");

    group.bench_function("hex_to_hsl", |b| {
        b.iter(|| hex_to_hsl(black_box("#1e40af")))
    });

    let config = demo_dataset()
        .records::<BrokerageConfig>()
        .unwrap()
        .remove(0);
    for mode in [ThemeMode::Light, ThemeMode::Dark] {
        group.bench_function(format!("derive_{:?}", mode).to_lowercase(), |b| {
            b.iter(|| derive_theme(black_box(&config), mode))
        });
    }

    group.finish();
}

fn bench_list_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_query");

    let rows: Vec<serde_json::Value> = (0..1000)
        .map(|i| {
            serde_json::json!({
                "id": i,
                "published": i % 2 == 0,
                "company_ids": [format!("company-{}", i % 10)],
            })
        })
        .collect();
    let query = ListQuery::new()
        .filter("published", "true")
        .filter("company_ids", "company-3");

    group.throughput(Throughput::Elements(rows.len() as u64));
    group.bench_function("matches_1000", |b| {
        b.iter(|| rows.iter().filter(|row| query.matches(black_box(row))).count())
    });

    group.finish();
}

fn bench_stores(c: &mut Criterion) {
    let mut group = c.benchmark_group("store");
    let runtime = tokio::runtime::Runtime::new().unwrap();

    group.bench_function("local_insert_company", |b| {
        let dir = tempdir().unwrap();
        let store = Store::new(Arc::new(LocalBackend::new(LocalStore::open(
            dir.path(),
            demo_dataset(),
        ))));
        let mut n = 0u64;

        b.iter(|| {
            n += 1;
            runtime
                .block_on(store.insert(Company::new(format!("Bench {}", n))))
                .unwrap()
        });
    });

    group.bench_function("sqlite_insert_company", |b| {
        let store = Store::new(Arc::new(SqliteBackend::open_in_memory().unwrap()));
        let mut n = 0u64;

        b.iter(|| {
            n += 1;
            runtime
                .block_on(store.insert(Company::new(format!("Bench {}", n))))
                .unwrap()
        });
    });

    group.bench_function("local_list_products", |b| {
        let store = Store::new(Arc::new(LocalBackend::new(LocalStore::in_memory(
            demo_dataset(),
        ))));

        b.iter(|| runtime.block_on(store.all::<Product>()).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_theme, bench_list_filter, bench_stores);
criterion_main!(benches);
