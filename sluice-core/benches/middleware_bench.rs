//! Middleware overhead benchmarks.
//!
//! ```bash
//! cargo bench -p sluice-core --bench middleware_bench
//! ```

use std::hint::black_box;
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use serde_json::json;
use sluice_core::middleware::{
    CacheConfig, CacheStore, MemoryStore, MiddlewareStack, OperationContext, QueryResponse,
    ResultCache, cache_key_extractor, default_key_extractor, operation_fn,
};
use tokio::time::Instant;

const QUERY: &str = "SELECT * FROM users WHERE age > 25";

fn bench_key_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_extraction");
    let extract = default_key_extractor();

    let keyword = OperationContext::for_query(QUERY);
    group.bench_function("query_channel", |b| b.iter(|| extract(black_box(&keyword))));

    for leading in [1usize, 4, 16] {
        let mut ctx = OperationContext::new();
        for i in 0..leading {
            ctx = ctx.arg_value(i);
        }
        let ctx = ctx.arg_text(QUERY);
        group.bench_with_input(BenchmarkId::new("positional_scan", leading), &ctx, |b, ctx| {
            b.iter(|| extract(black_box(ctx)))
        });
    }

    let cache_key = cache_key_extractor();
    let bound = OperationContext::for_query("SELECT * FROM users WHERE age > ? AND name = ?")
        .bind(25)
        .bind("Ada");
    group.bench_function("cache_key_with_params", |b| b.iter(|| cache_key(black_box(&bound))));

    group.finish();
}

fn bench_cache_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_lookup");
    let ttl = Duration::from_secs(300);

    for entries in [10usize, 1_000, 10_000] {
        let store = MemoryStore::new();
        for i in 0..entries {
            store.insert(
                format!("SELECT * FROM users WHERE id = {i}"),
                QueryResponse::from_rows(vec![json!({ "id": i })]),
                Instant::now(),
            );
        }
        store.insert(QUERY.to_string(), QueryResponse::empty(), Instant::now());

        group.bench_with_input(BenchmarkId::new("hit", entries), &store, |b, store| {
            b.iter(|| store.get_fresh(black_box(QUERY), ttl))
        });
        group.bench_with_input(BenchmarkId::new("miss", entries), &store, |b, store| {
            b.iter(|| store.get_fresh(black_box("SELECT 1"), ttl))
        });
    }

    group.finish();
}

fn bench_stack_cache_hit(c: &mut Criterion) {
    let Ok(rt) = tokio::runtime::Runtime::new() else {
        return;
    };
    let stack = MiddlewareStack::new().with(ResultCache::new(
        MemoryStore::shared(),
        CacheConfig::default(),
    ));
    let op = operation_fn("fetch", |_ctx| async move {
        Ok(QueryResponse::from_rows(vec![json!({ "id": 1 })]))
    });

    c.bench_function("stack_cache_hit", |b| {
        b.to_async(&rt).iter(|| async {
            stack
                .execute(OperationContext::for_query(QUERY), &op)
                .await
                .map(|r| r.len())
        })
    });
}

criterion_group!(
    benches,
    bench_key_extraction,
    bench_cache_lookup,
    bench_stack_cache_hit
);
criterion_main!(benches);
