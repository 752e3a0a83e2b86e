//! # Social-Mesh Hot Path Benchmarks
//!
//! Every guarded request pays for one admission, and every read pays for at
//! least one cache lookup:
//!
//! | Path | Store round trips | Target (in-memory) |
//! |------|-------------------|--------------------|
//! | sm-01 admission | 1 `consume_window` | < 10µs |
//! | sm-02 cache hit | 1 `GET` + decode | < 20µs |
//! | sm-02 prefix invalidation | 1 `SCAN` + 1 `DEL` | grows with key count |

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shared_store::{InMemoryStore, SharedStore};
use shared_types::{Post, PostId, UserId};
use sm_01_rate_limiter::{RateLimitKey, RateLimiter, RateLimiterApi, RoutePolicy};
use sm_02_cache_manager::CacheManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

const WINDOW: Duration = Duration::from_secs(60);
const TTL: Duration = Duration::from_secs(300);

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("benchmark runtime")
}

// ============================================================================
// SM-01: Admission
// ============================================================================

fn bench_admission(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("sm-01-rate-limiter");
    group.measurement_time(Duration::from_secs(5));
    group.throughput(Throughput::Elements(1));

    let store = Arc::new(InMemoryStore::new());
    group.bench_function("consume_window", |b| {
        b.iter(|| {
            rt.block_on(store.consume_window(black_box("ratelimit:bench:u1"), u32::MAX, WINDOW))
        })
    });

    let limiter = RateLimiter::new(Arc::new(InMemoryStore::new()));
    let key = RateLimitKey::new("u1", "post:get");
    group.bench_function("admit", |b| {
        b.iter(|| rt.block_on(limiter.admit(black_box(&key), u32::MAX, WINDOW)))
    });

    // Rejections take the same single round trip.
    let policy = RoutePolicy::new("post:create", 1, WINDOW);
    group.bench_function("check_rejected", |b| {
        b.iter(|| rt.block_on(limiter.check(black_box(&policy), "u2")))
    });

    group.finish();
}

// ============================================================================
// SM-02: Cache
// ============================================================================

fn page_of(n: usize) -> Vec<Post> {
    (0..n)
        .map(|i| Post {
            id: PostId::new(format!("p{i}")),
            user_id: UserId::new("u1"),
            content: "benchmark post body with a few words in it".into(),
            media_ids: vec![],
            created_at: Utc::now(),
        })
        .collect()
}

fn bench_cache(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("sm-02-cache-manager");
    group.measurement_time(Duration::from_secs(5));

    for n in [1usize, 10, 50] {
        let cache = CacheManager::new(Arc::new(InMemoryStore::new()));
        let page = page_of(n);
        rt.block_on(cache.set("posts:1:10", &page, TTL))
            .expect("seed cache");

        group.bench_with_input(BenchmarkId::new("get_hit", n), &cache, |b, cache| {
            b.iter(|| rt.block_on(cache.get::<Vec<Post>>(black_box("posts:1:10"))))
        });
        group.bench_with_input(BenchmarkId::new("set", n), &page, |b, page| {
            b.iter(|| rt.block_on(cache.set("posts:1:10", black_box(page), TTL)))
        });
    }

    for keys in [10usize, 100, 1000] {
        let store = Arc::new(InMemoryStore::new());
        let cache = CacheManager::new(store.clone());
        group.bench_with_input(
            BenchmarkId::new("invalidate_prefix", keys),
            &keys,
            |b, &keys| {
                b.iter(|| {
                    rt.block_on(async {
                        for i in 0..keys {
                            let _ = store.set_ex(&format!("posts:{i}:10"), "[]", TTL).await;
                        }
                        black_box(cache.invalidate_prefix("posts:").await)
                    })
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_admission, bench_cache);
criterion_main!(benches);
