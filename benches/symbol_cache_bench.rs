use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use symbol_cache::{embed_str, ManualClock, SymbolCache};

fn lcg(mut s: u64) -> impl Iterator<Item = u64> {
    std::iter::from_fn(move || {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        Some(s)
    })
}

fn key(n: u64) -> String {
    format!("S{:08X}", n as u32)
}

fn warm_cache(keys: &[String]) -> SymbolCache {
    let cache = SymbolCache::builder()
        .clock(Arc::new(ManualClock::new(0)))
        .initial_capacity(keys.len())
        .build()
        .unwrap();
    for k in keys {
        cache.resolve(k);
    }
    cache
}

fn bench_resolve_insert(c: &mut Criterion) {
    let keys: Vec<_> = lcg(1).take(10_000).map(key).collect();
    c.bench_function("symbol_cache_resolve_insert_10k", |b| {
        b.iter_batched(
            || SymbolCache::builder().build().unwrap(),
            |cache| {
                for k in &keys {
                    black_box(cache.resolve(k));
                }
                cache
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_resolve_hit(c: &mut Criterion) {
    let keys: Vec<_> = lcg(7).take(20_000).map(key).collect();
    let cache = warm_cache(&keys);
    let mut it = keys.iter().cycle();
    c.bench_function("symbol_cache_resolve_hit", |b| {
        b.iter(|| black_box(cache.resolve(it.next().unwrap())))
    });
}

fn bench_resolve_key_hit(c: &mut Criterion) {
    let keys: Vec<_> = lcg(7).take(20_000).map(key).collect();
    let cache = warm_cache(&keys);
    let bufs: Vec<Vec<u16>> = keys.iter().map(|k| embed_str(k)).collect();
    let mut it = bufs.iter().cycle();
    c.bench_function("symbol_cache_resolve_key_hit", |b| {
        b.iter(|| black_box(cache.resolve_key(it.next().unwrap()).unwrap()))
    });
}

fn bench_acquire_release(c: &mut Criterion) {
    let cache = SymbolCache::new();
    let _pin = cache.acquire("AAPL");
    c.bench_function("symbol_cache_acquire_release", |b| {
        b.iter(|| {
            black_box(cache.acquire("AAPL"));
            cache.release("AAPL").unwrap();
        })
    });
}

fn bench_contended_hits(c: &mut Criterion) {
    let keys: Vec<_> = lcg(3).take(1_000).map(key).collect();
    let cache = Arc::new(warm_cache(&keys));
    let keys = Arc::new(keys);
    c.bench_function("symbol_cache_resolve_hit_4_threads", |b| {
        b.iter(|| {
            let workers: Vec<_> = (0..4)
                .map(|t| {
                    let cache = Arc::clone(&cache);
                    let keys = Arc::clone(&keys);
                    thread::spawn(move || {
                        for k in keys.iter().skip(t).step_by(4) {
                            black_box(cache.resolve(k));
                        }
                    })
                })
                .collect();
            for w in workers {
                w.join().unwrap();
            }
        })
    });
}

fn bench_config() -> Criterion {
    Criterion::default()
        .sample_size(50)
        .measurement_time(Duration::from_secs(8))
        .warm_up_time(Duration::from_secs(2))
}

criterion_group! {
    name = benches;
    config = bench_config();
    targets = bench_resolve_insert, bench_resolve_hit, bench_resolve_key_hit,
        bench_acquire_release, bench_contended_hits
}
criterion_main!(benches);
