//! Benchmarks for the RAINS caches
//!
//! Measures performance of:
//! - Assertion cache insert and lookup
//! - Negative cache point-in-interval lookup
//! - Eviction under a full cache

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use rains_cache::{
    AssertionCache, AssertionKey, CachedAssertion, CachedRange, NegativeCache, NegativeSection,
    Window,
};
use rains_model::{Assertion, KeySpace, Object, ObjectTag, Shard, Signature, SignatureAlgorithm};

fn make_assertion(name: &str) -> Arc<Assertion> {
    Arc::new(Assertion {
        context: ".".into(),
        zone: "ch".into(),
        name: name.into(),
        content: vec![Object::Ip4("192.0.2.1".parse().unwrap())],
        signatures: vec![Signature {
            key_space: KeySpace::Rains,
            algorithm: SignatureAlgorithm::Ed25519,
            valid_since: 0,
            valid_until: i64::MAX,
            data: b"sig".to_vec(),
        }],
    })
}

fn make_shard(from: &str, to: &str) -> NegativeSection {
    NegativeSection::Shard(Arc::new(Shard {
        context: ".".into(),
        zone: "ch".into(),
        range_from: from.into(),
        range_to: to.into(),
        content: vec![],
        signatures: vec![Signature {
            key_space: KeySpace::Rains,
            algorithm: SignatureAlgorithm::Ed25519,
            valid_since: 0,
            valid_until: i64::MAX,
            data: b"sig".to_vec(),
        }],
    }))
}

/// Benchmark assertion cache lookups at different fill levels
fn bench_assertion_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("assertion_get");

    for &size in &[100usize, 1_000, 10_000] {
        let mut cache = AssertionCache::new(size);
        for i in 0..size {
            let name = format!("name{i}");
            cache.add(
                AssertionKey::new(".", "ch", &name, ObjectTag::Ip4),
                CachedAssertion {
                    assertion: make_assertion(&name),
                    window: Window::new(0, i64::MAX),
                    authoritative: false,
                },
                0,
            );
        }
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                cache.get(
                    ".",
                    "ch",
                    black_box(&format!("name{}", size / 2)),
                    ObjectTag::Ip4,
                    false,
                    100,
                )
            })
        });
    }
    group.finish();
}

/// Benchmark negative cache point lookup over many ranges
fn bench_negative_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("negative_get");

    for &size in &[100usize, 1_000] {
        let mut cache = NegativeCache::new(size);
        for i in 0..size {
            cache.add(
                ".",
                "ch",
                CachedRange {
                    section: make_shard(&format!("a{i:05}"), &format!("a{:05}", i + 1)),
                    window: Window::new(0, i64::MAX),
                    authoritative: false,
                },
                0,
            );
        }
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| cache.get(".", "ch", black_box(&format!("a{:05}x", size / 2)), 100))
        });
    }
    group.finish();
}

/// Benchmark insert when every insert must evict
fn bench_assertion_eviction(c: &mut Criterion) {
    let mut cache = AssertionCache::new(1_000);
    for i in 0..1_000 {
        let name = format!("seed{i}");
        cache.add(
            AssertionKey::new(".", "ch", &name, ObjectTag::Ip4),
            CachedAssertion {
                assertion: make_assertion(&name),
                window: Window::new(0, i64::MAX),
                authoritative: false,
            },
            0,
        );
    }

    let mut i = 0u64;
    c.bench_function("assertion_evicting_insert", |b| {
        b.iter(|| {
            i += 1;
            let name = format!("new{i}");
            cache.add(
                AssertionKey::new(".", "ch", &name, ObjectTag::Ip4),
                CachedAssertion {
                    assertion: make_assertion(&name),
                    window: Window::new(0, i64::MAX),
                    authoritative: false,
                },
                0,
            )
        })
    });
}

criterion_group!(
    benches,
    bench_assertion_get,
    bench_negative_get,
    bench_assertion_eviction
);
criterion_main!(benches);
