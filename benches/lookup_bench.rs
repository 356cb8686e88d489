use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use qqwry::{validate_bytes, Database, QqwryBuilder, ValidationLevel};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use std::hint::black_box;
use std::net::Ipv4Addr;

const PROVINCES: &[&str] = &[
    "北京市", "上海市", "广东省", "浙江省", "江苏省", "福建省", "四川省", "湖北省",
];
const ISPS: &[&str] = &["电信", "联通", "移动", "教育网", "CZ88.NET", ""];

/// Synthetic database with `count` contiguous ranges spread over the address space
fn synthetic_db(count: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut starts = BTreeSet::new();
    starts.insert(0u32);
    while starts.len() < count {
        starts.insert(rng.random::<u32>());
    }
    let starts: Vec<u32> = starts.into_iter().collect();

    let mut builder = QqwryBuilder::new();
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).map_or(u32::MAX, |next| next - 1);
        let country = PROVINCES[rng.random_range(0..PROVINCES.len())];
        let area = ISPS[rng.random_range(0..ISPS.len())];
        builder
            .add_range_ip(Ipv4Addr::from(start), Ipv4Addr::from(end), country, area)
            .unwrap();
    }
    builder.build().unwrap()
}

fn random_queries(n: usize, seed: u64) -> Vec<Ipv4Addr> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| Ipv4Addr::from(rng.random::<u32>())).collect()
}

fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("load");
    for count in [10_000, 100_000] {
        let bytes = synthetic_db(count, 7);
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &bytes, |b, bytes| {
            b.iter(|| Database::from_bytes(black_box(bytes.clone())).unwrap());
        });
    }
    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");
    let queries = random_queries(10_000, 42);
    group.throughput(Throughput::Elements(queries.len() as u64));

    for count in [10_000, 100_000, 500_000] {
        let db = Database::from_bytes_builder(synthetic_db(count, 7))
            .no_cache()
            .open()
            .unwrap();

        group.bench_with_input(BenchmarkId::new("locate", count), &queries, |b, queries| {
            b.iter(|| {
                for &ip in queries {
                    black_box(db.locate(black_box(ip)));
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("lookup_ip", count), &queries, |b, queries| {
            b.iter(|| {
                for &ip in queries {
                    black_box(db.lookup_ip(black_box(ip)).unwrap());
                }
            });
        });
    }

    let db = Database::from_bytes(synthetic_db(100_000, 7)).unwrap();
    let text: Vec<String> = queries.iter().map(|ip| ip.to_string()).collect();
    group.bench_function("lookup_str/100000", |b| {
        b.iter(|| {
            for q in &text {
                black_box(db.lookup(black_box(q)).unwrap());
            }
        });
    });

    group.finish();
}

fn bench_validate(c: &mut Criterion) {
    let bytes = synthetic_db(100_000, 7);
    let mut group = c.benchmark_group("validate");
    group.sample_size(20);
    group.bench_function("strict/100000", |b| {
        b.iter(|| validate_bytes(black_box(&bytes), ValidationLevel::Strict));
    });
    group.finish();
}

criterion_group!(benches, bench_load, bench_lookup, bench_validate);
criterion_main!(benches);
