//! Throughput benchmarks for key encoding and the end-to-end stream.

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use xisort_core::{XiRng, XiSort, XiSortConfig, ieee_key};

fn bench_ieee_key(c: &mut Criterion) {
    let mut rng = XiRng::new(7);
    let vals: Vec<f64> = (0..65_536).map(|_| rng.uniform() * 2.0 - 1.0).collect();
    c.bench_function("ieee_key_64k", |b| {
        b.iter(|| {
            vals.iter()
                .map(|&v| ieee_key(black_box(v)))
                .fold(0u64, u64::wrapping_add)
        });
    });
}

fn bench_stream_sort(c: &mut Criterion) {
    let mut rng = XiRng::new(3);
    let input: Vec<f64> = (0..100_000).map(|_| rng.uniform()).collect();
    c.bench_function("stream_sort_100k", |b| {
        b.iter(|| {
            let sorter = XiSort::new(XiSortConfig {
                seed: Some(1),
                chunk_capacity: 1 << 14,
                ..XiSortConfig::default()
            })
            .expect("construct sorter");
            sorter
                .stream_sort(input.iter().copied())
                .expect("chunk phase")
                .map(|r| r.expect("stream"))
                .count()
        });
    });
}

criterion_group!(benches, bench_ieee_key, bench_stream_sort);
criterion_main!(benches);
