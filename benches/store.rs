//! Benchmarks for the block store hot paths.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use tempfile::TempDir;

use blocktail::config::Config;
use blocktail::store::{BlockRecord, BlockStore};

fn store_in(dir: &TempDir) -> BlockStore {
    let config = Config {
        store_dir: dir.path().to_path_buf(),
        block_secs: 3600,
        ..Default::default()
    };
    BlockStore::open(&config).unwrap()
}

fn bench_record_codec(c: &mut Criterion) {
    let rec = BlockRecord {
        start: 1_700_000_000,
        duration: 3600,
    };
    let bytes = rec.encode();

    c.bench_function("record_encode", |b| {
        b.iter(|| black_box(black_box(&rec).encode()))
    });
    c.bench_function("record_decode", |b| {
        b.iter(|| black_box(BlockRecord::decode(black_box(&bytes)).unwrap()))
    });
}

fn bench_record_hit(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);

    c.bench_function("record_hit_new_and_renew", |b| {
        let mut i = 0u32;
        b.iter(|| {
            let line = format!("10.{}.{}.{} GET /probe", i >> 16 & 0xff, i >> 8 & 0xff, i & 0xff);
            store.record_hit_at(black_box(&line), 1_700_000_000);
            i = (i + 1) % 4096;
        })
    });
}

fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("sweep");

    for size in [100, 1000] {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        for i in 0..size {
            let line = format!("10.0.{}.{} hit", i / 256, i % 256);
            store.record_hit_at(&line, 1_700_000_000);
        }

        group.bench_with_input(BenchmarkId::new("unexpired", size), &store, |b, store| {
            b.iter(|| black_box(store.sweep(1_700_000_060).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_record_codec, bench_record_hit, bench_sweep);
criterion_main!(benches);
