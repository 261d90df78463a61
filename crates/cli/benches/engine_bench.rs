use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use engine::{Engine, Options};
use tempfile::tempdir;

const N: usize = 1_000;
const VAL_SIZE: usize = 100;

fn bench_opts(max_segment_size: u64) -> Options {
    Options {
        max_segment_size,
        memtable_budget: 64 * 1024 * 1024,
        sync_writes: false,
    }
}

fn engine_put_single_segment(c: &mut Criterion) {
    c.bench_function("engine_put_1k_single_segment", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let engine = Engine::open_with(dir.path(), bench_opts(64 * 1024 * 1024)).unwrap();
                (dir, engine)
            },
            |(_dir, engine)| {
                for i in 0..N {
                    let key = format!("k{i}");
                    engine.put(&key, Some(&[b'x'; VAL_SIZE])).unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn engine_put_with_rolls(c: &mut Criterion) {
    c.bench_function("engine_put_1k_with_rolls", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                // ~110 bytes per record, 16 KiB cap: several rolls per run
                let engine = Engine::open_with(dir.path(), bench_opts(16 * 1024)).unwrap();
                (dir, engine)
            },
            |(_dir, engine)| {
                for i in 0..N {
                    let key = format!("k{i}");
                    engine.put(&key, Some(&[b'x'; VAL_SIZE])).unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn engine_read_from_segments(c: &mut Criterion) {
    c.bench_function("engine_read_1k_from_segments", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let engine = Engine::open_with(dir.path(), bench_opts(64 * 1024 * 1024)).unwrap();
                for i in 0..N {
                    let key = format!("k{i}");
                    engine.put(&key, Some(&[b'x'; VAL_SIZE])).unwrap();
                }
                // drain the memtable so reads come from segment indexes
                engine.flush().unwrap();
                (dir, engine)
            },
            |(_dir, engine)| {
                for i in 0..N {
                    let key = format!("k{i}");
                    assert!(engine.read(&key).unwrap().is_some());
                }
            },
            BatchSize::LargeInput,
        );
    });
}

fn engine_read_range(c: &mut Criterion) {
    c.bench_function("engine_read_range_1k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let engine = Engine::open_with(dir.path(), bench_opts(64 * 1024 * 1024)).unwrap();
                for i in 0..N {
                    let key = format!("k{i:04}");
                    engine.put(&key, Some(&[b'x'; VAL_SIZE])).unwrap();
                }
                engine.flush().unwrap();
                (dir, engine)
            },
            |(_dir, engine)| {
                let got = engine.read_range("k0000", "k9999").unwrap();
                assert_eq!(got.len(), N);
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(
    benches,
    engine_put_single_segment,
    engine_put_with_rolls,
    engine_read_from_segments,
    engine_read_range
);
criterion_main!(benches);
