use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use matrix::PartitionManager;
use namespace::LocalNamespace;
use snapshot::{SnapshotPaths, SnapshotWriter, WorkerAttemptId};
use std::sync::Arc;
use tempfile::tempdir;

const N_MATRICES: u32 = 4;
const N_ROWS: u64 = 10_000;

fn build_engine() -> Arc<PartitionManager> {
    let pm = Arc::new(PartitionManager::new());
    for m in 0..N_MATRICES {
        pm.create_matrix(m);
        for row in 0..N_ROWS {
            pm.increment(m, row, row as f64 * 0.5);
        }
        for task in 0..8 {
            pm.set_clock(m, task, task * 3);
        }
    }
    pm
}

fn snapshot_write_benchmark(c: &mut Criterion) {
    c.bench_function("snapshot_write_cycle_40k_rows", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let paths = SnapshotPaths::new(dir.path(), WorkerAttemptId::new(0, 0));
                std::fs::create_dir_all(paths.temp_dir()).unwrap();
                let writer =
                    SnapshotWriter::new(Arc::new(LocalNamespace::new()), build_engine(), paths);
                (dir, writer)
            },
            |(_dir, mut writer)| {
                writer.write_snapshot().unwrap();
            },
            BatchSize::SmallInput,
        );
    });
}

fn matrix_encode_benchmark(c: &mut Criterion) {
    let engine = build_engine();
    c.bench_function("matrix_encode_40k_rows", |b| {
        b.iter(|| {
            let mut buf = Vec::new();
            engine.write_matrix(&mut buf).unwrap();
            buf
        });
    });
}

fn matrix_decode_benchmark(c: &mut Criterion) {
    let mut image = Vec::new();
    build_engine().write_matrix(&mut image).unwrap();

    c.bench_function("matrix_decode_40k_rows", |b| {
        b.iter_batched(
            PartitionManager::new,
            |pm| {
                pm.parse_matrices_from_input(&mut image.as_slice()).unwrap();
                pm
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    snapshot_write_benchmark,
    matrix_encode_benchmark,
    matrix_decode_benchmark
);
criterion_main!(benches);
