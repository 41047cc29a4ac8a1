use array_pipeline::{
    materialize, BatchIterator, ElementKind, IndexedDataset, LoaderConfig, NoProgress,
    RawArrayHandle, SplitSampler,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ndarray::{Array1, Array3};
use ndarray_npy::write_npy;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Epoch throughput of the batch iterator.
///
/// This measures:
/// 1. Access path: rows read from the memory map vs. from a materialized
///    (f16) tensor
/// 2. Parallelism: fetching on the consumer thread vs. a worker pool
///
/// To run these, use:
/// ```bash
/// cargo bench --bench pipeline_bench
/// ```

const SAMPLES: usize = 20_000;
const ROW: (usize, usize) = (16, 16);
const BATCH_SIZE: usize = 64;
const WORKERS: [usize; 3] = [0, 2, 4];

fn write_fixture(dir: &Path) -> (PathBuf, PathBuf) {
    let x = Array3::from_shape_fn((SAMPLES, ROW.0, ROW.1), |(i, r, c)| {
        (i + r * ROW.1 + c) as f32 / SAMPLES as f32
    });
    let y = Array1::from_shape_fn(SAMPLES, |i| (i % 10) as i64);
    let features = dir.join("bench_x.npy");
    let labels = dir.join("bench_y.npy");
    write_npy(&features, &x).expect("failed to write features");
    write_npy(&labels, &y).expect("failed to write labels");
    (features, labels)
}

fn mapped_dataset(features: &Path, labels: &Path) -> IndexedDataset {
    IndexedDataset::from_arrays(
        RawArrayHandle::open(features).expect("open features"),
        RawArrayHandle::open(labels).expect("open labels"),
    )
    .expect("paired arrays")
}

fn materialized_dataset(features: &Path, labels: &Path) -> IndexedDataset {
    IndexedDataset::from_arrays(
        materialize(features, ElementKind::F16, 256, &mut NoProgress).expect("convert features"),
        materialize(labels, ElementKind::I64, 256, &mut NoProgress).expect("convert labels"),
    )
    .expect("paired arrays")
}

fn loader(dataset: IndexedDataset, workers: usize) -> BatchIterator {
    let config = LoaderConfig::builder()
        .batch_size(BATCH_SIZE)
        .num_workers(workers)
        .prefetch_factor(2)
        .build();
    BatchIterator::new(dataset, SplitSampler::new(SAMPLES, Some(0)), config).expect("loader")
}

/// Measure one full epoch per iteration
fn bench_epoch(c: &mut Criterion) {
    let dir = TempDir::new().expect("temp dir");
    let (features, labels) = write_fixture(dir.path());

    let mut group = c.benchmark_group("Epoch Throughput");
    group.throughput(Throughput::Elements(SAMPLES as u64));
    group.sample_size(10);

    for &workers in &WORKERS {
        let mapped = loader(mapped_dataset(&features, &labels), workers);
        group.bench_with_input(BenchmarkId::new("mapped", workers), &mapped, |b, loader| {
            b.iter(|| {
                let batches = loader
                    .iterate()
                    .expect("epoch")
                    .map(|batch| batch.expect("batch"))
                    .count();
                black_box(batches);
            })
        });

        let materialized = loader(materialized_dataset(&features, &labels), workers);
        group.bench_with_input(
            BenchmarkId::new("materialized_f16", workers),
            &materialized,
            |b, loader| {
                b.iter(|| {
                    let batches = loader
                        .iterate()
                        .expect("epoch")
                        .map(|batch| batch.expect("batch"))
                        .count();
                    black_box(batches);
                })
            },
        );
    }
    group.finish();
}

/// Measure the one-off block-wise conversion
fn bench_materialize(c: &mut Criterion) {
    let dir = TempDir::new().expect("temp dir");
    let (features, _) = write_fixture(dir.path());

    let mut group = c.benchmark_group("Materialize");
    group.sample_size(10);
    for block_size in [64, 1024, 8192] {
        group.bench_with_input(
            BenchmarkId::new("f32_to_f16", block_size),
            &block_size,
            |b, &block_size| {
                b.iter(|| {
                    let array = materialize(&features, ElementKind::F16, block_size, &mut NoProgress)
                        .expect("convert");
                    black_box(array);
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_epoch, bench_materialize);
criterion_main!(benches);
