//! Shared `.npy` fixtures for the integration tests.

#![allow(dead_code)]

use anyhow::Result;
use array_pipeline::{PipelineConfig, TaskFiles, TaskVariant};
use ndarray::{Array1, Array3};
use ndarray_npy::write_npy;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Writes `n` samples to `features` and `labels`.
///
/// Feature row `i` is a 2x3 grid filled with `i + j / 10`; label `i` is `i`.
/// Every row carries its own index, so a batch can be traced back to the
/// samples it was built from.
pub fn write_arrays(features: &Path, labels: &Path, n: usize) -> Result<()> {
    let x = Array3::from_shape_fn((n, 2, 3), |(i, r, c)| {
        i as f32 + (r * 3 + c) as f32 / 10.0
    });
    let y = Array1::from_shape_fn(n, |i| i as i64);
    write_npy(features, &x)?;
    write_npy(labels, &y)?;
    Ok(())
}

/// Same as [`write_arrays`], named `{stem}_x.npy` / `{stem}_y.npy` in `dir`.
pub fn write_pair(dir: &Path, stem: &str, n: usize) -> Result<(PathBuf, PathBuf)> {
    let features = dir.join(format!("{stem}_x.npy"));
    let labels = dir.join(format!("{stem}_y.npy"));
    write_arrays(&features, &labels, n)?;
    Ok((features, labels))
}

/// Writes the four files a task expects, with `train` and `val` samples.
pub fn write_task(files: &TaskFiles, train: usize, val: usize) -> Result<()> {
    write_arrays(&files.train_features, &files.train_labels, train)?;
    write_arrays(&files.val_features, &files.val_labels, val)
}

/// A temp dir populated for `task` at `level`, plus a matching config.
pub fn task_fixture(
    task: TaskVariant,
    level: u32,
    train: usize,
    val: usize,
) -> Result<(TempDir, PipelineConfig)> {
    let dir = TempDir::new()?;
    let mut config = PipelineConfig::new(task, level, 4);
    config.data_dir = dir.path().to_path_buf();
    config.seed = Some(2024);
    write_task(&config.task_files(), train, val)?;
    Ok((dir, config))
}

/// Sample indices recovered from a batch's labels.
pub fn labels_of(batch: &array_pipeline::Batch) -> Result<Vec<i64>> {
    Ok(Vec::<i64>::try_from(&batch.labels)?)
}
