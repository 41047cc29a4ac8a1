//! Train/validation assembly: four array files in, two batch iterators out.
//!
//! ```ignore
//! let config = PipelineConfig::from_json_file("run.json")?;
//! let loaders = build_loaders(&config, &config.task_files(), None)?;
//! for epoch in 0..epochs {
//!     for batch in loaders.train.iterate()? {
//!         let batch = batch?;
//!     }
//!     for batch in loaders.validation.iterate()? { /* .. */ }
//! }
//! ```

use crate::array::{materialize, ArrayRows, ElementKind, RawArrayHandle};
use crate::config::{LoadMode, PipelineConfig, TaskFiles};
use crate::dataloader::{BatchIterator, LoaderConfig};
use crate::dataset::{Dataset, IndexedDataset};
use crate::error::Result;
use crate::progress::TracingProgress;
use crate::sampler::SplitSampler;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Which half of the data a loader serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Split {
    Train,
    Validation,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Split::Train => f.write_str("train"),
            Split::Validation => f.write_str("validation"),
        }
    }
}

/// Observer for an experiment-tracking run.
///
/// Purely informational: loaders built with or without a hook produce the
/// same batches in the same order.
pub trait RunHook: Send + Sync {
    /// Name of the active run, if a tracker is attached.
    fn run_name(&self) -> Option<String>;

    /// Called once per `iterate()` before the first batch is fetched.
    fn on_epoch_start(&self, _split: Split, _epoch: usize, _num_batches: usize) {}
}

/// The two loaders of one training run.
pub struct TrainValLoaders {
    pub train: BatchIterator,
    pub validation: BatchIterator,
    /// Run name reported by the hook at assembly time.
    pub run_name: Option<String>,
}

impl TrainValLoaders {
    pub fn get(&self, split: Split) -> &BatchIterator {
        match split {
            Split::Train => &self.train,
            Split::Validation => &self.validation,
        }
    }
}

/// Opens (or materializes) the four arrays in `files` and builds one
/// shuffling loader per split.
///
/// The train sampler is seeded with `config.seed`, the validation sampler
/// with `config.seed + 1`, so the two orders are independent but both
/// reproducible. Arrays opened before a failure are released before the
/// error is returned.
pub fn build_loaders(
    config: &PipelineConfig,
    files: &TaskFiles,
    hook: Option<Arc<dyn RunHook>>,
) -> Result<TrainValLoaders> {
    config.validate()?;

    let run_name = hook.as_ref().and_then(|h| h.run_name());
    info!(
        task = %config.task,
        level = config.level,
        bits = config.bits(),
        load_mode = ?config.load_mode,
        run = run_name.as_deref().unwrap_or("<none>"),
        "Building train/validation loaders"
    );

    let loader_config = config.loader_config();
    let train = build_split(
        Split::Train,
        &files.train_features,
        &files.train_labels,
        config,
        &loader_config,
        config.seed,
        run_name.as_deref(),
        hook.clone(),
    )?;
    let validation = build_split(
        Split::Validation,
        &files.val_features,
        &files.val_labels,
        config,
        &loader_config,
        config.seed.map(|s| s.wrapping_add(1)),
        run_name.as_deref(),
        hook,
    )?;

    info!(
        train_samples = train.len(),
        train_batches = train.num_batches(),
        val_samples = validation.len(),
        val_batches = validation.num_batches(),
        "Loaders ready"
    );

    Ok(TrainValLoaders {
        train,
        validation,
        run_name,
    })
}

#[allow(clippy::too_many_arguments)]
fn build_split(
    split: Split,
    features_path: &Path,
    labels_path: &Path,
    config: &PipelineConfig,
    loader_config: &LoaderConfig,
    seed: Option<u64>,
    run_name: Option<&str>,
    hook: Option<Arc<dyn RunHook>>,
) -> Result<BatchIterator> {
    let (features, labels) = match config.load_mode {
        LoadMode::Mapped => (open_mapped(features_path)?, open_mapped(labels_path)?),
        LoadMode::Materialize {
            features,
            labels,
            block_size,
        } => (
            open_materialized(split, "features", features_path, features, block_size)?,
            open_materialized(split, "labels", labels_path, labels, block_size)?,
        ),
    };

    let mut dataset = IndexedDataset::new(features, labels)?
        .with_metadata("split", split.to_string())
        .with_metadata("task", config.task.to_string())
        .with_metadata("level", config.level.to_string());
    if let Some(name) = run_name {
        dataset = dataset.with_metadata("run", name);
    }

    let sampler = SplitSampler::new(dataset.len(), seed);
    debug!(%split, samples = dataset.len(), ?seed, "Split sampler ready");

    let loader = BatchIterator::new(dataset, sampler, loader_config.clone())?;
    Ok(match hook {
        Some(hook) => loader.with_hook(split, hook),
        None => loader,
    })
}

fn open_mapped(path: &Path) -> Result<Arc<dyn ArrayRows>> {
    Ok(Arc::new(RawArrayHandle::open(path)?))
}

fn open_materialized(
    split: Split,
    side: &str,
    path: &Path,
    target: ElementKind,
    block_size: usize,
) -> Result<Arc<dyn ArrayRows>> {
    let mut progress = TracingProgress::new(format!("{split} {side}"));
    Ok(Arc::new(materialize(path, target, block_size, &mut progress)?))
}
