//! src/dataloader/loader.rs
//!
//! `BatchIterator`: the restartable, per-epoch batch source handed to a
//! training loop.
//!
//! One `BatchIterator` owns one dataset and one sampler. Every call to
//! [`iterate`](BatchIterator::iterate) starts a new epoch: the sampler draws
//! a fresh ordering, the ordering is cut into index-groups of `batch_size`,
//! and the groups are assembled into batches (in parallel when
//! `num_workers > 0`).

use std::sync::Arc;
use tracing::info;

use super::config::LoaderConfig;
use super::iterator::EpochIter;
use crate::collator::{Collator, StackCollator};
use crate::dataset::Dataset;
use crate::error::{PipelineError, Result};
use crate::pipeline::{RunHook, Split};
use crate::sampler::Sampler;

/// Produces one [`EpochIter`] per call to [`iterate`](Self::iterate).
///
/// # Thread safety:
/// - `BatchIterator` is `Send + Sync`; the dataset is shared with workers
///   through an `Arc` and never copied.
/// - `EpochIter` owns its worker pool and should be consumed on one thread.
pub struct BatchIterator {
    dataset: Arc<dyn Dataset>,
    sampler: Box<dyn Sampler>,
    collator: Arc<dyn Collator>,
    config: LoaderConfig,
    hook: Option<(Split, Arc<dyn RunHook>)>,
}

impl BatchIterator {
    /// Creates a new `BatchIterator` with the default [`StackCollator`].
    ///
    /// # Errors
    /// - `InvalidConfig` if `batch_size` is 0
    /// - `InvalidConfig` if `prefetch_factor` is 0 when using workers
    /// - `InvalidConfig` if the sampler is not sized to the dataset
    ///
    /// # Example
    /// ```ignore
    /// let config = LoaderConfig::builder().batch_size(32).num_workers(4).build();
    /// let loader = BatchIterator::new(dataset, SplitSampler::new(n, Some(42)), config)?;
    /// for epoch in 0..10 {
    ///     for batch in loader.iterate()? {
    ///         let batch = batch?;
    ///     }
    /// }
    /// ```
    pub fn new(
        dataset: impl Dataset + 'static,
        sampler: impl Sampler + 'static,
        config: LoaderConfig,
    ) -> Result<Self> {
        Self::from_parts(Arc::new(dataset), Box::new(sampler), config)
    }

    /// Same as [`new`](Self::new) for already type-erased parts.
    pub fn from_parts(
        dataset: Arc<dyn Dataset>,
        sampler: Box<dyn Sampler>,
        config: LoaderConfig,
    ) -> Result<Self> {
        config.validate()?;

        if sampler.len() != dataset.len() {
            return Err(PipelineError::InvalidConfig(format!(
                "Sampler covers {} indices but the dataset has {} samples",
                sampler.len(),
                dataset.len()
            )));
        }

        Ok(Self {
            dataset,
            sampler,
            collator: Arc::new(StackCollator),
            config,
            hook: None,
        })
    }

    /// Replaces the default [`StackCollator`].
    pub fn with_collator(mut self, collator: impl Collator + 'static) -> Self {
        self.collator = Arc::new(collator);
        self
    }

    /// Notifies `hook` at the start of every epoch, labelled with `split`.
    pub fn with_hook(mut self, split: Split, hook: Arc<dyn RunHook>) -> Self {
        self.hook = Some((split, hook));
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn dataset(&self) -> &Arc<dyn Dataset> {
        &self.dataset
    }

    /// Number of samples per epoch.
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Number of batches per epoch: `ceil(len / batch_size)`.
    pub fn num_batches(&self) -> usize {
        self.len().div_ceil(self.config.batch_size)
    }

    /// Starts a new epoch.
    ///
    /// Draws a fresh ordering from the sampler, partitions it into
    /// index-groups and, with workers configured, spawns the worker pool for
    /// this epoch. The returned iterator yields exactly
    /// [`num_batches`](Self::num_batches) batches.
    pub fn iterate(&self) -> Result<EpochIter> {
        let indices = self.sampler.new_epoch();
        let epoch = indices.epoch();
        let groups = indices.groups(self.config.batch_size)?;

        info!(
            epoch,
            samples = indices.len(),
            batches = groups.len(),
            batch_size = self.config.batch_size,
            workers = self.config.num_workers,
            "Starting epoch"
        );
        if let Some((split, hook)) = &self.hook {
            hook.on_epoch_start(*split, epoch, groups.len());
        }

        if self.config.num_workers == 0 {
            Ok(EpochIter::single(
                epoch,
                groups,
                self.dataset.clone(),
                self.collator.clone(),
                self.config.pin_memory,
            ))
        } else {
            EpochIter::multi(
                epoch,
                groups,
                self.dataset.clone(),
                self.collator.clone(),
                &self.config,
            )
        }
    }
}
