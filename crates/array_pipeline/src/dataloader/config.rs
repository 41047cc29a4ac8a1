//! src/dataloader/config.rs
//!
//! Configuration for BatchIterator behaviour
//!
//! Example:
//! ```ignore
//! let config = LoaderConfig::builder()
//!     .batch_size(32)
//!     .num_workers(4)
//!     .prefetch_factor(2)
//!     .pin_memory(true)
//!     .build();
//! ```
//!
//! # Performance considerations:
//! - `num_workers`: More workers can improve throughput but increase memory usage
//! - `prefetch_factor`: Higher values reduce GPU starvation but use more memory;
//!                      at most `num_workers * prefetch_factor` batches are in flight

use crate::error::{PipelineError, Result};
use std::time::Duration;

/// Configuration for [`BatchIterator`](super::BatchIterator)
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Number of samples per batch. The last batch of an epoch may be smaller.
    pub batch_size: usize,
    /// Number of parallel fetch workers (0 = fetch on the consumer thread)
    pub num_workers: usize,
    /// Number of batches in flight per worker (must be >0 when using workers)
    pub prefetch_factor: usize,
    /// Copy every batch into page-locked host memory before delivery
    pub pin_memory: bool,
    /// Maximum time to wait for the next batch from workers.
    /// If exceeded, returns an error (assuming workers are stuck). Default: 30s
    pub timeout: Duration,
    /// How often idle workers check for shutdown signal.
    /// Not an error timeout - just a polling interval. Default: 100ms.
    pub worker_poll: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            num_workers: 0,
            prefetch_factor: 2,
            pin_memory: false,
            timeout: Duration::from_secs(30),
            worker_poll: Duration::from_millis(100),
        }
    }
}

impl LoaderConfig {
    pub fn builder() -> LoaderConfigBuilder {
        LoaderConfigBuilder::default()
    }

    /// Checks the invariants the iterator relies on.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        if self.prefetch_factor == 0 && self.num_workers > 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "Prefetch factor must be > 0 when using {} workers",
                self.num_workers
            )));
        }

        if self.num_workers > 0 && self.worker_poll.is_zero() {
            return Err(PipelineError::InvalidConfig(
                "Worker poll interval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Maximum number of index-groups dispatched but not yet delivered.
    pub fn in_flight(&self) -> usize {
        (self.num_workers * self.prefetch_factor).max(1)
    }
}

/// Builder for LoaderConfig with method chaining
#[derive(Debug, Default)]
pub struct LoaderConfigBuilder {
    config: LoaderConfig,
}

impl LoaderConfigBuilder {
    /// Set the batch size (must be > 0)
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Set the number of workers
    pub fn num_workers(mut self, workers: usize) -> Self {
        self.config.num_workers = workers;
        self
    }

    /// Set the prefetch factor.
    /// Higher values help prevent GPU starvation but use more memory.
    pub fn prefetch_factor(mut self, factor: usize) -> Self {
        self.config.prefetch_factor = factor;
        self
    }

    /// Set whether batches are copied into pinned host memory.
    pub fn pin_memory(mut self, pin: bool) -> Self {
        self.config.pin_memory = pin;
        self
    }

    /// Set the timeout for receiving a batch.
    ///
    /// - Too low: May fail batches during legitimate heavy page-in
    /// - Too high: Delays detection of stuck workers.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the worker polling interval
    ///
    /// - Too low: More responsive shutdown, higher CPU usage.
    /// - Too high: Less CPU overhead, slower shutdown response
    pub fn worker_poll(mut self, interval: Duration) -> Self {
        self.config.worker_poll = interval;
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> LoaderConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = LoaderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.prefetch_factor, 2);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.in_flight(), 1);
    }

    #[test]
    fn builder_sets_fields() {
        let config = LoaderConfig::builder()
            .batch_size(16)
            .num_workers(3)
            .prefetch_factor(4)
            .pin_memory(true)
            .timeout(Duration::from_secs(5))
            .worker_poll(Duration::from_millis(20))
            .build();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_size, 16);
        assert!(config.pin_memory);
        assert_eq!(config.in_flight(), 12);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let zero_batch = LoaderConfig::builder().batch_size(0).build();
        assert!(matches!(
            zero_batch.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));

        let zero_prefetch = LoaderConfig::builder()
            .num_workers(2)
            .prefetch_factor(0)
            .build();
        assert!(zero_prefetch.validate().is_err());

        // Prefetch is irrelevant without workers
        let single = LoaderConfig::builder().prefetch_factor(0).build();
        assert!(single.validate().is_ok());
    }
}
