//! src/dataloader/mod.rs
//!
//! This module implements the `BatchIterator`.
//!
//! The `BatchIterator` coordinates a `Dataset`, a `Sampler` and a `Collator`
//! to turn randomly-indexable samples into an ordered stream of batches,
//! optionally assembling them on a pool of worker threads.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌─────────┐
//!                    │ Sampler │ (fresh ordering per epoch)
//!                    └────┬────┘
//!                         │ SplitIndices
//!                         ↓
//!                  ┌───────────────┐
//!                  │ BatchIterator │ ←───── LoaderConfig (batch_size, workers, etc.)
//!                  └──────┬────────┘
//!                         │ index-groups tagged with a sequence number
//!                         ↓
//!                   [Worker Threads] (optional parallelism)
//!                         │
//!                         │ Dataset::get + Collator::collate (+ pin)
//!                         ↓
//!                  ┌───────────────┐
//!                  │ ReorderBuffer │ (restores dispatch order)
//!                  └──────┬────────┘
//!                         ↓
//!                     ┌───────┐
//!                     │ Batch │ (ready for model)
//!                     └───────┘
//! ```
//!
//! # Module Structure
//!
//! ```text
//! src/dataloader/
//! ├── mod.rs             # Public API exports + module-level architecture docs
//! ├── config.rs          # LoaderConfig, builder, and validation
//! ├── loader.rs          # BatchIterator
//! ├── iterator/
//! │   ├── mod.rs         # EpochIter (single- and multi-threaded)
//! │   └── reorder.rs     # Sequence-number reorder buffer
//! ├── workers/
//! │   ├── mod.rs
//! │   ├── pool.rs        # Generic `WorkerPool<Task, Output>`
//! │   └── fetch.rs       # Fetch tasks and the worker loop
//! └── common/
//!     ├── mod.rs
//!     └── thread.rs      # Thread-local worker ID
//! ```
//!
//! # Example Usage
//!
//! ```ignore
//! let config = LoaderConfig::builder()
//!     .batch_size(32)
//!     .num_workers(4)
//!     .prefetch_factor(2)
//!     .build();
//!
//! let loader = BatchIterator::new(dataset, SplitSampler::new(n, Some(42)), config)?;
//!
//! for batch in loader.iterate()? {
//!     let batch: Batch = batch?;
//!     // batch.features, batch.labels
//! }
//! ```
//!
//! # Memory Usage
//! - Single-threaded: O(batch_size)
//! - Multi-threaded: O(num_workers x prefetch_factor x batch_size)
//!
//! Reduce `batch_size`, `num_workers` or `prefetch_factor` if out-of-memory.

mod common;
mod config;
mod iterator;
mod loader;
mod workers;

// Public re-exports
pub use config::{LoaderConfig, LoaderConfigBuilder};
pub use iterator::EpochIter;
pub use loader::BatchIterator;

pub use common::thread::{current_worker_id, WORKER_ID};
