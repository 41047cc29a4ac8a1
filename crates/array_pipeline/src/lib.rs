//! Out-of-core loading, downcasting and parallel batching of paired
//! feature/label arrays.
//!
//! ```text
//!   .npy ──► array (mapped | materialized) ──► IndexedDataset ──┐
//!                                                               ├──► BatchIterator ──► Batch
//!                                           SplitSampler ───────┘        (workers)
//! ```
//!
//! [`pipeline::build_loaders`] wires the whole chain for a train/validation
//! pair described by a [`PipelineConfig`].

pub mod array;
pub mod collator;
pub mod config;
pub mod dataloader;
pub mod dataset;
pub mod error;
pub mod minibatch;
pub mod pipeline;
pub mod progress;
pub mod sample;
pub mod sampler;

pub use array::{
    materialize, open_mappings, ArrayRows, ChunkedPrecisionLoader, ElementKind, MaterializedArray,
    RawArrayHandle,
};
pub use collator::{Collator, StackCollator};
pub use config::{LoadMode, PipelineConfig, TaskFiles, TaskVariant};
pub use dataloader::{BatchIterator, EpochIter, LoaderConfig};
pub use dataset::{Dataset, IndexedDataset};
pub use error::{PipelineError, Result};
pub use minibatch::Batch;
pub use pipeline::{build_loaders, RunHook, Split, TrainValLoaders};
pub use progress::{BarProgress, NoProgress, ProgressSink, TracingProgress};
pub use sample::Sample;
pub use sampler::{Sampler, SequentialSampler, SplitIndices, SplitSampler};
