//! Error types for the array pipeline.
//!
//! Loading, conversion, dataset access and batch assembly all report
//! through [`PipelineError`]. Nothing is retried internally: transient I/O
//! failures surface to the caller unchanged.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Primary error type for all pipeline operations
#[derive(Debug, Error)]
pub enum PipelineError {
    // ========== Loading Errors ==========
    /// File missing, unreadable, truncated or with a malformed header
    #[error("Failed to load array from {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    /// Source or output shape disagrees with what was declared or expected
    #[error("Shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: String,
        expected: Vec<i64>,
        actual: Vec<i64>,
    },

    // ========== Dataset Errors ==========
    /// Paired arrays disagree on their number of samples
    #[error("Sample count mismatch: features have {features}, labels have {labels}")]
    SizeMismatch { features: usize, labels: usize },

    /// Out-of-range sample access
    #[error("Index {index} out of range for {len} samples")]
    Index { index: usize, len: usize },

    // ========== Configuration Errors ==========
    /// Configuration references a task this pipeline does not know
    #[error("Unknown task variant '{0}' (supported: hela, level)")]
    UnknownTaskVariant(String),

    /// Invalid parameter value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ========== Worker Errors ==========
    /// A fetch worker failed while assembling a batch
    #[error("Worker {worker} failed to assemble batch {batch}")]
    Fetch {
        batch: usize,
        worker: usize,
        #[source]
        source: Box<PipelineError>,
    },

    /// A fetch worker panicked while assembling a batch
    #[error("Worker {worker} panicked while assembling batch {batch}: {message}")]
    WorkerPanicked {
        batch: usize,
        worker: usize,
        message: String,
    },

    /// No batch arrived within the configured timeout
    #[error("No batch received after {timeout:?} ({pending} batches in flight)")]
    WorkerTimeout { timeout: Duration, pending: usize },

    /// The operating system refused to start a fetch worker thread
    #[error("Failed to spawn worker thread {worker}")]
    WorkerSpawn {
        worker: usize,
        #[source]
        source: std::io::Error,
    },

    /// All workers exited while batches were still outstanding
    #[error("Worker channel disconnected with {pending} batches in flight")]
    WorkersDisconnected { pending: usize },

    // ========== Wrapped Errors ==========
    #[error("Tensor operation failed: {0}")]
    Tensor(#[from] tch::TchError),

    #[error("Invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub(crate) fn load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        PipelineError::Load {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns the innermost error, looking through `Fetch` wrappers.
    pub fn root(&self) -> &PipelineError {
        match self {
            PipelineError::Fetch { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns true if the error came from a fetch worker rather than
    /// from configuration or loading.
    pub fn is_worker_failure(&self) -> bool {
        matches!(
            self,
            PipelineError::Fetch { .. }
                | PipelineError::WorkerPanicked { .. }
                | PipelineError::WorkerSpawn { .. }
                | PipelineError::WorkerTimeout { .. }
                | PipelineError::WorkersDisconnected { .. }
        )
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
