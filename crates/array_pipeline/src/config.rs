//! Pipeline configuration: which task, which files, how to load them.
//!
//! ```json
//! {
//!   "task": "hela",
//!   "level": 4,
//!   "batch_size": 32,
//!   "num_workers": 4,
//!   "pin_memory": true,
//!   "seed": 42,
//!   "data_dir": "/data/ctc",
//!   "load_mode": { "mode": "materialize", "features": "f16", "block_size": 64 }
//! }
//! ```

use crate::array::{ElementKind, DEFAULT_BLOCK_SIZE};
use crate::dataloader::LoaderConfig;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Dataset variants the pipeline knows how to locate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TaskVariant {
    /// Nucleus segmentation on HeLa cells, labels quantized to `bits` bits
    Hela,
    /// Intensity-level classification with `level` classes
    Level,
}

impl FromStr for TaskVariant {
    type Err = PipelineError;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hela" => Ok(TaskVariant::Hela),
            "level" => Ok(TaskVariant::Level),
            _ => Err(PipelineError::UnknownTaskVariant(s.to_string())),
        }
    }
}

impl TryFrom<String> for TaskVariant {
    type Error = PipelineError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<TaskVariant> for String {
    fn from(task: TaskVariant) -> Self {
        task.to_string()
    }
}

impl fmt::Display for TaskVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskVariant::Hela => f.write_str("hela"),
            TaskVariant::Level => f.write_str("level"),
        }
    }
}

/// How the four arrays are brought into the pipeline.
///
/// There is no rule tying a mode to a task: mapping avoids the up-front
/// read and keeps the source dtype, materializing pays one sequential pass
/// for in-memory random access at the chosen precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LoadMode {
    /// Read rows straight out of read-only memory maps
    #[default]
    Mapped,
    /// Convert each array block-wise into an owned tensor
    Materialize {
        #[serde(default = "default_kind")]
        features: ElementKind,
        #[serde(default = "default_kind")]
        labels: ElementKind,
        #[serde(default = "default_block_size")]
        block_size: usize,
    },
}

fn default_kind() -> ElementKind {
    ElementKind::F32
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

fn default_prefetch_factor() -> usize {
    2
}

fn default_num_workers() -> usize {
    1
}

/// Everything needed to build the train and validation loaders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub task: TaskVariant,
    /// Number of classes; a power of two. Label files are named after
    /// `level` or after `bits = log2(level)` depending on the task.
    pub level: u32,
    pub batch_size: usize,
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    #[serde(default)]
    pub pin_memory: bool,
    #[serde(default = "default_prefetch_factor")]
    pub prefetch_factor: usize,
    /// Seconds to wait for the next worker batch before failing with
    /// `WorkerTimeout`. `None` keeps the loader default of 30 s.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Base seed for the samplers. `None` draws from OS entropy every epoch.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub load_mode: LoadMode,
    /// Directory holding the four array files.
    #[serde(default)]
    pub data_dir: PathBuf,
}

impl PipelineConfig {
    pub fn new(task: TaskVariant, level: u32, batch_size: usize) -> Self {
        Self {
            task,
            level,
            batch_size,
            num_workers: default_num_workers(),
            pin_memory: false,
            prefetch_factor: default_prefetch_factor(),
            timeout_secs: None,
            seed: None,
            load_mode: LoadMode::default(),
            data_dir: PathBuf::new(),
        }
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| PipelineError::load(path, e))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.level < 2 || !self.level.is_power_of_two() {
            return Err(PipelineError::InvalidConfig(format!(
                "level must be a power of two >= 2, got {}",
                self.level
            )));
        }
        if self.timeout_secs == Some(0) {
            return Err(PipelineError::InvalidConfig(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }
        if let LoadMode::Materialize { block_size: 0, .. } = self.load_mode {
            return Err(PipelineError::InvalidConfig(
                "Block size must be greater than 0".to_string(),
            ));
        }
        self.loader_config().validate()
    }

    /// Quantization bits, `log2(level)`.
    pub fn bits(&self) -> u32 {
        self.level.trailing_zeros()
    }

    /// Batch settings shared by the train and validation loaders.
    pub fn loader_config(&self) -> LoaderConfig {
        let mut builder = LoaderConfig::builder()
            .batch_size(self.batch_size)
            .num_workers(self.num_workers)
            .prefetch_factor(self.prefetch_factor)
            .pin_memory(self.pin_memory);
        if let Some(secs) = self.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        builder.build()
    }

    /// The four files for this task under `data_dir`.
    pub fn task_files(&self) -> TaskFiles {
        TaskFiles::resolve(&self.data_dir, self.task, self.level)
    }
}

/// Paths of the four arrays a task reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFiles {
    pub train_features: PathBuf,
    pub train_labels: PathBuf,
    pub val_features: PathBuf,
    pub val_labels: PathBuf,
}

impl TaskFiles {
    /// Derives the file names for `task` at `level` under `data_dir`.
    ///
    /// - `hela`: `train_x_norm.npy`, `new_nuc_train_kb{bits}.npy`,
    ///   `val_x_norm.npy`, `new_nuc_val_kb{bits}.npy`
    /// - `level`: `train_x1_norm.npy`, `train_level_{level}_y1.npy`,
    ///   `val_x1_norm.npy`, `val_level_{level}_y1.npy`
    pub fn resolve(data_dir: impl AsRef<Path>, task: TaskVariant, level: u32) -> Self {
        let dir = data_dir.as_ref();
        match task {
            TaskVariant::Hela => {
                let bits = level.trailing_zeros();
                Self {
                    train_features: dir.join("train_x_norm.npy"),
                    train_labels: dir.join(format!("new_nuc_train_kb{}.npy", bits)),
                    val_features: dir.join("val_x_norm.npy"),
                    val_labels: dir.join(format!("new_nuc_val_kb{}.npy", bits)),
                }
            }
            TaskVariant::Level => Self {
                train_features: dir.join("train_x1_norm.npy"),
                train_labels: dir.join(format!("train_level_{}_y1.npy", level)),
                val_features: dir.join("val_x1_norm.npy"),
                val_labels: dir.join(format!("val_level_{}_y1.npy", level)),
            },
        }
    }
}
