use crate::array::ArrayRows;
use crate::error::{PipelineError, Result};
use crate::sample::Sample;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A `Dataset` provides random access to a fixed number of samples.
///
/// All implementations must be `Send + Sync` so a single instance can be
/// shared by every fetch worker through an `Arc`.
pub trait Dataset: Send + Sync {
    /// Total number of samples. Fixed for the lifetime of the dataset.
    fn len(&self) -> usize;

    /// Random-access lookup by index.
    ///
    /// Fails with `PipelineError::Index` for `index >= len()`.
    fn get(&self, index: usize) -> Result<Sample>;

    /// Checks if the dataset is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pairs a feature array and a label array with the same number of rows.
///
/// Both sides are shared (`Arc<dyn ArrayRows>`), so cloning the dataset only
/// bumps reference counts, and the arrays may be memory-mapped files or
/// materialized tensors interchangeably. There is no mutating operation: the
/// sample count is fixed at construction.
#[derive(Debug, Clone)]
pub struct IndexedDataset {
    features: Arc<dyn ArrayRows>,
    labels: Arc<dyn ArrayRows>,
    metadata: HashMap<String, String>,
}

impl IndexedDataset {
    /// Creates a dataset over `features` and `labels`.
    ///
    /// # Errors
    /// `SizeMismatch` if the two arrays do not have the same number of rows.
    pub fn new(features: Arc<dyn ArrayRows>, labels: Arc<dyn ArrayRows>) -> Result<Self> {
        if features.len() != labels.len() {
            return Err(PipelineError::SizeMismatch {
                features: features.len(),
                labels: labels.len(),
            });
        }
        debug!(
            samples = features.len(),
            feature_shape = ?features.row_shape(),
            feature_kind = %features.element_kind(),
            label_kind = %labels.element_kind(),
            "Built indexed dataset"
        );
        Ok(Self {
            features,
            labels,
            metadata: HashMap::new(),
        })
    }

    /// Convenience constructor taking the arrays by value.
    pub fn from_arrays(
        features: impl ArrayRows + 'static,
        labels: impl ArrayRows + 'static,
    ) -> Result<Self> {
        Self::new(Arc::new(features), Arc::new(labels))
    }

    /// Adds/updates metadata and returns the modified dataset.
    /// Enables chaining: `dataset.with_metadata("split", "train")`.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Returns the value of a metadata field, if it exists.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(|s| s.as_str())
    }

    pub fn features(&self) -> &Arc<dyn ArrayRows> {
        &self.features
    }

    pub fn labels(&self) -> &Arc<dyn ArrayRows> {
        &self.labels
    }
}

impl Dataset for IndexedDataset {
    fn len(&self) -> usize {
        self.features.len()
    }

    fn get(&self, index: usize) -> Result<Sample> {
        if index >= self.len() {
            return Err(PipelineError::Index {
                index,
                len: self.len(),
            });
        }
        Ok(Sample::new(
            self.features.row(index)?,
            self.labels.row(index)?,
        ))
    }
}

impl<D: Dataset + ?Sized> Dataset for Arc<D> {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn get(&self, index: usize) -> Result<Sample> {
        (**self).get(index)
    }
}

#[cfg(test)]
mod indexed_dataset_tests {
    use super::*;
    use crate::array::{ElementKind, MaterializedArray};
    use tch::{Device, Kind, Tensor};

    // Helper functions for creating test data
    mod test_utils {
        use super::*;

        // Creates `n` feature rows of shape [2] holding [i, i], and labels i % 3
        pub fn create_arrays(n: i64) -> (MaterializedArray, MaterializedArray) {
            let features = Tensor::arange(n, (Kind::Float, Device::Cpu))
                .unsqueeze(1)
                .repeat(&[1, 2]);
            let labels = Tensor::arange(n, (Kind::Int64, Device::Cpu)).remainder(3i64);
            (
                MaterializedArray::new(features).unwrap(),
                MaterializedArray::new(labels).unwrap(),
            )
        }
    }

    #[test]
    fn test_creation() -> anyhow::Result<()> {
        let (features, labels) = test_utils::create_arrays(5);
        let dataset = IndexedDataset::from_arrays(features, labels)?;

        assert_eq!(dataset.len(), 5);
        assert!(!dataset.is_empty());
        assert_eq!(dataset.features().element_kind(), ElementKind::F32);
        assert_eq!(dataset.labels().element_kind(), ElementKind::I64);
        Ok(())
    }

    #[test]
    fn test_get_returns_source_rows() -> anyhow::Result<()> {
        let (features, labels) = test_utils::create_arrays(5);
        let dataset = IndexedDataset::from_arrays(features, labels)?;

        for i in 0..5 {
            let sample = dataset.get(i)?;
            assert_eq!(sample.feature.size(), vec![2]);
            assert_eq!(sample.feature.double_value(&[1]), i as f64);
            assert_eq!(sample.label.int64_value(&[]), (i % 3) as i64);
        }
        assert!(matches!(
            dataset.get(5),
            Err(PipelineError::Index { index: 5, len: 5 })
        ));
        Ok(())
    }

    #[test]
    fn test_size_mismatch_is_rejected() {
        let (features, _) = test_utils::create_arrays(4);
        let (_, labels) = test_utils::create_arrays(3);
        assert!(matches!(
            IndexedDataset::from_arrays(features, labels),
            Err(PipelineError::SizeMismatch {
                features: 4,
                labels: 3
            })
        ));
    }

    #[test]
    fn test_metadata_ops() -> anyhow::Result<()> {
        let (features, labels) = test_utils::create_arrays(1);
        let dataset = IndexedDataset::from_arrays(features, labels)?.with_metadata("split", "train");

        assert_eq!(dataset.metadata("split"), Some("train"));
        assert!(dataset.metadata("missing").is_none());
        Ok(())
    }

    #[test]
    fn test_concurrent_get() -> anyhow::Result<()> {
        let (features, labels) = test_utils::create_arrays(100);
        let dataset = Arc::new(IndexedDataset::from_arrays(features, labels)?);

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let dataset = dataset.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let sample = dataset.get(i).unwrap();
                        assert_eq!(sample.label.int64_value(&[]), (i % 3) as i64);
                    }
                })
            })
            .collect();

        for t in threads {
            t.join().unwrap();
        }
        Ok(())
    }
}
