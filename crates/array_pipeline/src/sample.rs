use tch::Tensor;

/// One `(feature, label)` pair read from an [`IndexedDataset`](crate::dataset::IndexedDataset).
///
/// Both tensors keep the element type of their source array, so a
/// memory-mapped `f32` feature file yields `Kind::Float` features and an
/// `i64` label file yields `Kind::Int64` labels.
#[derive(Debug)]
pub struct Sample {
    pub feature: Tensor,
    pub label: Tensor,
}

/// Creates a shallow clone of the `Sample`
impl Clone for Sample {
    fn clone(&self) -> Self {
        Self {
            feature: self.feature.shallow_clone(),
            label: self.label.shallow_clone(),
        }
    }
}

/// Safety:
/// The `unsafe impl` here indicates we manually verified thread-safety conditions.
///
/// - `tch::Tensor` is marked `Send` in its source, and a `Sample` is two of them.
/// - Samples are never mutated after construction; all access goes through
///   shared references, which only read the underlying storage.
unsafe impl Send for Sample {}
unsafe impl Sync for Sample {}

impl Sample {
    pub fn new(feature: Tensor, label: Tensor) -> Self {
        Self { feature, label }
    }

    /// Splits the sample into `(feature, label)`.
    pub fn into_parts(self) -> (Tensor, Tensor) {
        (self.feature, self.label)
    }
}
