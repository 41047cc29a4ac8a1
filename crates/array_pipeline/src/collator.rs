use crate::error::{PipelineError, Result};
use crate::minibatch::Batch;
use crate::sample::Sample;
use tch::Tensor;

/// A `Collator` defines how multiple [`Sample`]s are combined into a [`Batch`].
///
/// Collators run on fetch worker threads, so they must be `Send + Sync`.
pub trait Collator: Send + Sync {
    fn collate(&self, samples: &[Sample]) -> Result<Batch>;
}

/// A `Collator` that stacks features and labels with identical shapes
/// along a new leading batch dimension. No padding is applied, so a sample
/// whose shape or element type differs from the first one is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct StackCollator;

impl StackCollator {
    fn stack(samples: &[Sample], side: &str, pick: fn(&Sample) -> &Tensor) -> Result<Tensor> {
        let tensors: Vec<&Tensor> = samples.iter().map(pick).collect();

        // Validate that tensor shapes and kinds are compatible for stacking
        let reference = tensors[0];
        let reference_shape = reference.size();
        for (i, tensor) in tensors.iter().enumerate().skip(1) {
            if tensor.size() != reference_shape || tensor.kind() != reference.kind() {
                return Err(PipelineError::ShapeMismatch {
                    context: format!(
                        "{} of sample {} in batch ({:?} vs {:?})",
                        side,
                        i,
                        tensor.kind(),
                        reference.kind()
                    ),
                    expected: reference_shape,
                    actual: tensor.size(),
                });
            }
        }

        Ok(Tensor::f_stack(&tensors, 0)?)
    }
}

impl Collator for StackCollator {
    fn collate(&self, samples: &[Sample]) -> Result<Batch> {
        if samples.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "Cannot collate empty sample list".to_string(),
            ));
        }

        Ok(Batch {
            features: Self::stack(samples, "feature", |s| &s.feature)?,
            labels: Self::stack(samples, "label", |s| &s.label)?,
        })
    }
}
