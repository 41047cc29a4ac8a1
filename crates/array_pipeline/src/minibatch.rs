use crate::collator::Collator;
use crate::error::Result;
use crate::sample::Sample;
use tch::{Cuda, Device, Tensor};

/// A group of [`Sample`]s stacked along a new leading batch dimension.
///
/// With `B` samples whose features have shape `[675, 64, 64]` and whose
/// labels are scalars, the batch holds:
/// - `features` -> shape `[B, 675, 64, 64]`
/// - `labels` -> shape `[B]`
///
/// Row `k` of both tensors comes from the `k`-th sample handed to the
/// collator.
#[derive(Debug)]
pub struct Batch {
    pub features: Tensor,
    pub labels: Tensor,
}

/// Safety:
/// Same reasoning as for [`Sample`]: two `Send` tensors, handed from the
/// worker that assembled them to the consumer and never shared mutably.
unsafe impl Send for Batch {}
unsafe impl Sync for Batch {}

impl Batch {
    /// Constructs a `Batch` by applying the given [`Collator`] to a list of
    /// individual [`Sample`]s.
    ///
    /// Example:
    /// // Stack-only default
    /// let batch = Batch::collate(samples, &StackCollator)?;
    pub fn collate(samples: &[Sample], collator: &impl Collator) -> Result<Self> {
        collator.collate(samples)
    }

    /// Number of samples in the batch.
    pub fn len(&self) -> usize {
        self.features.size().first().copied().unwrap_or(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Transfers both tensors to the target device (CPU/GPU)
    pub fn to_device(&self, device: Device) -> Self {
        Self {
            features: self.features.to_device(device),
            labels: self.labels.to_device(device),
        }
    }

    /// Copies the batch into page-locked host memory so that a later
    /// host-to-device transfer can run asynchronously.
    ///
    /// Without a CUDA runtime there is nothing to pin for and the batch is
    /// returned unchanged. Contents and shapes are the same either way.
    pub fn pin_memory(self) -> Result<Self> {
        if !Cuda::is_available() {
            return Ok(self);
        }
        Ok(Self {
            features: self.features.f_pin_memory(Device::Cuda(0))?,
            labels: self.labels.f_pin_memory(Device::Cuda(0))?,
        })
    }

    pub fn into_parts(self) -> (Tensor, Tensor) {
        (self.features, self.labels)
    }
}
