use super::{check_range, ArrayRows, ElementKind};
use crate::error::{PipelineError, Result};
use std::ops::Range;
use tch::{Device, Tensor};

/// An owned, fully in-memory array produced by
/// [`ChunkedPrecisionLoader`](super::ChunkedPrecisionLoader).
///
/// The backing tensor is contiguous, lives on the CPU and is never written
/// after construction. Rows handed out by [`ArrayRows`] are views into it.
#[derive(Debug)]
pub struct MaterializedArray {
    tensor: Tensor,
    kind: ElementKind,
    shape: Vec<i64>,
}

/// Safety:
/// The wrapped tensor is only ever read after construction (`narrow`/`select`
/// create new views and never mutate the storage), so concurrent shared
/// access from fetch workers is sound. `tch::Tensor` is itself `Send`.
unsafe impl Send for MaterializedArray {}
unsafe impl Sync for MaterializedArray {}

impl MaterializedArray {
    pub(crate) fn new(tensor: Tensor) -> Result<Self> {
        let kind = ElementKind::from_kind(tensor.kind()).ok_or_else(|| {
            PipelineError::InvalidConfig(format!(
                "Unsupported tensor kind {:?} for a materialized array",
                tensor.kind()
            ))
        })?;
        if tensor.dim() == 0 {
            return Err(PipelineError::InvalidConfig(
                "Materialized array needs a sample dimension".to_string(),
            ));
        }
        let tensor = tensor.f_to_device(Device::Cpu)?.f_contiguous()?;
        let shape = tensor.size();
        Ok(Self {
            tensor,
            kind,
            shape,
        })
    }

    /// Full shape, leading sample dimension included.
    pub fn shape(&self) -> &[i64] {
        &self.shape
    }

    /// Borrows the backing tensor.
    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    pub fn into_tensor(self) -> Tensor {
        self.tensor
    }

    /// Bytes held by the backing tensor.
    pub fn nbytes(&self) -> usize {
        self.tensor.numel() * self.kind.size_in_bytes()
    }
}

impl ArrayRows for MaterializedArray {
    fn len(&self) -> usize {
        self.shape[0] as usize
    }

    fn row_shape(&self) -> &[i64] {
        &self.shape[1..]
    }

    fn element_kind(&self) -> ElementKind {
        self.kind
    }

    fn rows(&self, range: Range<usize>) -> Result<Tensor> {
        check_range(&range, self.len())?;
        Ok(self
            .tensor
            .f_narrow(0, range.start as i64, range.len() as i64)?)
    }

    fn row(&self, index: usize) -> Result<Tensor> {
        if index >= self.len() {
            return Err(PipelineError::Index {
                index,
                len: self.len(),
            });
        }
        Ok(self.tensor.f_select(0, index as i64)?)
    }
}
