//! Block-wise precision conversion of mapped arrays.
//!
//! Converting a multi-gigabyte float64 file to float32 by casting the whole
//! mapped view at once needs the source pages, a full-size source copy and
//! the output resident together. Converting block by block keeps the
//! transient working set at `block_size` rows on top of the output:
//!
//! ```text
//!   mapped source:  [ b0 | b1 | b2 | ... | b(k-1) ]   (page cache, read-only)
//!                     │    │
//!                     ▼    ▼   copy rows, cast, write
//!   output tensor:  [ b0 | b1 | ... ]                 (allocated once, target kind)
//! ```

use super::mapped::RawArrayHandle;
use super::materialized::MaterializedArray;
use super::{ArrayRows, ElementKind};
use crate::error::{PipelineError, Result};
use crate::progress::{BlockProgress, ProgressSink};
use std::ops::Range;
use std::path::Path;
use tch::{Device, Tensor};
use tracing::{debug, info};

/// Default number of rows converted per block.
///
/// Rows in the target workloads are large (multi-channel images), so a
/// small block already amortises the per-block overhead.
pub const DEFAULT_BLOCK_SIZE: usize = 64;

/// Partitions `[0, len)` into contiguous, non-overlapping ranges of
/// `block_size` rows; the last range is shorter when `len` is not a multiple.
///
/// ```
/// # use array_pipeline::array::blocks;
/// let ranges: Vec<_> = blocks(5, 2).unwrap().collect();
/// assert_eq!(ranges, vec![0..2, 2..4, 4..5]);
/// ```
pub fn blocks(len: usize, block_size: usize) -> Result<impl Iterator<Item = Range<usize>>> {
    if block_size == 0 {
        return Err(PipelineError::InvalidConfig(
            "Block size must be greater than 0".to_string(),
        ));
    }
    Ok((0..len)
        .step_by(block_size)
        .map(move |start| start..(start + block_size).min(len)))
}

/// Converts a [`RawArrayHandle`] into a [`MaterializedArray`] of another
/// element type, one block of rows at a time.
///
/// # Example
/// ```ignore
/// let handle = RawArrayHandle::open("train_x.npy")?;
/// let array = ChunkedPrecisionLoader::new(ElementKind::F16)
///     .block_size(32)
///     .expect_row_shape(&[675, 64, 64])
///     .convert(handle, &mut TracingProgress::new("train_x"))?;
/// ```
#[derive(Debug, Clone)]
pub struct ChunkedPrecisionLoader {
    target: ElementKind,
    block_size: usize,
    expected_row_shape: Option<Vec<i64>>,
}

impl ChunkedPrecisionLoader {
    pub fn new(target: ElementKind) -> Self {
        Self {
            target,
            block_size: DEFAULT_BLOCK_SIZE,
            expected_row_shape: None,
        }
    }

    /// Rows per block. Smaller lowers peak transient memory and raises
    /// per-block overhead.
    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Declares the shape every row must have. A source with a different row
    /// shape is rejected with `ShapeMismatch` before anything is allocated.
    pub fn expect_row_shape(mut self, row_shape: &[i64]) -> Self {
        self.expected_row_shape = Some(row_shape.to_vec());
        self
    }

    pub fn target(&self) -> ElementKind {
        self.target
    }

    /// Converts `handle`, reporting each finished block to `sink`.
    ///
    /// Takes the handle by value: the mapping is released when this call
    /// returns, whether it succeeded or not.
    ///
    /// # Errors
    /// - `InvalidConfig` if `block_size` is 0
    /// - `ShapeMismatch` if the source row shape differs from the declared one,
    ///   or the output shape differs from the source
    /// - `Load`/`Tensor` if reading or casting a block fails
    pub fn convert(
        &self,
        handle: RawArrayHandle,
        sink: &mut dyn ProgressSink,
    ) -> Result<MaterializedArray> {
        let ranges = blocks(handle.len(), self.block_size)?;

        if let Some(expected) = &self.expected_row_shape {
            if expected.as_slice() != handle.row_shape() {
                return Err(PipelineError::ShapeMismatch {
                    context: format!("rows of {}", handle.path().display()),
                    expected: expected.clone(),
                    actual: handle.row_shape().to_vec(),
                });
            }
        }

        let len = handle.len();
        let total_blocks = len.div_ceil(self.block_size);
        debug!(
            path = %handle.path().display(),
            from = %handle.element_kind(),
            to = %self.target,
            rows = len,
            block_size = self.block_size,
            total_blocks,
            "Starting block-wise conversion"
        );

        handle.advise_sequential();
        let mut output = Tensor::f_empty(handle.shape(), (self.target.kind(), Device::Cpu))?;

        sink.begin(total_blocks, len);
        for (block_index, range) in ranges.enumerate() {
            let source = handle.rows(range.clone())?;
            let mut destination = output.f_narrow(0, range.start as i64, range.len() as i64)?;
            destination.f_copy_(&source.f_to_kind(self.target.kind())?)?;

            sink.block_done(&BlockProgress {
                block_index,
                rows: range,
                blocks_done: block_index + 1,
                total_blocks,
            });
        }
        sink.finish();

        let materialized = MaterializedArray::new(output)?;
        if materialized.shape() != handle.shape() {
            return Err(PipelineError::ShapeMismatch {
                context: format!("conversion of {}", handle.path().display()),
                expected: handle.shape().to_vec(),
                actual: materialized.shape().to_vec(),
            });
        }

        info!(
            path = %handle.path().display(),
            kind = %self.target,
            bytes = materialized.nbytes(),
            "Materialized array"
        );
        Ok(materialized)
    }
}

/// Opens `path` and converts it in one step.
pub fn materialize(
    path: impl AsRef<Path>,
    target: ElementKind,
    block_size: usize,
    sink: &mut dyn ProgressSink,
) -> Result<MaterializedArray> {
    let handle = RawArrayHandle::open(path)?;
    ChunkedPrecisionLoader::new(target)
        .block_size(block_size)
        .convert(handle, sink)
}
