//! Memory-mapped, read-only `.npy` arrays.

use super::{check_range, tensor_from_bytes, ArrayRows, ElementKind};
use crate::error::{PipelineError, Result};
use memmap2::Mmap;
use ndarray::ArrayViewD;
use ndarray_npy::ViewNpyExt;
use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tch::Tensor;
use tracing::{debug, trace};

/// Number of `RawArrayHandle` mappings currently alive in this process.
static OPEN_MAPPINGS: AtomicUsize = AtomicUsize::new(0);

/// Returns how many array files are currently mapped by this process.
///
/// Every successful [`RawArrayHandle::open`] increments the count and every
/// drop decrements it, so a pipeline that has been torn down (including after
/// an error) leaves it where it started.
pub fn open_mappings() -> usize {
    OPEN_MAPPINGS.load(Ordering::SeqCst)
}

/// A read-only memory mapping over a C-ordered `.npy` file.
///
/// Opening validates the header, the payload length and the payload alignment
/// but copies nothing: rows are paged in by the OS on first access and copied
/// out only when requested. The mapping is released exactly once, when the
/// handle is dropped.
#[derive(Debug)]
pub struct RawArrayHandle {
    path: PathBuf,
    mmap: Mmap,
    kind: ElementKind,
    shape: Vec<i64>,
    data_offset: usize,
    row_bytes: usize,
}

impl RawArrayHandle {
    /// Maps `path` and parses its header.
    ///
    /// # Errors
    /// `PipelineError::Load` if the file is missing or unreadable, the header
    /// is malformed, the payload is truncated or misaligned, the array is
    /// Fortran-ordered or zero-dimensional, or the dtype is unsupported.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| PipelineError::load(path, e))?;

        // Safety: the mapping is read-only. Truncating the file from another
        // process while it is mapped is outside of what this type supports.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| PipelineError::load(path, e))?;

        let header = probe_header(&mmap).map_err(|reason| PipelineError::load(path, reason))?;
        if !header.standard_layout {
            return Err(PipelineError::load(
                path,
                "Fortran-ordered arrays are not supported; re-save in C order",
            ));
        }
        if header.shape.is_empty() {
            return Err(PipelineError::load(
                path,
                "zero-dimensional array has no sample dimension",
            ));
        }

        let element_count: usize = header.shape.iter().product();
        let data_bytes = element_count * header.kind.size_in_bytes();
        let data_offset = mmap.len() - data_bytes;
        let row_bytes = header.shape[1..].iter().product::<usize>() * header.kind.size_in_bytes();
        let shape: Vec<i64> = header.shape.iter().map(|&d| d as i64).collect();

        OPEN_MAPPINGS.fetch_add(1, Ordering::SeqCst);
        debug!(
            path = %path.display(),
            kind = %header.kind,
            shape = ?shape,
            "Mapped array file"
        );

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            kind: header.kind,
            shape,
            data_offset,
            row_bytes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Full shape, leading sample dimension included.
    pub fn shape(&self) -> &[i64] {
        &self.shape
    }

    /// Size in bytes of the array payload (header excluded).
    pub fn payload_bytes(&self) -> usize {
        self.mmap.len() - self.data_offset
    }

    /// Hints the kernel that the mapping will be read front to back.
    pub(crate) fn advise_sequential(&self) {
        #[cfg(unix)]
        if let Err(e) = self.mmap.advise(memmap2::Advice::Sequential) {
            debug!(path = %self.path.display(), "madvise(SEQUENTIAL) failed: {}", e);
        }
    }
}

impl ArrayRows for RawArrayHandle {
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
        let start = self.data_offset + range.start * self.row_bytes;
        let end = self.data_offset + range.end * self.row_bytes;

        let mut shape = Vec::with_capacity(self.shape.len());
        shape.push(range.len() as i64);
        shape.extend_from_slice(self.row_shape());
        tensor_from_bytes(&self.mmap[start..end], self.kind, &shape)
    }

    fn row(&self, index: usize) -> Result<Tensor> {
        if index >= self.len() {
            return Err(PipelineError::Index {
                index,
                len: self.len(),
            });
        }
        let start = self.data_offset + index * self.row_bytes;
        tensor_from_bytes(
            &self.mmap[start..start + self.row_bytes],
            self.kind,
            self.row_shape(),
        )
    }
}

impl Drop for RawArrayHandle {
    fn drop(&mut self) {
        OPEN_MAPPINGS.fetch_sub(1, Ordering::SeqCst);
        trace!(path = %self.path.display(), "Unmapped array file");
    }
}

struct Header {
    kind: ElementKind,
    shape: Vec<usize>,
    standard_layout: bool,
}

/// Finds the element type of an `.npy` buffer by asking `ndarray-npy` to view
/// it as each supported type in turn. A successful view also proves that the
/// payload length and alignment are valid.
fn probe_header(bytes: &[u8]) -> std::result::Result<Header, String> {
    macro_rules! probe {
        ($($ty:ty => $kind:expr),+ $(,)?) => {{
            let mut first_error: Option<String> = None;
            $(
                match ArrayViewD::<$ty>::view_npy(bytes) {
                    Ok(view) => {
                        return Ok(Header {
                            kind: $kind,
                            shape: view.shape().to_vec(),
                            standard_layout: view.is_standard_layout(),
                        })
                    }
                    Err(e) => {
                        first_error.get_or_insert_with(|| e.to_string());
                    }
                }
            )+
            first_error
        }};
    }

    // f32 first: it is the common case, and its error is the one reported
    // for a truncated or corrupt float file.
    let error = probe!(
        f32 => ElementKind::F32,
        f64 => ElementKind::F64,
        i64 => ElementKind::I64,
        i32 => ElementKind::I32,
        i16 => ElementKind::I16,
        i8 => ElementKind::I8,
        u8 => ElementKind::U8,
        bool => ElementKind::Bool,
    );
    Err(format!(
        "unsupported element type or malformed .npy data ({})",
        error.unwrap_or_default()
    ))
}
