//! src/array/mod.rs
//!
//! Disk-resident and in-memory numeric arrays with a leading sample dimension.
//!
//! ```text
//!   .npy file ──open──► RawArrayHandle ──(direct)──────────────────┐
//!                             │                                    │
//!                             └──ChunkedPrecisionLoader::convert──►│ MaterializedArray
//!                                                                  ↓
//!                                                        dyn ArrayRows (row access)
//! ```
//!
//! Both representations implement [`ArrayRows`], so the dataset layer does not
//! care whether a row comes out of the page cache or out of an owned tensor.

mod convert;
mod mapped;
mod materialized;

pub use convert::{blocks, materialize, ChunkedPrecisionLoader, DEFAULT_BLOCK_SIZE};
pub use mapped::{open_mappings, RawArrayHandle};
pub use materialized::MaterializedArray;

use crate::error::{PipelineError, Result};
use bytemuck::cast_slice;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use tch::{Kind, Tensor};

/// Element types understood by the pipeline.
///
/// Every variant is a valid conversion target. Only the variants that can be
/// validated straight out of an `.npy` header (everything except `F16` and
/// `BF16`) can appear as the element type of a file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Bool,
    U8,
    I8,
    I16,
    I32,
    I64,
    F16,
    BF16,
    F32,
    F64,
}

impl ElementKind {
    /// Size of one element in bytes.
    pub fn size_in_bytes(self) -> usize {
        match self {
            ElementKind::Bool | ElementKind::U8 | ElementKind::I8 => 1,
            ElementKind::I16 | ElementKind::F16 | ElementKind::BF16 => 2,
            ElementKind::I32 | ElementKind::F32 => 4,
            ElementKind::I64 | ElementKind::F64 => 8,
        }
    }

    /// The matching libtorch element kind.
    pub fn kind(self) -> Kind {
        match self {
            ElementKind::Bool => Kind::Bool,
            ElementKind::U8 => Kind::Uint8,
            ElementKind::I8 => Kind::Int8,
            ElementKind::I16 => Kind::Int16,
            ElementKind::I32 => Kind::Int,
            ElementKind::I64 => Kind::Int64,
            ElementKind::F16 => Kind::Half,
            ElementKind::BF16 => Kind::BFloat16,
            ElementKind::F32 => Kind::Float,
            ElementKind::F64 => Kind::Double,
        }
    }

    /// Maps a libtorch kind back, if the pipeline supports it.
    pub fn from_kind(kind: Kind) -> Option<Self> {
        match kind {
            Kind::Bool => Some(ElementKind::Bool),
            Kind::Uint8 => Some(ElementKind::U8),
            Kind::Int8 => Some(ElementKind::I8),
            Kind::Int16 => Some(ElementKind::I16),
            Kind::Int => Some(ElementKind::I32),
            Kind::Int64 => Some(ElementKind::I64),
            Kind::Half => Some(ElementKind::F16),
            Kind::BFloat16 => Some(ElementKind::BF16),
            Kind::Float => Some(ElementKind::F32),
            Kind::Double => Some(ElementKind::F64),
            _ => None,
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementKind::Bool => "bool",
            ElementKind::U8 => "u8",
            ElementKind::I8 => "i8",
            ElementKind::I16 => "i16",
            ElementKind::I32 => "i32",
            ElementKind::I64 => "i64",
            ElementKind::F16 => "f16",
            ElementKind::BF16 => "bf16",
            ElementKind::F32 => "f32",
            ElementKind::F64 => "f64",
        };
        f.write_str(name)
    }
}

/// Read-only, random row access over an array whose first dimension is the
/// sample dimension.
///
/// Implementations must be `Send + Sync`: fetch workers share one instance
/// through an `Arc` and read from it concurrently without locking.
pub trait ArrayRows: Send + Sync + fmt::Debug {
    /// Number of rows (samples).
    fn len(&self) -> usize;

    /// Shape of one row, i.e. the full shape without the leading dimension.
    fn row_shape(&self) -> &[i64];

    /// Element type of the rows returned by [`rows`](Self::rows).
    fn element_kind(&self) -> ElementKind;

    /// Returns rows `range` as a tensor of shape `[range.len(), row_shape..]`.
    fn rows(&self, range: Range<usize>) -> Result<Tensor>;

    /// Returns row `index` as a tensor of shape `row_shape`.
    fn row(&self, index: usize) -> Result<Tensor>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Validates `range` against `len`, reporting the first offending index.
pub(crate) fn check_range(range: &Range<usize>, len: usize) -> Result<()> {
    if range.start > range.end {
        return Err(PipelineError::InvalidConfig(format!(
            "Row range {}..{} is reversed",
            range.start, range.end
        )));
    }
    if range.end > len {
        return Err(PipelineError::Index {
            index: range.end - 1,
            len,
        });
    }
    Ok(())
}

/// Builds a tensor of `kind` and `shape` from raw little-endian element bytes.
///
/// `raw` must be aligned for `kind`; mapped arrays guarantee this because the
/// `.npy` header is padded so the payload starts on an aligned offset.
pub(crate) fn tensor_from_bytes(raw: &[u8], kind: ElementKind, shape: &[i64]) -> Result<Tensor> {
    let tensor = match kind {
        ElementKind::Bool => Tensor::from_slice(raw).f_to_kind(Kind::Bool)?,
        ElementKind::U8 => Tensor::from_slice(raw),
        ElementKind::I8 => Tensor::from_slice(cast_slice::<u8, i8>(raw)),
        ElementKind::I16 => Tensor::from_slice(cast_slice::<u8, i16>(raw)),
        ElementKind::I32 => Tensor::from_slice(cast_slice::<u8, i32>(raw)),
        ElementKind::I64 => Tensor::from_slice(cast_slice::<u8, i64>(raw)),
        ElementKind::F32 => Tensor::from_slice(cast_slice::<u8, f32>(raw)),
        ElementKind::F64 => Tensor::from_slice(cast_slice::<u8, f64>(raw)),
        ElementKind::F16 | ElementKind::BF16 => {
            return Err(PipelineError::InvalidConfig(format!(
                "{} rows cannot be decoded from raw bytes",
                kind
            )))
        }
    };
    Ok(tensor.f_reshape(shape)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_libtorch() {
        for kind in [
            ElementKind::Bool,
            ElementKind::U8,
            ElementKind::I8,
            ElementKind::I16,
            ElementKind::I32,
            ElementKind::I64,
            ElementKind::F16,
            ElementKind::BF16,
            ElementKind::F32,
            ElementKind::F64,
        ] {
            assert_eq!(ElementKind::from_kind(kind.kind()), Some(kind));
        }
        assert_eq!(ElementKind::from_kind(Kind::ComplexFloat), None);
    }

    #[test]
    fn element_sizes() {
        assert_eq!(ElementKind::F16.size_in_bytes(), 2);
        assert_eq!(ElementKind::F32.size_in_bytes(), 4);
        assert_eq!(ElementKind::I64.size_in_bytes(), 8);
        assert_eq!(ElementKind::Bool.size_in_bytes(), 1);
    }

    #[test]
    fn tensor_from_bytes_reshapes() -> anyhow::Result<()> {
        let values = [1.5f32, -2.0, 3.25, 4.0, 0.0, 8.0];
        let raw: &[u8] = cast_slice(&values);
        let t = tensor_from_bytes(raw, ElementKind::F32, &[2, 3])?;
        assert_eq!(t.size(), vec![2, 3]);
        assert_eq!(t.kind(), Kind::Float);
        assert_eq!(t.double_value(&[1, 2]), 8.0);
        assert!(tensor_from_bytes(raw, ElementKind::F16, &[2, 3]).is_err());
        Ok(())
    }

    #[test]
    fn range_checks() {
        assert!(check_range(&(0..4), 4).is_ok());
        assert!(check_range(&(4..4), 4).is_ok());
        assert!(matches!(
            check_range(&(2..5), 4),
            Err(PipelineError::Index { index: 4, len: 4 })
        ));
    }

    #[test]
    fn kind_deserializes_lowercase() -> anyhow::Result<()> {
        let kind: ElementKind = serde_json::from_str("\"f16\"")?;
        assert_eq!(kind, ElementKind::F16);
        assert_eq!(kind.to_string(), "f16");
        Ok(())
    }
}
