use std::fmt;

use crate::dtype::DType;
use crate::error::{Result, TensorError};

/// Maximum tensor rank accepted by a descriptor.
pub const MAX_RANK: usize = 8;

/// Memory-layout tag for a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Dense row-major layout.
    Nd,
    /// Blocked layout used by some accelerator kernels. Accepted in
    /// descriptors but rejected by the bundled operators.
    Nz,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Nd => write!(f, "nd"),
            Format::Nz => write!(f, "nz"),
        }
    }
}

/// Describes shape, element type, and memory layout of one buffer,
/// independent of where the data lives.
///
/// Immutable once constructed; rebinding a tensor's device pointer never
/// changes its descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorDesc {
    dtype: DType,
    format: Format,
    dims: Vec<usize>,
}

impl TensorDesc {
    pub fn new(dtype: DType, format: Format, dims: &[usize]) -> Result<Self> {
        if dims.len() > MAX_RANK {
            return Err(TensorError::RankExceeded {
                rank: dims.len(),
                max: MAX_RANK,
            });
        }
        Ok(TensorDesc {
            dtype,
            format,
            dims: dims.to_vec(),
        })
    }

    /// Dense row-major descriptor, the common case.
    pub fn nd(dtype: DType, dims: &[usize]) -> Result<Self> {
        Self::new(dtype, Format::Nd, dims)
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Number of dimensions (rank).
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Size of dimension `i`.
    ///
    /// # Panics
    /// Panics if `i >= ndim()`.
    pub fn dim(&self, i: usize) -> usize {
        self.dims[i]
    }

    /// Total number of elements (product of all dimension sizes).
    pub fn elem_count(&self) -> usize {
        self.dims.iter().product()
    }

    /// Total byte size: element count times element width.
    pub fn byte_size(&self) -> usize {
        self.elem_count() * self.dtype.size_in_bytes()
    }
}

impl fmt::Display for TensorDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}[", self.dtype, self.format)?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_desc() {
        let d = TensorDesc::nd(DType::F16, &[2, 3, 4]).unwrap();
        assert_eq!(d.ndim(), 3);
        assert_eq!(d.dim(1), 3);
        assert_eq!(d.elem_count(), 24);
        assert_eq!(d.byte_size(), 48);
        assert_eq!(d.format(), Format::Nd);
    }

    #[test]
    fn test_scalar_desc() {
        let d = TensorDesc::nd(DType::F32, &[]).unwrap();
        assert_eq!(d.ndim(), 0);
        assert_eq!(d.elem_count(), 1); // product of empty = 1
        assert_eq!(d.byte_size(), 4);
    }

    #[test]
    fn test_rank_limit() {
        let dims = [1usize; MAX_RANK + 1];
        assert!(TensorDesc::nd(DType::F32, &dims).is_err());
        assert!(TensorDesc::nd(DType::F32, &dims[..MAX_RANK]).is_ok());
    }

    #[test]
    fn test_display() {
        let d = TensorDesc::nd(DType::F32, &[1, 4096]).unwrap();
        assert_eq!(d.to_string(), "f32/nd[1, 4096]");
    }
}
