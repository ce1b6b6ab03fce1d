use std::fmt;

use half::f16;

use crate::error::{Result, TensorError};

/// Supported element types for device tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 16-bit floating point (IEEE 754 half-precision, via the `half` crate).
    F16,
    /// 32-bit floating point.
    F32,
    /// 32-bit signed integer. Storable, but not accepted by the bundled
    /// compute operators.
    I32,
}

impl DType {
    /// Size in bytes of a single element.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::F16 => 2,
            DType::F32 => 4,
            DType::I32 => 4,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F16 => write!(f, "f16"),
            DType::F32 => write!(f, "f32"),
            DType::I32 => write!(f, "i32"),
        }
    }
}

/// Encode f32 host values into the wire representation of `dtype`.
pub fn encode_f32(dtype: DType, values: &[f32]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(values.len() * dtype.size_in_bytes());
    match dtype {
        DType::F16 => {
            for &v in values {
                out.extend_from_slice(&f16::from_f32(v).to_le_bytes());
            }
        }
        DType::F32 => {
            for &v in values {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        DType::I32 => return Err(TensorError::UnsupportedDType(dtype)),
    }
    Ok(out)
}

/// Decode the wire representation of `dtype` into f32 host values.
pub fn decode_f32(dtype: DType, bytes: &[u8]) -> Result<Vec<f32>> {
    let width = dtype.size_in_bytes();
    if bytes.len() % width != 0 {
        return Err(TensorError::MisalignedBytes {
            len: bytes.len(),
            width,
        });
    }
    match dtype {
        DType::F16 => Ok(bytes
            .chunks_exact(2)
            .map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect()),
        DType::F32 => Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()),
        DType::I32 => Err(TensorError::UnsupportedDType(dtype)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_in_bytes() {
        assert_eq!(DType::F16.size_in_bytes(), 2);
        assert_eq!(DType::F32.size_in_bytes(), 4);
        assert_eq!(DType::I32.size_in_bytes(), 4);
    }

    #[test]
    fn test_f32_roundtrip() {
        let values = [0.0, -1.5, 3.25, 1e20];
        let bytes = encode_f32(DType::F32, &values).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(decode_f32(DType::F32, &bytes).unwrap(), values);
    }

    #[test]
    fn test_f16_exact_values() {
        // Small integers and halves are exactly representable in f16.
        let values = [1.0, 2.0, -0.5, 4096.0];
        let bytes = encode_f32(DType::F16, &values).unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(decode_f32(DType::F16, &bytes).unwrap(), values);
    }

    #[test]
    fn test_f16_narrowing_tolerance() {
        // Not exactly representable in f16; the round trip loses precision
        // but stays within half-precision relative error.
        let values = [0.1f32, std::f32::consts::PI, -2.718, 1234.5];
        let bytes = encode_f32(DType::F16, &values).unwrap();
        let decoded = decode_f32(DType::F16, &bytes).unwrap();
        for (got, want) in decoded.iter().zip(values.iter()) {
            approx::assert_relative_eq!(got, want, max_relative = 1e-3);
        }
    }

    #[test]
    fn test_i32_rejected() {
        assert!(encode_f32(DType::I32, &[1.0]).is_err());
        assert!(decode_f32(DType::I32, &[0u8; 4]).is_err());
    }

    #[test]
    fn test_misaligned_bytes() {
        assert!(decode_f32(DType::F32, &[0u8; 3]).is_err());
    }
}
