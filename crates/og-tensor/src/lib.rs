//! `og-tensor` - Tensor descriptors and device-resident tensors for opgraph.
//!
//! This crate provides:
//! - `DType` and `Format`, the element-type and memory-layout tags
//! - `TensorDesc`, the shape/type/layout descriptor independent of storage
//! - `Tensor`, a descriptor bound to (rebindable) device memory
//! - f32 encode/decode helpers for moving host data across dtypes

pub mod desc;
pub mod dtype;
pub mod error;
pub mod tensor;

// Re-export primary types at the crate root for convenience.
pub use desc::{Format, TensorDesc, MAX_RANK};
pub use dtype::{decode_f32, encode_f32, DType};
pub use error::{Result, TensorError};
pub use tensor::Tensor;
