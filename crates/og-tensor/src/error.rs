use thiserror::Error;

use crate::dtype::DType;

#[derive(Error, Debug)]
pub enum TensorError {
    #[error("rank {rank} exceeds the maximum of {max}")]
    RankExceeded { rank: usize, max: usize },
    #[error("host data has {got} elements but descriptor implies {expected}")]
    HostDataSize { expected: usize, got: usize },
    #[error("cannot bind: tensor needs {needed} bytes but pointer addresses {capacity}")]
    BindTooSmall { needed: usize, capacity: usize },
    #[error("tensor is not bound to device memory")]
    Unbound,
    #[error("unsupported dtype for f32 conversion: {0}")]
    UnsupportedDType(DType),
    #[error("byte data of length {len} is not a multiple of {width}-byte elements")]
    MisalignedBytes { len: usize, width: usize },
    #[error("device error: {0}")]
    Device(#[from] og_device::DeviceError),
}

pub type Result<T> = std::result::Result<T, TensorError>;
