use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("device allocation of {bytes} bytes failed")]
    AllocationFailure { bytes: usize },
    #[error("copy of {len} bytes at offset {offset} exceeds allocation of {capacity} bytes")]
    CopyOutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },
    #[error("kernel failed: {0}")]
    Kernel(String),
}

pub type Result<T> = std::result::Result<T, DeviceError>;
