use og_device::{DevicePtr, Stream};
use og_graph::Session;
use og_tensor::{DType, TensorDesc};

/// Status codes returned by all FFI functions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OgStatus {
    Ok = 0,
    ErrorInvalidArgument = 1,
    ErrorTopology = 2,
    ErrorSetup = 3,
    ErrorExecute = 4,
    ErrorOutOfMemory = 5,
    ErrorInternal = 6,
}

/// Element type selector.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OgDType {
    F16 = 0,
    F32 = 1,
    I32 = 2,
}

impl OgDType {
    pub(crate) fn to_dtype(self) -> DType {
        match self {
            OgDType::F16 => DType::F16,
            OgDType::F32 => DType::F32,
            OgDType::I32 => DType::I32,
        }
    }
}

/// Opaque handle to a device buffer.
pub struct OgBuffer {
    pub(crate) ptr: DevicePtr,
}

/// Opaque handle to an execution stream.
pub struct OgStream {
    pub(crate) stream: Stream,
}

/// Opaque handle to a graph session.
///
/// Holds the session plus the external descriptors its buffers must match,
/// in binding order: inputs first, then outputs.
pub struct OgSession {
    pub(crate) session: Session,
    pub(crate) input_descs: Vec<TensorDesc>,
    pub(crate) output_descs: Vec<TensorDesc>,
}
