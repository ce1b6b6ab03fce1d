pub mod elewise;
pub mod matmul;

use std::fmt::Debug;

use og_device::{Context, DeviceError, DevicePtr};
use og_tensor::{DType, Format, Tensor, TensorDesc};

use crate::error::OpError;

pub use elewise::{Elewise, ElewiseKind, ElewiseParam};
pub use matmul::{MatMul, MatMulParam};

/// The scratch region handed to an execute call.
///
/// Every node in a graph receives the same region; its content does not
/// survive from one node to the next. An operator must not touch more than
/// the byte count it reported at setup.
#[derive(Debug, Clone, Copy)]
pub struct Scratch<'a> {
    ptr: Option<&'a DevicePtr>,
    bytes: usize,
}

impl<'a> Scratch<'a> {
    /// No scratch memory at all, for zero-requirement calls.
    pub fn empty() -> Scratch<'static> {
        Scratch {
            ptr: None,
            bytes: 0,
        }
    }

    pub fn new(ptr: &'a DevicePtr, bytes: usize) -> Scratch<'a> {
        Scratch {
            ptr: Some(ptr),
            bytes,
        }
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn ptr(&self) -> Option<&'a DevicePtr> {
        self.ptr
    }

    /// Claim `needed` bytes of the region, failing if the budget does not
    /// cover them. Returns `None` for a zero-byte claim.
    pub fn claim(&self, needed: usize) -> Result<Option<DevicePtr>, OpError> {
        if needed == 0 {
            return Ok(None);
        }
        match self.ptr {
            Some(ptr) if needed <= self.bytes => Ok(Some(ptr.clone())),
            _ => Err(OpError::ScratchTooSmall {
                needed,
                available: self.bytes,
            }),
        }
    }
}

/// An opaque, pre-configured computational unit.
///
/// The contract is two-phase: `setup` validates descriptors and reports the
/// scratch bytes the computation needs; `execute` enqueues the computation
/// on the context's stream using a caller-provided scratch region. Execute
/// does not block; results are observable only after the context is
/// synchronized. A graph implements this trait too, so operators compose.
pub trait Operator: Debug + Send {
    fn name(&self) -> &str;

    /// Number of input tensors the operator consumes.
    fn input_count(&self) -> usize;

    /// Number of output tensors the operator produces.
    fn output_count(&self) -> usize;

    /// Output descriptors implied by the given input descriptors.
    fn infer_outputs(&self, inputs: &[TensorDesc]) -> Result<Vec<TensorDesc>, OpError>;

    /// Validate shape/type compatibility and report required scratch bytes.
    fn setup(&mut self, inputs: &[TensorDesc], outputs: &[TensorDesc]) -> Result<usize, OpError>;

    /// Enqueue the computation. Input and output device pointers are read
    /// and written by the enqueued job but never retained past it.
    fn execute(
        &self,
        inputs: &[&Tensor],
        outputs: &[&Tensor],
        scratch: Scratch<'_>,
        ctx: &Context,
    ) -> Result<(), OpError>;
}

/// Operator parameters, one variant per concrete operator.
#[derive(Debug, Clone, Copy)]
pub enum OpParam {
    MatMul(MatMulParam),
    Elewise(ElewiseParam),
}

/// Build an operator from its parameters.
pub fn create_operator(param: OpParam) -> Box<dyn Operator> {
    match param {
        OpParam::MatMul(p) => Box::new(MatMul::new(p)),
        OpParam::Elewise(p) => Box::new(Elewise::new(p)),
    }
}

pub(crate) fn check_arity(what: &'static str, expected: usize, got: usize) -> Result<(), OpError> {
    if expected != got {
        return Err(OpError::Arity {
            what,
            expected,
            got,
        });
    }
    Ok(())
}

/// Bundled operators compute on dense f16/f32 only.
pub(crate) fn check_compute_desc(desc: &TensorDesc) -> Result<(), OpError> {
    match desc.dtype() {
        DType::F16 | DType::F32 => {}
        other => return Err(OpError::UnsupportedDType(other)),
    }
    if desc.format() != Format::Nd {
        return Err(OpError::UnsupportedFormat(desc.format()));
    }
    Ok(())
}

pub(crate) fn bound_ptr(tensor: &Tensor) -> Result<DevicePtr, OpError> {
    tensor.device_data().cloned().ok_or(OpError::Unbound)
}

/// Download and decode a device region to f32. Runs inside enqueued jobs.
pub(crate) fn fetch_f32(ptr: &DevicePtr, dtype: DType, bytes: usize) -> og_device::Result<Vec<f32>> {
    let mut buf = vec![0u8; bytes];
    ptr.copy_to_host(&mut buf)?;
    og_tensor::decode_f32(dtype, &buf).map_err(|e| DeviceError::Kernel(e.to_string()))
}

/// Encode f32 values per `dtype` and upload them. Runs inside enqueued jobs.
pub(crate) fn store_f32(ptr: &DevicePtr, dtype: DType, values: &[f32]) -> og_device::Result<()> {
    let bytes =
        og_tensor::encode_f32(dtype, values).map_err(|e| DeviceError::Kernel(e.to_string()))?;
    ptr.copy_from_host(&bytes)
}
