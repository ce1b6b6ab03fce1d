use og_device::DevicePtr;

use crate::desc::TensorDesc;
use crate::dtype::{decode_f32, encode_f32};
use crate::error::{Result, TensorError};

/// A descriptor bound to device memory.
///
/// The device pointer may be rebound between runs to point at a different
/// buffer; the descriptor and byte size are fixed at construction and never
/// change on rebind. Host data passed to `from_host_f32` is uploaded once
/// and not retained.
#[derive(Debug, Clone)]
pub struct Tensor {
    desc: TensorDesc,
    data_size: usize,
    device: Option<DevicePtr>,
}

impl Tensor {
    /// A tensor with no device memory bound yet.
    pub fn unbound(desc: TensorDesc) -> Self {
        let data_size = desc.byte_size();
        Tensor {
            desc,
            data_size,
            device: None,
        }
    }

    /// Allocate device memory and upload `values`, encoded per the
    /// descriptor's dtype.
    pub fn from_host_f32(desc: TensorDesc, values: &[f32]) -> Result<Self> {
        if values.len() != desc.elem_count() {
            return Err(TensorError::HostDataSize {
                expected: desc.elem_count(),
                got: values.len(),
            });
        }
        let bytes = encode_f32(desc.dtype(), values)?;
        let ptr = DevicePtr::alloc(bytes.len())?;
        ptr.copy_from_host(&bytes)?;
        let mut tensor = Tensor::unbound(desc);
        tensor.device = Some(ptr);
        Ok(tensor)
    }

    pub fn desc(&self) -> &TensorDesc {
        &self.desc
    }

    /// Byte size of the bound data, derived from the descriptor.
    pub fn data_size(&self) -> usize {
        self.data_size
    }

    pub fn device_data(&self) -> Option<&DevicePtr> {
        self.device.as_ref()
    }

    pub fn is_bound(&self) -> bool {
        self.device.is_some()
    }

    /// Rebind the device pointer. The pointed-to region must cover the
    /// tensor's byte size; the descriptor is unchanged.
    pub fn bind(&mut self, ptr: DevicePtr) -> Result<()> {
        if ptr.capacity() < self.data_size {
            return Err(TensorError::BindTooSmall {
                needed: self.data_size,
                capacity: ptr.capacity(),
            });
        }
        self.device = Some(ptr);
        Ok(())
    }

    /// Download the bound data and decode it to f32.
    ///
    /// Only valid after the stream that produced the data has been
    /// synchronized.
    pub fn read_f32(&self) -> Result<Vec<f32>> {
        let ptr = self.device.as_ref().ok_or(TensorError::Unbound)?;
        let mut bytes = vec![0u8; self.data_size];
        ptr.copy_to_host(&mut bytes)?;
        decode_f32(self.desc.dtype(), &bytes)
    }
}
