use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{DeviceError, Result};

/// One device allocation. Freed exactly once, when the last `DevicePtr`
/// referencing it is dropped.
struct DeviceBuf {
    bytes: Mutex<Vec<u8>>,
}

/// A handle to a region of device memory.
///
/// Cloning is cheap and shares the underlying allocation; `offset_bytes`
/// derives a sub-region handle, the way a raw device pointer would be
/// offset into a larger buffer. All host transfers are bounds-checked
/// against the region.
#[derive(Clone)]
pub struct DevicePtr {
    buf: Arc<DeviceBuf>,
    offset: usize,
}

impl DevicePtr {
    /// Allocate `bytes` of zero-filled device memory.
    pub fn alloc(bytes: usize) -> Result<Self> {
        let mut storage: Vec<u8> = Vec::new();
        storage
            .try_reserve_exact(bytes)
            .map_err(|_| DeviceError::AllocationFailure { bytes })?;
        storage.resize(bytes, 0);
        Ok(DevicePtr {
            buf: Arc::new(DeviceBuf {
                bytes: Mutex::new(storage),
            }),
            offset: 0,
        })
    }

    /// Derive a handle to the region starting `offset` bytes further in.
    pub fn offset_bytes(&self, offset: usize) -> Result<Self> {
        let capacity = self.capacity();
        if offset > capacity {
            return Err(DeviceError::CopyOutOfBounds {
                offset: self.offset + offset,
                len: 0,
                capacity,
            });
        }
        Ok(DevicePtr {
            buf: Arc::clone(&self.buf),
            offset: self.offset + offset,
        })
    }

    /// Bytes addressable through this handle.
    pub fn capacity(&self) -> usize {
        // A poisoned lock still guards valid bytes; recover the guard.
        let total = self
            .buf
            .bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        total - self.offset
    }

    /// Returns true if two handles address the same allocation at the same
    /// offset.
    pub fn same_region(&self, other: &DevicePtr) -> bool {
        Arc::ptr_eq(&self.buf, &other.buf) && self.offset == other.offset
    }

    /// Blocking host-to-device copy of `src.len()` bytes.
    pub fn copy_from_host(&self, src: &[u8]) -> Result<()> {
        let mut bytes = self.buf.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        let capacity = bytes.len() - self.offset;
        if src.len() > capacity {
            return Err(DeviceError::CopyOutOfBounds {
                offset: self.offset,
                len: src.len(),
                capacity,
            });
        }
        bytes[self.offset..self.offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    /// Blocking device-to-host copy of `dst.len()` bytes.
    pub fn copy_to_host(&self, dst: &mut [u8]) -> Result<()> {
        let bytes = self.buf.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        let capacity = bytes.len() - self.offset;
        if dst.len() > capacity {
            return Err(DeviceError::CopyOutOfBounds {
                offset: self.offset,
                len: dst.len(),
                capacity,
            });
        }
        dst.copy_from_slice(&bytes[self.offset..self.offset + dst.len()]);
        Ok(())
    }
}

impl fmt::Debug for DevicePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DevicePtr")
            .field("addr", &Arc::as_ptr(&self.buf))
            .field("offset", &self.offset)
            .field("capacity", &self.capacity())
            .finish()
    }
}
