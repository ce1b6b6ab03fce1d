use og_device::DevicePtr;

use crate::error::{GraphError, Result};
use crate::op::Scratch;

#[derive(Debug)]
enum State {
    /// No memory held yet; the first `ensure` with a nonzero size allocates.
    Pending,
    /// Memory this workspace allocated and will drop with itself.
    Owned { ptr: DevicePtr, bytes: usize },
    /// Caller-supplied memory. Never reallocated; too small is an error.
    Borrowed { ptr: DevicePtr, bytes: usize },
}

/// The scratch buffer backing a graph's execute calls.
///
/// An owned workspace allocates lazily and grows only when a setup reports
/// a larger requirement; shrinking requirements keep the existing buffer.
/// A borrowed workspace wraps caller memory and never allocates. Memory is
/// released exactly once, when the last handle to the underlying buffer is
/// dropped.
#[derive(Debug)]
pub struct Workspace {
    state: State,
    acquires: usize,
}

impl Workspace {
    /// An owned workspace with nothing allocated yet.
    pub fn new() -> Self {
        Workspace {
            state: State::Pending,
            acquires: 0,
        }
    }

    /// Wrap caller-supplied device memory. The full capacity of `ptr` is
    /// available as scratch.
    pub fn borrowed(ptr: DevicePtr) -> Self {
        let bytes = ptr.capacity();
        Workspace {
            state: State::Borrowed { ptr, bytes },
            acquires: 0,
        }
    }

    /// Bytes currently backing the workspace.
    pub fn bytes(&self) -> usize {
        match &self.state {
            State::Pending => 0,
            State::Owned { bytes, .. } | State::Borrowed { bytes, .. } => *bytes,
        }
    }

    /// Number of device allocations made so far.
    pub fn acquires(&self) -> usize {
        self.acquires
    }

    /// Make at least `needed` bytes available.
    ///
    /// Owned memory is reallocated only when `needed` exceeds the current
    /// capacity. Borrowed memory that cannot cover `needed` fails instead.
    pub fn ensure(&mut self, needed: usize) -> Result<()> {
        match &self.state {
            State::Borrowed { bytes, .. } => {
                if *bytes < needed {
                    return Err(GraphError::AllocationFailure {
                        needed,
                        available: *bytes,
                    });
                }
                Ok(())
            }
            State::Owned { bytes, .. } if *bytes >= needed => Ok(()),
            State::Pending if needed == 0 => Ok(()),
            _ => {
                let ptr = DevicePtr::alloc(needed)?;
                self.acquires += 1;
                log::debug!("workspace grown to {needed} bytes");
                self.state = State::Owned { ptr, bytes: needed };
                Ok(())
            }
        }
    }

    /// View the workspace as the scratch region for one execute call.
    pub fn scratch(&self) -> Scratch<'_> {
        match &self.state {
            State::Pending => Scratch::empty(),
            State::Owned { ptr, bytes } | State::Borrowed { ptr, bytes } => {
                Scratch::new(ptr, *bytes)
            }
        }
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lazy_allocation() {
        let mut ws = Workspace::new();
        assert_eq!(ws.bytes(), 0);
        assert_eq!(ws.acquires(), 0);

        ws.ensure(0).unwrap();
        assert_eq!(ws.acquires(), 0);

        ws.ensure(256).unwrap();
        assert_eq!(ws.bytes(), 256);
        assert_eq!(ws.acquires(), 1);
    }

    #[test]
    fn test_no_realloc_when_size_holds() {
        let mut ws = Workspace::new();
        ws.ensure(1024).unwrap();
        ws.ensure(1024).unwrap();
        ws.ensure(64).unwrap();
        assert_eq!(ws.acquires(), 1);
        assert_eq!(ws.bytes(), 1024);
    }

    #[test]
    fn test_realloc_on_growth() {
        let mut ws = Workspace::new();
        ws.ensure(64).unwrap();
        ws.ensure(128).unwrap();
        assert_eq!(ws.acquires(), 2);
        assert_eq!(ws.bytes(), 128);
    }

    #[test]
    fn test_borrowed_covers() {
        let ptr = DevicePtr::alloc(512).unwrap();
        let mut ws = Workspace::borrowed(ptr);
        ws.ensure(512).unwrap();
        assert_eq!(ws.acquires(), 0);
        assert!(ws.scratch().ptr().is_some());
    }

    #[test]
    fn test_borrowed_too_small() {
        let ptr = DevicePtr::alloc(16).unwrap();
        let mut ws = Workspace::borrowed(ptr);
        let err = ws.ensure(32).unwrap_err();
        assert!(matches!(
            err,
            GraphError::AllocationFailure {
                needed: 32,
                available: 16
            }
        ));
    }

    #[test]
    fn test_scratch_view() {
        let mut ws = Workspace::new();
        assert_eq!(ws.scratch().bytes(), 0);
        ws.ensure(96).unwrap();
        let scratch = ws.scratch();
        assert_eq!(scratch.bytes(), 96);
        assert!(scratch.claim(96).unwrap().is_some());
    }
}
