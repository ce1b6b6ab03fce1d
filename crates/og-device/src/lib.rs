//! `og-device` - Simulated accelerator runtime for opgraph.
//!
//! This crate provides:
//! - `DevicePtr`, a handle to a region of device memory with bounds-checked
//!   host transfers
//! - `Stream`, a FIFO queue of asynchronously enqueued device jobs
//! - `Context`, the execution handle binding one stream
//!
//! The "device" is an in-process simulation: allocations are byte buffers
//! and streams run their queued jobs when synchronized. The semantics the
//! graph engine relies on (enqueue does not block, results are only valid
//! after an explicit synchronize) are the same as on real hardware.

pub mod context;
pub mod error;
pub mod mem;
pub mod stream;

// Re-export primary types at the crate root for convenience.
pub use context::Context;
pub use error::{DeviceError, Result};
pub use mem::DevicePtr;
pub use stream::Stream;
