use crate::error::Result;
use crate::stream::Stream;

/// Execution context: the handle binding one stream.
///
/// A context is created once and used by many execute calls. Graphs share
/// a context rather than owning it; `synchronize` is the only point at
/// which work enqueued through the context is guaranteed complete and
/// result buffers are valid for host consumption.
#[derive(Debug, Clone)]
pub struct Context {
    stream: Stream,
}

impl Context {
    /// Create a context that owns a fresh stream.
    pub fn new() -> Self {
        Context {
            stream: Stream::new(),
        }
    }

    /// Bind a caller-supplied stream. The stream may be shared with other
    /// contexts; job order across them is then enqueue order.
    pub fn with_stream(stream: Stream) -> Self {
        Context { stream }
    }

    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    /// Block until all work enqueued through this context has completed.
    pub fn synchronize(&self) -> Result<()> {
        self.stream.synchronize()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
