use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{DeviceError, Result};

type Job = Box<dyn FnOnce() -> Result<()> + Send>;

struct StreamInner {
    queue: Mutex<VecDeque<Job>>,
}

/// An execution stream: a FIFO queue of device jobs.
///
/// `enqueue` never blocks; queued work only runs (and results only become
/// observable) when `synchronize` is called. Cloning yields another handle
/// to the same stream, so a stream may be shared across contexts and
/// graphs, in which case cross-graph job order is enqueue order.
#[derive(Clone)]
pub struct Stream {
    inner: Arc<StreamInner>,
}

impl Stream {
    pub fn new() -> Self {
        Stream {
            inner: Arc::new(StreamInner {
                queue: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Queue a job. Jobs run in enqueue order at the next `synchronize`.
    pub fn enqueue<F>(&self, job: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        // A poisoned lock still guards a valid queue; recover the guard.
        self.inner
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Box::new(job));
    }

    /// Number of jobs queued but not yet run.
    pub fn pending(&self) -> usize {
        self.inner
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Run all queued jobs in order and block until they complete.
    ///
    /// Every queued job runs even if an earlier one fails; once enqueued,
    /// work runs to completion. The first error is returned.
    pub fn synchronize(&self) -> Result<()> {
        let mut first_err = None;
        loop {
            let job = self
                .inner
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            let Some(job) = job else { break };
            if let Err(e) = job() {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}

impl Default for Stream {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("pending", &self.pending())
            .finish()
    }
}

impl Drop for StreamInner {
    fn drop(&mut self) {
        let pending = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        if pending > 0 {
            log::warn!("stream dropped with {pending} pending jobs; their work is abandoned");
        }
    }
}
