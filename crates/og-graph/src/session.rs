use og_device::{Context, DevicePtr, Stream};
use og_tensor::{Tensor, TensorDesc};

use crate::error::Result;
use crate::graph::Graph;
use crate::workspace::Workspace;

/// Optional resources a session can share instead of owning.
#[derive(Debug, Default)]
pub struct SessionOptions {
    /// Stream to enqueue on. A fresh one is created when absent.
    pub stream: Option<Stream>,
    /// Caller-managed workspace memory. When absent the session owns its
    /// workspace and sizes it from setup.
    pub workspace: Option<DevicePtr>,
}

/// A graph bound to a context and a workspace, driven run by run.
///
/// `run` is the whole per-iteration cycle: setup against the tensors'
/// current descriptors, workspace sizing, execute, synchronize. Setup is
/// cheap when descriptors have not changed, and an owned workspace only
/// reallocates when the requirement grows, so steady-state runs allocate
/// nothing. All resources are released when the session is dropped.
#[derive(Debug)]
pub struct Session {
    graph: Graph,
    ctx: Context,
    workspace: Workspace,
}

impl Drop for Session {
    // Pending work still drains at teardown; a failure there has no caller
    // to report to, so it is logged instead.
    fn drop(&mut self) {
        if let Err(e) = self.ctx.synchronize() {
            log::warn!("session teardown: {e}");
        }
    }
}

impl Session {
    pub fn new(graph: Graph, options: SessionOptions) -> Self {
        let ctx = match options.stream {
            Some(stream) => Context::with_stream(stream),
            None => Context::new(),
        };
        let workspace = match options.workspace {
            Some(ptr) => Workspace::borrowed(ptr),
            None => Workspace::new(),
        };
        Session {
            graph,
            ctx,
            workspace,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Workspace requirement reported by the last run's setup.
    pub fn workspace_size(&self) -> Option<usize> {
        self.graph.workspace_size()
    }

    /// Device allocations the owned workspace has made across all runs.
    pub fn workspace_acquires(&self) -> usize {
        self.workspace.acquires()
    }

    /// Run the graph once over the given tensors and block until the
    /// results are in the output buffers.
    pub fn run(&mut self, inputs: &[&Tensor], outputs: &[&Tensor]) -> Result<()> {
        let input_descs: Vec<TensorDesc> = inputs.iter().map(|t| t.desc().clone()).collect();
        let output_descs: Vec<TensorDesc> = outputs.iter().map(|t| t.desc().clone()).collect();

        let needed = self.graph.setup(&input_descs, &output_descs)?;
        self.workspace.ensure(needed)?;
        self.graph
            .execute(inputs, outputs, self.workspace.scratch(), &self.ctx)?;
        self.ctx.synchronize()?;
        Ok(())
    }
}
