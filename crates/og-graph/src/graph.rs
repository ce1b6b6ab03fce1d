use og_device::{Context, DevicePtr};
use og_tensor::{Tensor, TensorDesc};

use crate::error::{GraphError, OpError, Result, TopologyError};
use crate::op::{Operator, Scratch};
use crate::slot::{SlotClass, SlotLayout, SlotTable};

/// Index into a graph's tensor-slot namespace.
pub type SlotId = usize;

/// One operator wired into the shared slot namespace.
#[derive(Debug)]
pub struct GraphNode {
    pub op: Box<dyn Operator>,
    pub inputs: Vec<SlotId>,
    pub outputs: Vec<SlotId>,
}

/// Everything needed to construct a graph: the slot-count triple and the
/// node list. The node list must be in topological order; the engine runs
/// nodes in list order and never reorders them.
#[derive(Debug)]
pub struct GraphParam {
    pub input_count: usize,
    pub output_count: usize,
    pub internal_count: usize,
    pub nodes: Vec<GraphNode>,
}

#[derive(Debug, Clone)]
struct SetupState {
    input_descs: Vec<TensorDesc>,
    output_descs: Vec<TensorDesc>,
    workspace_bytes: usize,
}

/// An ordered list of operator nodes over a shared tensor-slot namespace.
///
/// Wiring is validated at construction. `setup` propagates descriptors
/// through the slots, runs every node's setup, sizes the shared workspace
/// (the max across nodes), and allocates graph-owned internal tensors.
/// `execute` enqueues every node's kernel in list order against the same
/// scratch region. A graph is itself an [`Operator`], so it can be nested
/// as a node of another graph.
#[derive(Debug)]
pub struct Graph {
    layout: SlotLayout,
    nodes: Vec<GraphNode>,
    writers: Vec<Option<usize>>,
    internals: Vec<Option<Tensor>>,
    setup_state: Option<SetupState>,
}

impl Graph {
    /// Validate the wiring and build the graph.
    ///
    /// Rejected here, not at setup: out-of-range slot ids, node arity not
    /// matching the operator, writes to external inputs, more than one
    /// writer per slot, unwritten external outputs, and reads of slots no
    /// node writes.
    pub fn new(param: GraphParam) -> Result<Graph> {
        let layout = SlotLayout {
            input_count: param.input_count,
            internal_count: param.internal_count,
            output_count: param.output_count,
        };
        let total = layout.total();
        let mut writers: Vec<Option<usize>> = vec![None; total];
        let mut first_reader: Vec<Option<usize>> = vec![None; total];

        for (i, node) in param.nodes.iter().enumerate() {
            if node.inputs.len() != node.op.input_count() {
                return Err(TopologyError::ArityMismatch {
                    node: i,
                    kind: "input",
                    expected: node.op.input_count(),
                    got: node.inputs.len(),
                }
                .into());
            }
            if node.outputs.len() != node.op.output_count() {
                return Err(TopologyError::ArityMismatch {
                    node: i,
                    kind: "output",
                    expected: node.op.output_count(),
                    got: node.outputs.len(),
                }
                .into());
            }

            for &slot in &node.inputs {
                if slot >= total {
                    return Err(TopologyError::SlotOutOfRange {
                        node: i,
                        slot,
                        total,
                    }
                    .into());
                }
                first_reader[slot].get_or_insert(i);
            }
            for &slot in &node.outputs {
                if slot >= total {
                    return Err(TopologyError::SlotOutOfRange {
                        node: i,
                        slot,
                        total,
                    }
                    .into());
                }
                if layout.class_of(slot) == Some(SlotClass::ExternalInput) {
                    return Err(TopologyError::ExternalInputWritten { node: i, slot }.into());
                }
                if let Some(first) = writers[slot] {
                    return Err(TopologyError::MultipleWriters {
                        slot,
                        first,
                        second: i,
                    }
                    .into());
                }
                writers[slot] = Some(i);
            }
        }

        for slot in 0..total {
            match layout.class_of(slot) {
                Some(SlotClass::ExternalOutput) => {
                    if writers[slot].is_none() {
                        return Err(TopologyError::OutputNeverWritten { slot }.into());
                    }
                }
                Some(SlotClass::Internal) => {
                    if let Some(node) = first_reader[slot] {
                        if writers[slot].is_none() {
                            return Err(TopologyError::ReadWithoutWriter { node, slot }.into());
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(Graph {
            layout,
            nodes: param.nodes,
            writers,
            internals: vec![None; param.internal_count],
            setup_state: None,
        })
    }

    pub fn layout(&self) -> &SlotLayout {
        &self.layout
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Workspace requirement reported by the last successful setup.
    pub fn workspace_size(&self) -> Option<usize> {
        self.setup_state.as_ref().map(|s| s.workspace_bytes)
    }

    /// Propagate descriptors from the external inputs through the node
    /// list, filling in every written slot. Fails when a node consumes a
    /// slot whose producer appears later in the list.
    fn infer_slot_descs(
        &self,
        inputs: &[TensorDesc],
    ) -> Result<(Vec<Option<TensorDesc>>, Vec<TensorDesc>)> {
        if inputs.len() != self.layout.input_count {
            return Err(GraphError::BindingCount {
                kind: "input",
                expected: self.layout.input_count,
                got: inputs.len(),
            });
        }

        let mut descs: Vec<Option<TensorDesc>> = vec![None; self.layout.total()];
        for (slot, desc) in inputs.iter().enumerate() {
            descs[slot] = Some(desc.clone());
        }

        for (i, node) in self.nodes.iter().enumerate() {
            let node_inputs = node
                .inputs
                .iter()
                .map(|&slot| {
                    descs[slot].clone().ok_or_else(|| {
                        TopologyError::NotTopologicallyOrdered { node: i, slot }.into()
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let inferred = node
                .op
                .infer_outputs(&node_inputs)
                .map_err(|source| GraphError::NodeSetup {
                    node: i,
                    op: node.op.name().to_string(),
                    source,
                })?;
            for (&slot, desc) in node.outputs.iter().zip(inferred) {
                descs[slot] = Some(desc);
            }
        }

        let first_output = self.layout.input_count + self.layout.internal_count;
        let output_descs = (first_output..self.layout.total())
            .map(|slot| {
                descs[slot]
                    .clone()
                    .ok_or_else(|| TopologyError::OutputNeverWritten { slot }.into())
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((descs, output_descs))
    }

    /// Validate the whole graph against the given external descriptors and
    /// return the workspace byte requirement.
    ///
    /// Nodes run sequentially on one stream and reuse the scratch region,
    /// so the requirement is the maximum across nodes, not the sum.
    /// Idempotent for unchanged shapes; re-run it whenever an external
    /// descriptor changes. Internal tensors are (re)allocated here, and
    /// only when their byte size grows.
    pub fn setup(&mut self, inputs: &[TensorDesc], outputs: &[TensorDesc]) -> Result<usize> {
        if outputs.len() != self.layout.output_count {
            return Err(GraphError::BindingCount {
                kind: "output",
                expected: self.layout.output_count,
                got: outputs.len(),
            });
        }

        let (descs, inferred_outputs) = self.infer_slot_descs(inputs)?;

        // The descriptors the wiring produces must match what the caller
        // bound to the output slots.
        let first_output = self.layout.input_count + self.layout.internal_count;
        for (idx, (inferred, declared)) in inferred_outputs.iter().zip(outputs).enumerate() {
            if inferred != declared {
                let slot = first_output + idx;
                let node = self.writers[slot]
                    .ok_or(TopologyError::OutputNeverWritten { slot })?;
                let source = if inferred.dtype() != declared.dtype() {
                    OpError::DTypeMismatch {
                        expected: declared.dtype(),
                        got: inferred.dtype(),
                    }
                } else {
                    OpError::ShapeMismatch {
                        expected: declared.dims().to_vec(),
                        got: inferred.dims().to_vec(),
                    }
                };
                return Err(GraphError::NodeSetup {
                    node,
                    op: self.nodes[node].op.name().to_string(),
                    source,
                });
            }
        }

        let mut workspace_bytes = 0usize;
        for (i, node) in self.nodes.iter_mut().enumerate() {
            let node_inputs = node
                .inputs
                .iter()
                .map(|&slot| {
                    descs[slot].clone().ok_or_else(|| {
                        TopologyError::NotTopologicallyOrdered { node: i, slot }.into()
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let node_outputs = node
                .outputs
                .iter()
                .map(|&slot| descs[slot].clone().ok_or(GraphError::UnboundSlot { slot }))
                .collect::<Result<Vec<_>>>()?;

            let bytes = node
                .op
                .setup(&node_inputs, &node_outputs)
                .map_err(|source| GraphError::NodeSetup {
                    node: i,
                    op: node.op.name().to_string(),
                    source,
                })?;
            workspace_bytes = workspace_bytes.max(bytes);
        }

        self.bind_internals(&descs)?;

        self.setup_state = Some(SetupState {
            input_descs: inputs.to_vec(),
            output_descs: outputs.to_vec(),
            workspace_bytes,
        });
        log::debug!(
            "graph setup: {} nodes, workspace {} bytes",
            self.nodes.len(),
            workspace_bytes
        );
        Ok(workspace_bytes)
    }

    /// Allocate or rebind the graph-owned internal tensors, reusing the
    /// existing device buffer whenever its capacity still covers the new
    /// descriptor.
    fn bind_internals(&mut self, descs: &[Option<TensorDesc>]) -> Result<()> {
        for idx in 0..self.layout.internal_count {
            let slot = self.layout.input_count + idx;
            let Some(desc) = &descs[slot] else {
                // Internal slot no node writes or reads; leave it unbound.
                continue;
            };

            let current = &mut self.internals[idx];
            let unchanged = current
                .as_ref()
                .is_some_and(|t| t.desc() == desc && t.is_bound());
            if unchanged {
                continue;
            }

            let needed = desc.byte_size();
            let reusable = current
                .as_ref()
                .and_then(|t| t.device_data())
                .filter(|ptr| ptr.capacity() >= needed)
                .cloned();
            let ptr = match reusable {
                Some(ptr) => ptr,
                None => DevicePtr::alloc(needed)?,
            };
            let mut tensor = Tensor::unbound(desc.clone());
            tensor.bind(ptr)?;
            *current = Some(tensor);
        }
        Ok(())
    }

    /// Enqueue every node's kernel in list order, all sharing `scratch`.
    ///
    /// Does not block; synchronize the context to observe results. Stops
    /// at the first node that fails to enqueue; nodes enqueued before the
    /// failure may still run on the device. The caller must not run two
    /// executes against the same graph and workspace concurrently.
    pub fn execute(
        &self,
        inputs: &[&Tensor],
        outputs: &[&Tensor],
        scratch: Scratch<'_>,
        ctx: &Context,
    ) -> Result<()> {
        let state = self.setup_state.as_ref().ok_or(GraphError::SetupRequired)?;
        if inputs.len() != self.layout.input_count {
            return Err(GraphError::BindingCount {
                kind: "input",
                expected: self.layout.input_count,
                got: inputs.len(),
            });
        }
        if outputs.len() != self.layout.output_count {
            return Err(GraphError::BindingCount {
                kind: "output",
                expected: self.layout.output_count,
                got: outputs.len(),
            });
        }

        // Rebinding device pointers between runs is fine; changing a
        // descriptor or byte size without a fresh setup is not.
        for (slot, (tensor, desc)) in inputs.iter().zip(&state.input_descs).enumerate() {
            if tensor.desc() != desc {
                return Err(GraphError::StaleWorkspaceSize {
                    what: "input descriptor",
                    expected: desc.to_string(),
                    got: tensor.desc().to_string(),
                });
            }
            if !tensor.is_bound() {
                return Err(GraphError::UnboundSlot { slot });
            }
        }
        let first_output = self.layout.input_count + self.layout.internal_count;
        for (idx, (tensor, desc)) in outputs.iter().zip(&state.output_descs).enumerate() {
            if tensor.desc() != desc {
                return Err(GraphError::StaleWorkspaceSize {
                    what: "output descriptor",
                    expected: desc.to_string(),
                    got: tensor.desc().to_string(),
                });
            }
            if !tensor.is_bound() {
                return Err(GraphError::UnboundSlot {
                    slot: first_output + idx,
                });
            }
        }
        if scratch.bytes() < state.workspace_bytes {
            return Err(GraphError::StaleWorkspaceSize {
                what: "workspace size",
                expected: state.workspace_bytes.to_string(),
                got: scratch.bytes().to_string(),
            });
        }

        let table = SlotTable {
            layout: self.layout,
            inputs,
            internals: &self.internals,
            outputs,
        };
        for (i, node) in self.nodes.iter().enumerate() {
            let node_inputs = node
                .inputs
                .iter()
                .map(|&slot| table.get(slot))
                .collect::<Result<Vec<_>>>()?;
            let node_outputs = node
                .outputs
                .iter()
                .map(|&slot| table.get(slot))
                .collect::<Result<Vec<_>>>()?;

            node.op
                .execute(&node_inputs, &node_outputs, scratch, ctx)
                .map_err(|source| GraphError::NodeExecutionFailed {
                    node: i,
                    op: node.op.name().to_string(),
                    source,
                })?;
        }
        Ok(())
    }
}

/// A graph exposes the same contract as a primitive operator, so graphs
/// nest as nodes of larger graphs.
impl Operator for Graph {
    fn name(&self) -> &str {
        "graph"
    }

    fn input_count(&self) -> usize {
        self.layout.input_count
    }

    fn output_count(&self) -> usize {
        self.layout.output_count
    }

    fn infer_outputs(&self, inputs: &[TensorDesc]) -> std::result::Result<Vec<TensorDesc>, OpError> {
        self.infer_slot_descs(inputs)
            .map(|(_, outputs)| outputs)
            .map_err(|e| OpError::Subgraph(Box::new(e)))
    }

    fn setup(
        &mut self,
        inputs: &[TensorDesc],
        outputs: &[TensorDesc],
    ) -> std::result::Result<usize, OpError> {
        Graph::setup(self, inputs, outputs).map_err(|e| OpError::Subgraph(Box::new(e)))
    }

    fn execute(
        &self,
        inputs: &[&Tensor],
        outputs: &[&Tensor],
        scratch: Scratch<'_>,
        ctx: &Context,
    ) -> std::result::Result<(), OpError> {
        Graph::execute(self, inputs, outputs, scratch, ctx)
            .map_err(|e| OpError::Subgraph(Box::new(e)))
    }
}
