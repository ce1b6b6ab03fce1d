use thiserror::Error;

use og_tensor::{DType, Format};

/// Construction-time wiring violations. All are detected by `Graph::new`
/// except `NotTopologicallyOrdered`, which setup raises when the
/// caller-supplied node order puts a reader before its producer.
#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("node {node} references slot {slot} but the graph has {total} slots")]
    SlotOutOfRange {
        node: usize,
        slot: usize,
        total: usize,
    },
    #[error("node {node} declares {got} {kind} slots but its operator expects {expected}")]
    ArityMismatch {
        node: usize,
        kind: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("node {node} writes external-input slot {slot}")]
    ExternalInputWritten { node: usize, slot: usize },
    #[error("slot {slot} is written by both node {first} and node {second}")]
    MultipleWriters {
        slot: usize,
        first: usize,
        second: usize,
    },
    #[error("external-output slot {slot} is never written")]
    OutputNeverWritten { slot: usize },
    #[error("slot {slot} is read by node {node} but no node writes it")]
    ReadWithoutWriter { node: usize, slot: usize },
    #[error("node {node} reads slot {slot} before its producer runs; the node list must be topologically ordered")]
    NotTopologicallyOrdered { node: usize, slot: usize },
}

/// Operator-level failures, raised by an operator's own setup or execute.
#[derive(Error, Debug)]
pub enum OpError {
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("matmul dimension mismatch: [{m}x{k}] @ [{k2}x{n}]")]
    MatmulMismatch {
        m: usize,
        k: usize,
        k2: usize,
        n: usize,
    },
    #[error("expected rank {expected}, got rank {got}")]
    RankMismatch { expected: usize, got: usize },
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: DType, got: DType },
    #[error("unsupported dtype: {0}")]
    UnsupportedDType(DType),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(Format),
    #[error("operator takes {expected} {what} tensors, got {got}")]
    Arity {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("scratch region too small: need {needed} bytes, have {available}")]
    ScratchTooSmall { needed: usize, available: usize },
    #[error("tensor is not bound to device memory")]
    Unbound,
    #[error("device error: {0}")]
    Device(#[from] og_device::DeviceError),
    #[error("tensor error: {0}")]
    Tensor(#[from] og_tensor::TensorError),
    #[error("nested graph failed: {0}")]
    Subgraph(#[source] Box<GraphError>),
}

/// Graph-level failures.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("invalid graph topology: {0}")]
    Topology(#[from] TopologyError),
    #[error("node {node} ({op}) setup failed: {source}")]
    NodeSetup {
        node: usize,
        op: String,
        source: OpError,
    },
    #[error("node {node} ({op}) execution failed: {source}")]
    NodeExecutionFailed {
        node: usize,
        op: String,
        source: OpError,
    },
    #[error("workspace needs {needed} bytes but only {available} are available")]
    AllocationFailure { needed: usize, available: usize },
    #[error("stale setup: {what} changed since the last setup (expected {expected}, got {got}); re-run setup")]
    StaleWorkspaceSize {
        what: &'static str,
        expected: String,
        got: String,
    },
    #[error("{kind} binding count mismatch: graph declares {expected}, got {got}")]
    BindingCount {
        kind: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("slot {slot} is not bound to device memory")]
    UnboundSlot { slot: usize },
    #[error("execute called before a successful setup")]
    SetupRequired,
    #[error("device error: {0}")]
    Device(#[from] og_device::DeviceError),
    #[error("tensor error: {0}")]
    Tensor(#[from] og_tensor::TensorError),
}

pub type Result<T> = std::result::Result<T, GraphError>;
