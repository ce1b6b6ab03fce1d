//! `og-graph` - Operator-graph construction and execution engine.
//!
//! This crate provides:
//! - An `Operator` trait with a uniform infer/setup/execute contract
//! - MatMul and elementwise operators plus a parameter-driven factory
//! - `Graph`, an ordered node list over a shared tensor-slot namespace,
//!   itself an operator so graphs compose
//! - `Workspace`, the single scratch buffer shared by all nodes, owned or
//!   borrowed
//! - `Session`, the embedding boundary: bind external device pointers and
//!   run the whole graph synchronously
//!
//! Setup computes the workspace requirement (the max across nodes, since
//! nodes run sequentially on one stream and reuse the region) and validates
//! wiring; execute enqueues every node's kernel in list order. The node
//! list must already be topologically ordered; setup rejects lists that are
//! not.

pub mod error;
pub mod graph;
pub mod op;
pub mod session;
pub mod slot;
pub mod workspace;

// Re-export primary types at the crate root for convenience.
pub use error::{GraphError, OpError, Result, TopologyError};
pub use graph::{Graph, GraphNode, GraphParam, SlotId};
pub use op::{
    create_operator, ElewiseKind, ElewiseParam, MatMulParam, OpParam, Operator, Scratch,
};
pub use session::{Session, SessionOptions};
pub use slot::{SlotClass, SlotLayout, SlotTable};
pub use workspace::Workspace;
