//! Partition dependency graph: construction and execution.
//!
//! Nodes live in an arena indexed by [`NodeId`]; the synthetic root at
//! index 0 stands for the client-supplied tensors and partitions follow
//! in registration order.

mod builder;
mod executor;

pub use builder::{build_graph, BuildError, InputSource, OperatorGraph, OperatorIo, OperatorNode};
pub use executor::{execute, ExecutionError, NodeState, Prediction};

/// Arena handle for one graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

/// The synthetic root representing client-supplied tensors.
pub const ROOT: NodeId = NodeId(0);
