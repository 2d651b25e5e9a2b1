//! Graph-specific error types.

use cf_core::{CfError, GateId, NodeId};

/// Topology construction and validation errors.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphError {
    /// Two nodes share the same name.
    DuplicateNode { name: String },

    /// A gate refers to a node that doesn't exist.
    InvalidNodeRef { gate: GateId, node: NodeId },

    /// A gate connects a node to itself.
    SelfLoop { gate: GateId, node: NodeId },

    /// More than one gate between the same ordered pair of nodes.
    DuplicateGate { key: String },

    /// A gate's nominal capacity is negative or non-finite.
    InvalidCapacity { key: String, value: f64 },

    /// Channel geometry attached to a gate is not physical.
    InvalidGeometry { key: String, what: &'static str },
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphError::DuplicateNode { name } => {
                write!(f, "Node name '{}' is used more than once", name)
            }
            GraphError::InvalidNodeRef { gate, node } => {
                write!(f, "Gate {} refers to non-existent node {}", gate, node)
            }
            GraphError::SelfLoop { gate, node } => {
                write!(f, "Gate {} connects node {} to itself", gate, node)
            }
            GraphError::DuplicateGate { key } => {
                write!(f, "Gate {} is defined more than once", key)
            }
            GraphError::InvalidCapacity { key, value } => {
                write!(f, "Gate {} has invalid capacity {}", key, value)
            }
            GraphError::InvalidGeometry { key, what } => {
                write!(f, "Gate {} has invalid channel geometry: {}", key, what)
            }
        }
    }
}

impl std::error::Error for GraphError {}

impl From<GraphError> for CfError {
    fn from(err: GraphError) -> Self {
        CfError::Invariant {
            what: err.to_string(),
        }
    }
}
