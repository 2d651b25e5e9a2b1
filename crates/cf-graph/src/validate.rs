//! Topology validation logic.

use std::collections::HashSet;

use cf_core::CfResult;

use crate::error::GraphError;
use crate::graph::{CanalNode, GateEdge};

/// Validate names, references, capacities and channel geometry.
pub(crate) fn validate_structure(nodes: &[CanalNode], gates: &[GateEdge]) -> CfResult<()> {
    let mut names = HashSet::new();
    for node in nodes {
        if !names.insert(node.name.as_str()) {
            return Err(GraphError::DuplicateNode {
                name: node.name.clone(),
            }
            .into());
        }
    }

    let mut keys = HashSet::new();
    for gate in gates {
        for node in [gate.upstream, gate.downstream] {
            if node.slot() >= nodes.len() {
                return Err(GraphError::InvalidNodeRef {
                    gate: gate.id,
                    node,
                }
                .into());
            }
        }

        if gate.upstream == gate.downstream {
            return Err(GraphError::SelfLoop {
                gate: gate.id,
                node: gate.upstream,
            }
            .into());
        }

        if !keys.insert(gate.key.as_str()) {
            return Err(GraphError::DuplicateGate {
                key: gate.key.clone(),
            }
            .into());
        }

        if !gate.capacity_m3s.is_finite() || gate.capacity_m3s < 0.0 {
            return Err(GraphError::InvalidCapacity {
                key: gate.key.clone(),
                value: gate.capacity_m3s,
            }
            .into());
        }

        if let Some(what) = gate.channel.as_ref().and_then(|c| c.check()) {
            return Err(GraphError::InvalidGeometry {
                key: gate.key.clone(),
                what,
            }
            .into());
        }
    }

    Ok(())
}
