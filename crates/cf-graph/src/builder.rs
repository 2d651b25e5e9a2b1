//! Incremental topology builder.

use std::collections::HashMap;

use cf_core::{CfResult, GateId, NodeId};

use crate::graph::{gate_key, CanalGraph, CanalNode, ChannelGeometry, GateEdge};
use crate::validate;

/// Builder for constructing a canal graph incrementally.
///
/// Use `add_node` and `add_gate` to describe the network, then call
/// `build()` to validate and freeze it into an immutable `CanalGraph`.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<CanalNode>,
    gates: Vec<GateEdge>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with unknown bottom elevation.
    pub fn add_node(&mut self, name: impl Into<String>) -> NodeId {
        self.push_node(name.into(), None)
    }

    /// Add a node with a surveyed bottom elevation (m).
    pub fn add_node_with_elevation(&mut self, name: impl Into<String>, bottom_m: f64) -> NodeId {
        self.push_node(name.into(), Some(bottom_m))
    }

    fn push_node(&mut self, name: String, bottom_elevation_m: Option<f64>) -> NodeId {
        let id = NodeId::from_index(self.nodes.len() as u32);
        self.nodes.push(CanalNode {
            id,
            name,
            bottom_elevation_m,
        });
        id
    }

    /// Add a gate from `upstream` to `downstream` with a nominal capacity (m³/s).
    pub fn add_gate(&mut self, upstream: NodeId, downstream: NodeId, capacity_m3s: f64) -> GateId {
        let id = GateId::from_index(self.gates.len() as u32);
        let key = gate_key(self.name_of(upstream), self.name_of(downstream));
        self.gates.push(GateEdge {
            id,
            key,
            upstream,
            downstream,
            capacity_m3s,
            channel: None,
        });
        id
    }

    /// Attach channel geometry to the reach downstream of a gate.
    pub fn set_channel(&mut self, gate: GateId, geometry: ChannelGeometry) {
        if let Some(edge) = self.gates.get_mut(gate.slot()) {
            edge.channel = Some(geometry);
        }
    }

    fn name_of(&self, node: NodeId) -> &str {
        self.nodes
            .get(node.slot())
            .map(|n| n.name.as_str())
            .unwrap_or("?")
    }

    /// Validate and build the graph.
    pub fn build(self) -> CfResult<CanalGraph> {
        validate::validate_structure(&self.nodes, &self.gates)?;

        let (out_offsets, out_gates) =
            Self::build_adjacency(&self.nodes, &self.gates, |g| g.upstream);
        let (in_offsets, in_gates) =
            Self::build_adjacency(&self.nodes, &self.gates, |g| g.downstream);

        let node_names = self.nodes.iter().map(|n| (n.name.clone(), n.id)).collect();
        let gate_keys = self.gates.iter().map(|g| (g.key.clone(), g.id)).collect();

        Ok(CanalGraph {
            nodes: self.nodes,
            gates: self.gates,
            out_offsets,
            out_gates,
            in_offsets,
            in_gates,
            node_names,
            gate_keys,
        })
    }

    /// Build compact adjacency: for each node, the gates selected by `endpoint`.
    fn build_adjacency<F>(nodes: &[CanalNode], gates: &[GateEdge], endpoint: F) -> (Vec<usize>, Vec<GateId>)
    where
        F: Fn(&GateEdge) -> NodeId,
    {
        let mut node_to_gates: HashMap<NodeId, Vec<GateId>> = HashMap::new();
        for gate in gates {
            node_to_gates.entry(endpoint(gate)).or_default().push(gate.id);
        }
        for list in node_to_gates.values_mut() {
            list.sort_by_key(|g| g.index());
        }

        let mut offsets = Vec::with_capacity(nodes.len() + 1);
        let mut flat = Vec::new();
        offsets.push(0);
        for node in nodes {
            if let Some(list) = node_to_gates.get(&node.id) {
                flat.extend_from_slice(list);
            }
            offsets.push(flat.len());
        }
        (offsets, flat)
    }
}
