//! Core topology data structures.

use std::collections::{HashMap, HashSet, VecDeque};

use cf_core::{GateId, NodeId};

/// Key used to address a gate by its endpoints: `"upstream->downstream"`.
pub fn gate_key(upstream: &str, downstream: &str) -> String {
    format!("{upstream}->{downstream}")
}

/// A node of the canal network (reservoir, junction, delivery zone).
#[derive(Debug, Clone, PartialEq)]
pub struct CanalNode {
    pub id: NodeId,
    pub name: String,
    /// Canal bottom elevation (m, datum-relative), if surveyed.
    pub bottom_elevation_m: Option<f64>,
}

/// Trapezoidal channel cross-section of the reach downstream of a gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelGeometry {
    /// Bottom width b (m)
    pub bottom_width_m: f64,
    /// Bank-full depth (m)
    pub depth_m: f64,
    /// Side slope m (horizontal per unit vertical)
    pub side_slope: f64,
    /// Manning roughness n (s/m^1/3)
    pub manning_n: f64,
    /// Bed slope S0 (m/m)
    pub bed_slope: f64,
    /// Reach length L (m)
    pub length_m: f64,
}

impl ChannelGeometry {
    /// Returns the first violated physical constraint, if any.
    pub fn check(&self) -> Option<&'static str> {
        let all_finite = [
            self.bottom_width_m,
            self.depth_m,
            self.side_slope,
            self.manning_n,
            self.bed_slope,
            self.length_m,
        ]
        .iter()
        .all(|v| v.is_finite());

        if !all_finite {
            Some("non-finite value")
        } else if self.bottom_width_m <= 0.0 {
            Some("bottom width must be positive")
        } else if self.depth_m <= 0.0 {
            Some("depth must be positive")
        } else if self.side_slope < 0.0 {
            Some("side slope must be non-negative")
        } else if self.manning_n <= 0.0 {
            Some("Manning n must be positive")
        } else if self.bed_slope < 0.0 {
            Some("bed slope must be non-negative")
        } else if self.length_m <= 0.0 {
            Some("length must be positive")
        } else {
            None
        }
    }
}

/// A gate connecting an upstream node to a downstream node.
///
/// The channel reach immediately downstream of the gate is described by
/// `channel` when its geometry is known.
#[derive(Debug, Clone, PartialEq)]
pub struct GateEdge {
    pub id: GateId,
    /// `"upstream->downstream"`
    pub key: String,
    pub upstream: NodeId,
    pub downstream: NodeId,
    /// Nominal maximum flow capacity (m³/s)
    pub capacity_m3s: f64,
    pub channel: Option<ChannelGeometry>,
}

/// Validated, immutable canal topology.
///
/// Adjacency is stored in compact offset form for both directions, sorted by
/// gate id for deterministic traversal.
#[derive(Debug, Clone)]
pub struct CanalGraph {
    pub(crate) nodes: Vec<CanalNode>,
    pub(crate) gates: Vec<GateEdge>,

    /// node i's outgoing gates are out_gates[out_offsets[i]..out_offsets[i+1]]
    pub(crate) out_offsets: Vec<usize>,
    pub(crate) out_gates: Vec<GateId>,
    pub(crate) in_offsets: Vec<usize>,
    pub(crate) in_gates: Vec<GateId>,

    pub(crate) node_names: HashMap<String, NodeId>,
    pub(crate) gate_keys: HashMap<String, GateId>,
}

impl CanalGraph {
    pub fn nodes(&self) -> &[CanalNode] {
        &self.nodes
    }

    pub fn gates(&self) -> &[GateEdge] {
        &self.gates
    }

    pub fn node(&self, id: NodeId) -> Option<&CanalNode> {
        self.nodes.get(id.slot())
    }

    pub fn gate(&self, id: GateId) -> Option<&GateEdge> {
        self.gates.get(id.slot())
    }

    /// Name of a node; empty string for an unknown id.
    pub fn node_name(&self, id: NodeId) -> &str {
        self.node(id).map(|n| n.name.as_str()).unwrap_or("")
    }

    pub fn node_by_name(&self, name: &str) -> Option<&CanalNode> {
        self.node_names.get(name).and_then(|id| self.node(*id))
    }

    /// Look up a gate by its `"upstream->downstream"` key.
    pub fn gate_by_key(&self, key: &str) -> Option<&GateEdge> {
        self.gate_keys.get(key).and_then(|id| self.gate(*id))
    }

    pub fn gate_between(&self, upstream: &str, downstream: &str) -> Option<&GateEdge> {
        self.gate_by_key(&gate_key(upstream, downstream))
    }

    /// Gates leaving a node.
    pub fn outgoing(&self, node: NodeId) -> &[GateId] {
        let idx = node.slot();
        if idx >= self.nodes.len() {
            return &[];
        }
        &self.out_gates[self.out_offsets[idx]..self.out_offsets[idx + 1]]
    }

    /// Gates entering a node.
    pub fn incoming(&self, node: NodeId) -> &[GateId] {
        let idx = node.slot();
        if idx >= self.nodes.len() {
            return &[];
        }
        &self.in_gates[self.in_offsets[idx]..self.in_offsets[idx + 1]]
    }

    /// Nodes without any incoming gate (reservoirs, headworks).
    pub fn sources(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| self.incoming(n.id).is_empty())
            .map(|n| n.id)
            .collect()
    }

    /// Breadth-first order of all nodes reachable downstream of `start`,
    /// including `start` itself.
    pub fn reachable_from(&self, start: NodeId) -> Vec<NodeId> {
        if self.node(start).is_none() {
            return Vec::new();
        }
        let mut seen = HashSet::from([start]);
        let mut order = vec![start];
        let mut queue = VecDeque::from([start]);

        while let Some(node) = queue.pop_front() {
            for gate_id in self.outgoing(node) {
                let Some(gate) = self.gate(*gate_id) else {
                    continue;
                };
                if seen.insert(gate.downstream) {
                    order.push(gate.downstream);
                    queue.push_back(gate.downstream);
                }
            }
        }
        order
    }
}
