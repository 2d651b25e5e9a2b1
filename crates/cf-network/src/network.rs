//! Hydraulic network model: node levels, gate state and the single-pass
//! propagation algorithms built on top of the gate engine.
//!
//! The model is quasi-steady. Downstream propagation and the backwater
//! estimate are one breadth-first pass each and do not iterate the network
//! to a converged flow balance.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use cf_core::constants::G_MPS2;
use cf_core::{finite_or_zero, NodeId};
use cf_graph::{gate_key, CanalGraph, GateEdge};
use cf_hydraulics::{
    friction_slope, normal_depth, reach_friction_loss, FlowRegime, GateHydraulics,
    GateOpeningSolver, GateProperties, GateScheduleRequest, GateType, HydraulicConditions,
    OpeningRequirement,
};
use tracing::{debug, info, warn};

use crate::error::{NetworkError, NetworkResult};
use crate::state::{
    GateFlowReport, GateOperation, NetworkSnapshot, NodeHydraulics, ReachHydraulics,
    SimulationResult,
};

/// Bottom elevation assigned to a source node without survey data (m).
pub const DEFAULT_DATUM_M: f64 = 100.0;
/// Bottom drop across a reach without geometry (m).
pub const DEFAULT_BOTTOM_DROP_M: f64 = 0.5;
/// Initial depth above the bottom where no level is known (m).
pub const DEFAULT_INITIAL_DEPTH_M: f64 = 1.0;
/// Head loss assumed for a reach without geometry (m).
pub const DEFAULT_CANAL_LOSS_M: f64 = 0.1;
/// Height of a gate estimated from nominal capacity (m).
pub const ESTIMATED_GATE_HEIGHT_M: f64 = 2.0;

/// Mass-balance step (s).
pub const MASS_BALANCE_DT_S: f64 = 60.0;
/// Storage surface assumed for every node (m²).
pub const ASSUMED_SURFACE_AREA_M2: f64 = 1000.0;
/// Net nodal flow below which levels are left alone (m³/s).
pub const NET_FLOW_THRESHOLD_M3S: f64 = 0.1;

/// Owns node levels and gate state for the whole canal network.
#[derive(Debug, Clone)]
pub struct HydraulicNetwork {
    graph: CanalGraph,
    source: NodeId,
    engine: GateHydraulics,
    gate_properties: BTreeMap<String, GateProperties>,
    gate_openings: BTreeMap<String, f64>,
    gate_flows: BTreeMap<String, f64>,
    node_levels: BTreeMap<String, NodeHydraulics>,
}

impl HydraulicNetwork {
    /// Initialise node and gate state for a topology.
    ///
    /// Missing bottom elevations are estimated by walking downstream from
    /// the source; every node starts 1 m above its bottom; every gate starts
    /// closed with properties estimated from its nominal capacity.
    pub fn new(graph: CanalGraph, source_node: &str, engine: GateHydraulics) -> NetworkResult<Self> {
        let source = graph
            .node_by_name(source_node)
            .map(|n| n.id)
            .ok_or_else(|| NetworkError::UnknownNode {
                id: source_node.to_string(),
            })?;

        let bottoms = estimate_bottoms(&graph, source);
        let node_levels = graph
            .nodes()
            .iter()
            .map(|node| {
                let bottom = bottoms[node.id.slot()];
                let state = NodeHydraulics {
                    node_id: node.name.clone(),
                    water_level_m: bottom + DEFAULT_INITIAL_DEPTH_M,
                    inflow_m3s: 0.0,
                    outflow_m3s: 0.0,
                    bottom_elevation_m: bottom,
                };
                (node.name.clone(), state)
            })
            .collect();

        let mut gate_properties = BTreeMap::new();
        for gate in graph.gates() {
            let sill = bottoms[gate.upstream.slot()];
            let props = estimate_gate(gate, sill, &engine)?;
            gate_properties.insert(gate.key.clone(), props);
        }

        let gate_openings = graph.gates().iter().map(|g| (g.key.clone(), 0.0)).collect();
        let gate_flows = graph.gates().iter().map(|g| (g.key.clone(), 0.0)).collect();

        info!(
            nodes = graph.nodes().len(),
            gates = graph.gates().len(),
            source = source_node,
            "hydraulic network initialised"
        );

        Ok(Self {
            graph,
            source,
            engine,
            gate_properties,
            gate_openings,
            gate_flows,
            node_levels,
        })
    }

    pub fn graph(&self) -> &CanalGraph {
        &self.graph
    }

    pub fn engine(&self) -> &GateHydraulics {
        &self.engine
    }

    /// Primary source node.
    pub fn source_node(&self) -> &str {
        self.graph.node_name(self.source)
    }

    pub fn node(&self, id: &str) -> Option<&NodeHydraulics> {
        self.node_levels.get(id)
    }

    pub fn node_levels(&self) -> &BTreeMap<String, NodeHydraulics> {
        &self.node_levels
    }

    /// Bottom elevation per node (m).
    pub fn canal_inverts(&self) -> BTreeMap<String, f64> {
        self.node_levels
            .iter()
            .map(|(id, n)| (id.clone(), n.bottom_elevation_m))
            .collect()
    }

    pub fn gate_properties(&self, key: &str) -> Option<&GateProperties> {
        self.gate_properties.get(key)
    }

    pub fn gate_keys(&self) -> impl Iterator<Item = &str> {
        self.gate_properties.keys().map(String::as_str)
    }

    pub fn gate_opening(&self, key: &str) -> Option<f64> {
        self.gate_openings.get(key).copied()
    }

    /// Last computed flow through a gate (m³/s).
    pub fn gate_flow(&self, key: &str) -> Option<f64> {
        self.gate_flows.get(key).copied()
    }

    /// Replace the estimated properties of an existing gate; `props.id` is
    /// the gate key.
    pub fn set_gate_properties(&mut self, props: GateProperties) -> NetworkResult<()> {
        if !self.gate_properties.contains_key(&props.id) {
            return Err(NetworkError::UnknownGate { key: props.id });
        }
        props.validate()?;
        let key = props.id.clone();
        if let Some(opening) = self.gate_openings.get_mut(&key) {
            *opening = props.clamp_opening(*opening);
        }
        self.gate_properties.insert(key, props);
        Ok(())
    }

    /// Move a gate without recomputing flows or levels.
    pub fn set_gate_opening(&mut self, key: &str, opening_m: f64) -> NetworkResult<()> {
        if !opening_m.is_finite() {
            return Err(NetworkError::InvalidValue {
                what: "gate opening",
                value: opening_m,
            });
        }
        let props = self
            .gate_properties
            .get(key)
            .ok_or_else(|| NetworkError::UnknownGate { key: key.to_string() })?;
        let clamped = props.clamp_opening(opening_m);
        self.gate_openings.insert(key.to_string(), clamped);
        Ok(())
    }

    /// Record an externally observed water level.
    pub fn set_node_level(&mut self, node: &str, level_m: f64) -> NetworkResult<()> {
        if !level_m.is_finite() {
            return Err(NetworkError::InvalidValue {
                what: "water level",
                value: level_m,
            });
        }
        let state = self
            .node_levels
            .get_mut(node)
            .ok_or_else(|| NetworkError::UnknownNode { id: node.to_string() })?;
        state.water_level_m = level_m;
        debug!(node, level_m, "node level set");
        Ok(())
    }

    /// Flow through the gate `upstream->downstream` at `opening_m`, using the
    /// current node levels. Does not change state.
    pub fn calculate_gate_flow(&self, upstream: &str, downstream: &str, opening_m: f64) -> GateFlowReport {
        let key = gate_key(upstream, downstream);
        let Some(gate) = self.gate_properties.get(&key) else {
            warn!(gate = %key, "flow requested for unknown gate");
            return GateFlowReport::unknown(upstream, downstream, format!("unknown gate {key}"));
        };
        let (Some(up), Some(down)) = (self.node_levels.get(upstream), self.node_levels.get(downstream)) else {
            return GateFlowReport::unknown(upstream, downstream, format!("unknown node on gate {key}"));
        };

        let conditions = HydraulicConditions::new(up.water_level_m, down.water_level_m, opening_m);
        let flow = self.engine.calculate_gate_flow(gate, &conditions);
        if flow.backflow {
            warn!(
                gate = %key,
                upstream_level = up.water_level_m,
                downstream_level = down.water_level_m,
                "backflow condition"
            );
        }

        GateFlowReport {
            upstream: upstream.to_string(),
            downstream: downstream.to_string(),
            flow_rate_m3s: flow.flow_rate_m3s,
            flow_regime: flow.flow_regime,
            velocity_ms: flow.velocity_ms,
            froude_number: flow.froude_number,
            opening_m: flow.opening_m,
            opening_percent: flow.opening_percent,
            upstream_level_m: up.water_level_m,
            downstream_level_m: down.water_level_m,
            backflow: flow.backflow,
            error: None,
        }
    }

    /// Friction head loss (m) along the reach below gate `upstream->downstream`.
    ///
    /// Falls back to a flat 0.1 m when the reach has no geometry or no
    /// uniform-flow solution.
    pub fn calculate_canal_losses(&self, upstream: &str, downstream: &str, flow_rate_m3s: f64) -> f64 {
        let Some(geometry) = self
            .graph
            .gate_between(upstream, downstream)
            .and_then(|g| g.channel)
        else {
            return DEFAULT_CANAL_LOSS_M;
        };
        match reach_friction_loss(&geometry, flow_rate_m3s) {
            Ok(loss) => loss.head_loss_m,
            Err(e) => {
                debug!(upstream, downstream, error = %e, "canal loss fallback");
                DEFAULT_CANAL_LOSS_M
            }
        }
    }

    /// Breadth-first level propagation from `start_node`.
    ///
    /// Each downstream node is assigned once, from the first reach that
    /// reaches it: `level = upstream level - canal loss`, never below the
    /// node's bottom. Returns the visit order, `start_node` first.
    pub fn propagate_levels_downstream(&mut self, start_node: &str, flow_rate_m3s: f64) -> Vec<String> {
        let Some(start) = self.graph.node_by_name(start_node).map(|n| n.id) else {
            warn!(node = start_node, "propagation from unknown node");
            return Vec::new();
        };

        let mut visited = HashSet::from([start]);
        let mut order = vec![start_node.to_string()];
        let mut queue = VecDeque::from([start]);

        while let Some(node) = queue.pop_front() {
            let up_name = self.graph.node_name(node).to_string();
            let up_level = self.level_of(&up_name);

            for gate_id in self.graph.outgoing(node) {
                let Some(gate) = self.graph.gate(*gate_id) else {
                    continue;
                };
                if !visited.insert(gate.downstream) {
                    continue;
                }
                let down_name = self.graph.node_name(gate.downstream).to_string();
                let loss = self.calculate_canal_losses(&up_name, &down_name, flow_rate_m3s);

                if let Some(state) = self.node_levels.get_mut(&down_name) {
                    state.water_level_m = (up_level - loss).max(state.bottom_elevation_m);
                    debug!(node = %down_name, level = state.water_level_m, loss, "level propagated");
                }
                order.push(down_name);
                queue.push_back(gate.downstream);
            }
        }
        order
    }

    /// Single-step backwater estimate for the reaches entering `start_node`.
    ///
    /// Where the known downstream depth exceeds normal depth the upstream
    /// level is raised by the friction slope at that depth over the reach
    /// length; otherwise the upstream node sits at normal depth. Returns the
    /// estimated levels including `start_node` itself. Does not change state.
    pub fn calculate_backwater_curve(
        &self,
        start_node: &str,
        known_level_m: f64,
        flow_rate_m3s: f64,
    ) -> BTreeMap<String, f64> {
        let mut levels = BTreeMap::new();
        let Some(node) = self.graph.node_by_name(start_node) else {
            warn!(node = start_node, "backwater from unknown node");
            return levels;
        };
        levels.insert(start_node.to_string(), known_level_m);
        let depth = known_level_m - self.bottom_of(start_node);

        for gate_id in self.graph.incoming(node.id) {
            let Some(gate) = self.graph.gate(*gate_id) else {
                continue;
            };
            let up_name = self.graph.node_name(gate.upstream);
            let estimate = match gate.channel {
                None => known_level_m + DEFAULT_CANAL_LOSS_M,
                Some(geometry) => match normal_depth(&geometry, flow_rate_m3s) {
                    Ok(yn) if depth > yn => {
                        known_level_m + friction_slope(&geometry, depth, flow_rate_m3s) * geometry.length_m
                    }
                    Ok(yn) => self.bottom_of(up_name) + yn,
                    Err(_) => known_level_m + DEFAULT_CANAL_LOSS_M,
                },
            };
            levels.insert(up_name.to_string(), estimate);
        }
        levels
    }

    /// One quasi-steady step for a set of gate moves.
    ///
    /// 1. flow through every requested gate at the current levels
    /// 2. net inflow minus outflow per node, other gates held at their positions
    /// 3. storage update `dh = net * 60 s / 1000 m²` at every node where
    ///    |net| > 0.1 m³/s, sources included
    /// 4. downstream propagation from the source using its new outflow
    /// 5. reach diagnostics
    pub fn simulate_gate_operation(&mut self, operations: &[GateOperation]) -> SimulationResult {
        let mut warnings = Vec::new();
        let mut reports = Vec::with_capacity(operations.len());
        let mut requested = HashSet::new();

        for op in operations {
            let report = self.calculate_gate_flow(&op.upstream, &op.downstream, op.opening_m);
            match &report.error {
                Some(error) => warnings.push(error.clone()),
                None => {
                    let key = report.key();
                    if report.backflow {
                        warnings.push(format!(
                            "backflow at gate {key}: downstream level {:.3} m is above upstream level {:.3} m",
                            report.downstream_level_m, report.upstream_level_m
                        ));
                    }
                    self.gate_openings.insert(key.clone(), report.opening_m);
                    self.gate_flows.insert(key.clone(), report.flow_rate_m3s);
                    requested.insert(key);
                }
            }
            reports.push(report);
        }

        self.update_flows(&requested);
        self.accumulate_node_flows();
        self.apply_mass_balance();

        let source_name = self.source_node().to_string();
        let source_outflow = self.node_levels.get(&source_name).map_or(0.0, |n| n.outflow_m3s);
        self.propagate_levels_downstream(&source_name, source_outflow);

        let reach_hydraulics = self.reach_hydraulics();
        debug!(
            operations = operations.len(),
            warnings = warnings.len(),
            source_outflow,
            "simulation step"
        );

        SimulationResult {
            operations: reports,
            node_levels: self.node_levels.clone(),
            reach_hydraulics,
            warnings,
        }
    }

    /// Move one gate and run a simulation step for it.
    pub fn apply_gate_opening(&mut self, key: &str, opening_m: f64) -> GateFlowReport {
        let Some((upstream, downstream)) = self.endpoints(key) else {
            let (up, down) = key.split_once("->").unwrap_or((key, ""));
            warn!(gate = key, "unknown gate");
            return GateFlowReport::unknown(up, down, format!("unknown gate {key}"));
        };
        let op = GateOperation::new(upstream, downstream, opening_m);
        let mut result = self.simulate_gate_operation(std::slice::from_ref(&op));
        match result.operations.pop() {
            Some(report) => report,
            None => GateFlowReport::unknown(&op.upstream, &op.downstream, format!("no result for gate {key}")),
        }
    }

    /// Recompute every gate flow at its current opening and the node
    /// inflow/outflow totals. Levels are not changed.
    pub fn refresh_flows(&mut self) {
        self.update_flows(&HashSet::new());
        self.accumulate_node_flows();
    }

    /// Velocity, travel time and Froude number for every reach.
    pub fn reach_hydraulics(&self) -> Vec<ReachHydraulics> {
        self.graph
            .gates()
            .iter()
            .map(|gate| {
                let up = self.graph.node_name(gate.upstream);
                let down = self.graph.node_name(gate.downstream);
                let flow = self.gate_flows.get(&gate.key).copied().unwrap_or(0.0);

                let uniform = gate.channel.and_then(|geometry| {
                    reach_friction_loss(&geometry, flow)
                        .ok()
                        .filter(|loss| loss.normal_depth_m > 0.0)
                        .map(|loss| (geometry, loss))
                });
                let velocity = uniform.map(|(_, loss)| loss.velocity_ms);
                let travel_time = uniform.and_then(|(geometry, loss)| {
                    (loss.velocity_ms > 0.0).then(|| geometry.length_m / loss.velocity_ms)
                });
                let froude = uniform.map(|(geometry, loss)| {
                    let top_width =
                        geometry.bottom_width_m + 2.0 * geometry.side_slope * loss.normal_depth_m;
                    let hydraulic_depth = loss.area_m2 / top_width;
                    finite_or_zero(loss.velocity_ms / (G_MPS2 * hydraulic_depth).sqrt())
                });

                ReachHydraulics {
                    upstream: up.to_string(),
                    downstream: down.to_string(),
                    flow_rate_m3s: flow,
                    upstream_level_m: self.level_of(up),
                    downstream_level_m: self.level_of(down),
                    head_loss_m: self.calculate_canal_losses(up, down, flow),
                    velocity_ms: velocity,
                    travel_time_s: travel_time,
                    froude_number: froude,
                }
            })
            .collect()
    }

    pub fn snapshot(&self) -> NetworkSnapshot {
        let reach_velocities = self
            .reach_hydraulics()
            .into_iter()
            .filter_map(|r| {
                let key = gate_key(&r.upstream, &r.downstream);
                r.velocity_ms.map(|v| (key, v))
            })
            .collect();

        NetworkSnapshot {
            gate_positions: self.gate_openings.clone(),
            node_levels: self
                .node_levels
                .iter()
                .map(|(id, n)| (id.clone(), n.water_level_m))
                .collect(),
            gate_flows: self.gate_flows.clone(),
            reach_velocities,
        }
    }

    /// Opening needed for `target_flow_m3s` through `upstream->downstream`
    /// at the current levels.
    pub fn required_opening(&self, upstream: &str, downstream: &str, target_flow_m3s: f64) -> OpeningRequirement {
        let key = gate_key(upstream, downstream);
        let Some(gate) = self.gate_properties.get(&key) else {
            return OpeningRequirement::infeasible(target_flow_m3s, FlowRegime::Closed, format!("unknown gate {key}"));
        };
        GateOpeningSolver::new(&self.engine).calculate_required_opening(
            target_flow_m3s,
            gate,
            self.level_of(upstream),
            self.level_of(downstream),
        )
    }

    /// Batch opening schedule for target flows keyed by gate.
    pub fn required_openings(&self, targets: &BTreeMap<String, f64>) -> BTreeMap<String, OpeningRequirement> {
        let mut unknown = BTreeMap::new();
        let mut requests = Vec::with_capacity(targets.len());
        for (key, target) in targets {
            match (self.endpoints(key), self.gate_properties.get(key)) {
                (Some((upstream, downstream)), Some(gate)) => requests.push(GateScheduleRequest {
                    upstream,
                    downstream,
                    gate: gate.clone(),
                    target_flow_m3s: *target,
                }),
                _ => {
                    unknown.insert(
                        key.clone(),
                        OpeningRequirement::infeasible(*target, FlowRegime::Closed, format!("unknown gate {key}")),
                    );
                }
            }
        }

        let water_levels: HashMap<String, f64> = self
            .node_levels
            .iter()
            .map(|(id, n)| (id.clone(), n.water_level_m))
            .collect();
        let mut schedule =
            GateOpeningSolver::new(&self.engine).calculate_gate_schedule(&requests, &water_levels);
        schedule.append(&mut unknown);
        schedule
    }

    /// `(upstream, downstream)` node names of a gate key.
    pub fn endpoints(&self, key: &str) -> Option<(String, String)> {
        let gate = self.graph.gate_by_key(key)?;
        Some((
            self.graph.node_name(gate.upstream).to_string(),
            self.graph.node_name(gate.downstream).to_string(),
        ))
    }

    fn level_of(&self, node: &str) -> f64 {
        self.node_levels.get(node).map_or(0.0, |n| n.water_level_m)
    }

    fn bottom_of(&self, node: &str) -> f64 {
        self.node_levels.get(node).map_or(0.0, |n| n.bottom_elevation_m)
    }

    /// Re-evaluate gates not in `skip` at their current openings.
    fn update_flows(&mut self, skip: &HashSet<String>) {
        let updates: Vec<(String, f64)> = self
            .graph
            .gates()
            .iter()
            .filter(|gate| !skip.contains(&gate.key))
            .map(|gate| {
                let opening = self.gate_openings.get(&gate.key).copied().unwrap_or(0.0);
                let up = self.graph.node_name(gate.upstream);
                let down = self.graph.node_name(gate.downstream);
                (gate.key.clone(), self.calculate_gate_flow(up, down, opening).flow_rate_m3s)
            })
            .collect();
        self.gate_flows.extend(updates);
    }

    fn accumulate_node_flows(&mut self) {
        for state in self.node_levels.values_mut() {
            state.inflow_m3s = 0.0;
            state.outflow_m3s = 0.0;
        }
        for gate in self.graph.gates() {
            let flow = self.gate_flows.get(&gate.key).copied().unwrap_or(0.0);
            if let Some(up) = self.node_levels.get_mut(self.graph.node_name(gate.upstream)) {
                up.outflow_m3s += flow;
            }
            if let Some(down) = self.node_levels.get_mut(self.graph.node_name(gate.downstream)) {
                down.inflow_m3s += flow;
            }
        }
    }

    fn apply_mass_balance(&mut self) {
        for state in self.node_levels.values_mut() {
            let net = state.net_flow_m3s();
            if net.abs() > NET_FLOW_THRESHOLD_M3S {
                let dh = net * MASS_BALANCE_DT_S / ASSUMED_SURFACE_AREA_M2;
                state.water_level_m = (state.water_level_m + dh).max(state.bottom_elevation_m);
            }
        }
    }
}

/// Bottom elevation per node index.
///
/// Unknown bottoms are estimated downstream from the source (then any other
/// unvisited roots): bed slope times reach length when the reach has
/// geometry, otherwise a fixed drop. Unknown roots sit at the datum.
fn estimate_bottoms(graph: &CanalGraph, source: NodeId) -> Vec<f64> {
    let mut bottoms: Vec<Option<f64>> = graph.nodes().iter().map(|n| n.bottom_elevation_m).collect();
    let mut visited = vec![false; bottoms.len()];

    let roots = std::iter::once(source)
        .chain(graph.sources())
        .chain(graph.nodes().iter().map(|n| n.id));

    for root in roots {
        let r = root.slot();
        if visited[r] {
            continue;
        }
        visited[r] = true;
        bottoms[r].get_or_insert(DEFAULT_DATUM_M);

        let mut queue = VecDeque::from([root]);
        while let Some(node) = queue.pop_front() {
            let up_bottom = bottoms[node.slot()].unwrap_or(DEFAULT_DATUM_M);
            for gate_id in graph.outgoing(node) {
                let Some(gate) = graph.gate(*gate_id) else {
                    continue;
                };
                let d = gate.downstream.slot();
                if bottoms[d].is_none() {
                    let drop = gate
                        .channel
                        .map_or(DEFAULT_BOTTOM_DROP_M, |c| c.bed_slope * c.length_m);
                    bottoms[d] = Some(up_bottom - drop);
                }
                if !visited[d] {
                    visited[d] = true;
                    queue.push_back(gate.downstream);
                }
            }
        }
    }

    bottoms.into_iter().map(|b| b.unwrap_or(DEFAULT_DATUM_M)).collect()
}

/// Sluice sized from nominal capacity, sill on the upstream bottom.
fn estimate_gate(gate: &GateEdge, sill_m: f64, engine: &GateHydraulics) -> NetworkResult<GateProperties> {
    let width = (gate.capacity_m3s / 2.0).max(1.0);
    let props = GateProperties::new(
        gate.key.clone(),
        GateType::Sluice,
        width,
        ESTIMATED_GATE_HEIGHT_M,
        sill_m,
        engine.coefficients(),
    )?;
    Ok(props)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_graph::{ChannelGeometry, GraphBuilder};

    fn reach(length_m: f64) -> ChannelGeometry {
        ChannelGeometry {
            bottom_width_m: 4.0,
            depth_m: 2.5,
            side_slope: 1.5,
            manning_n: 0.025,
            bed_slope: 0.0002,
            length_m,
        }
    }

    /// R -> A -> B, R -> C; only R has a surveyed bottom.
    fn network() -> HydraulicNetwork {
        let mut b = GraphBuilder::new();
        let r = b.add_node_with_elevation("R", 100.0);
        let a = b.add_node("A");
        let bn = b.add_node("B");
        let c = b.add_node("C");
        let ra = b.add_gate(r, a, 10.0);
        b.add_gate(a, bn, 4.0);
        b.add_gate(r, c, 1.0);
        b.set_channel(ra, reach(2500.0));
        HydraulicNetwork::new(b.build().unwrap(), "R", GateHydraulics::default()).unwrap()
    }

    #[test]
    fn bottoms_estimated_downstream() {
        let net = network();
        let inverts = net.canal_inverts();
        assert_eq!(inverts["R"], 100.0);
        assert!((inverts["A"] - 99.5).abs() < 1e-12); // 0.0002 * 2500
        assert!((inverts["B"] - 99.0).abs() < 1e-12);
        assert!((inverts["C"] - 99.5).abs() < 1e-12);
        assert!((net.node("A").unwrap().depth_m() - DEFAULT_INITIAL_DEPTH_M).abs() < 1e-12);
    }

    #[test]
    fn gates_estimated_from_capacity() {
        let net = network();
        let big = net.gate_properties("R->A").unwrap();
        assert_eq!(big.gate_type, GateType::Sluice);
        assert_eq!(big.width_m, 5.0);
        assert_eq!(big.sill_elevation_m, 100.0);
        assert_eq!(net.gate_properties("R->C").unwrap().width_m, 1.0);
        assert_eq!(net.gate_opening("R->A"), Some(0.0));
    }

    #[test]
    fn unknown_source_rejected() {
        let mut b = GraphBuilder::new();
        b.add_node("R");
        let err = HydraulicNetwork::new(b.build().unwrap(), "X", GateHydraulics::default()).unwrap_err();
        assert!(matches!(err, NetworkError::UnknownNode { .. }));
    }

    #[test]
    fn unknown_gate_degrades() {
        let net = network();
        let report = net.calculate_gate_flow("A", "R", 1.0);
        assert_eq!(report.flow_rate_m3s, 0.0);
        assert!(report.error.unwrap().contains("A->R"));
    }

    #[test]
    fn canal_losses_manning_or_default() {
        let net = network();
        let loss = net.calculate_canal_losses("R", "A", 8.0);
        assert!((loss - 0.0002 * 2500.0).abs() < 1e-3);
        assert_eq!(net.calculate_canal_losses("A", "B", 8.0), DEFAULT_CANAL_LOSS_M);
        assert_eq!(net.calculate_canal_losses("X", "Y", 8.0), DEFAULT_CANAL_LOSS_M);
    }

    #[test]
    fn propagation_visits_each_node_once() {
        let mut net = network();
        net.set_node_level("R", 103.0).unwrap();
        let order = net.propagate_levels_downstream("R", 0.0);
        assert_eq!(order, vec!["R", "A", "C", "B"]);
        // zero flow: no friction on the geometric reach, flat loss elsewhere
        assert!((net.node("A").unwrap().water_level_m - 103.0).abs() < 1e-9);
        assert!((net.node("B").unwrap().water_level_m - 102.9).abs() < 1e-9);
        assert!((net.node("C").unwrap().water_level_m - 102.9).abs() < 1e-9);
    }

    #[test]
    fn propagation_never_below_bottom() {
        let mut net = network();
        net.set_node_level("R", 100.05).unwrap();
        net.propagate_levels_downstream("R", 0.0);
        let c = net.node("C").unwrap();
        assert!(c.water_level_m >= c.bottom_elevation_m);
    }

    #[test]
    fn backwater_above_normal_depth_adds_slope_term() {
        let net = network();
        let yn = normal_depth(&reach(2500.0), 5.0).unwrap();
        let known = 99.5 + yn + 1.0;
        let levels = net.calculate_backwater_curve("A", known, 5.0);
        assert_eq!(levels["A"], known);
        let rise = levels["R"] - known;
        assert!(rise > 0.0 && rise < 0.0002 * 2500.0);
    }

    #[test]
    fn backwater_below_normal_depth_uses_normal_depth() {
        let net = network();
        let yn = normal_depth(&reach(2500.0), 5.0).unwrap();
        let levels = net.calculate_backwater_curve("A", 99.5 + 0.5 * yn, 5.0);
        assert!((levels["R"] - (100.0 + yn)).abs() < 1e-9);
    }

    #[test]
    fn backwater_without_geometry_adds_default() {
        let net = network();
        let levels = net.calculate_backwater_curve("B", 100.2, 2.0);
        assert!((levels["A"] - 100.3).abs() < 1e-12);
        assert!(net.calculate_backwater_curve("nowhere", 1.0, 1.0).is_empty());
    }

    #[test]
    fn simulate_moves_gate_and_balances_flow() {
        let mut net = network();
        net.set_node_level("R", 103.0).unwrap();
        net.set_node_level("A", 100.2).unwrap();

        let result = net.simulate_gate_operation(&[
            GateOperation::new("R", "A", 0.5),
            GateOperation::new("Q", "Z", 1.0),
        ]);

        assert_eq!(result.operations.len(), 2);
        assert!(result.operations[0].flow_rate_m3s > 0.0);
        assert!(result.operations[1].error.is_some());
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(net.gate_opening("R->A"), Some(0.5));

        let source = &result.node_levels["R"];
        assert!((source.outflow_m3s - result.operations[0].flow_rate_m3s).abs() < 1e-12);
        assert!(source.outflow_m3s > NET_FLOW_THRESHOLD_M3S);
        // the source drains like any other node
        let drained = 103.0 - source.outflow_m3s * MASS_BALANCE_DT_S / ASSUMED_SURFACE_AREA_M2;
        assert!((source.water_level_m - drained).abs() < 1e-9);
        assert_eq!(result.reach_hydraulics.len(), 3);
    }

    #[test]
    fn reach_diagnostics_need_geometry() {
        let mut net = network();
        net.set_node_level("R", 103.0).unwrap();
        net.set_node_level("A", 100.2).unwrap();
        net.apply_gate_opening("R->A", 0.5);

        let reaches = net.reach_hydraulics();
        let ra = reaches.iter().find(|r| r.downstream == "A").unwrap();
        assert!(ra.velocity_ms.unwrap() > 0.0);
        assert!(ra.travel_time_s.unwrap() > 0.0);
        assert!(ra.froude_number.unwrap() < 1.0);
        let ab = reaches.iter().find(|r| r.downstream == "B").unwrap();
        assert!(ab.velocity_ms.is_none());

        let snapshot = net.snapshot();
        assert!(snapshot.reach_velocities.contains_key("R->A"));
        assert!(!snapshot.reach_velocities.contains_key("A->B"));
        assert_eq!(snapshot.gate_positions["R->A"], 0.5);
    }

    #[test]
    fn required_openings_report_unknown_keys() {
        let mut net = network();
        net.set_node_level("R", 103.0).unwrap();
        let targets = BTreeMap::from([("R->A".to_string(), 2.0), ("R->Z".to_string(), 1.0)]);
        let schedule = net.required_openings(&targets);
        assert!(schedule["R->A"].is_feasible);
        assert!(!schedule["R->Z"].is_feasible);
    }

    #[test]
    fn set_properties_and_opening_validate() {
        let mut net = network();
        let props = GateProperties::new("R->A", GateType::Radial, 4.0, 3.0, 100.0, net.engine().coefficients())
            .unwrap();
        net.set_gate_properties(props).unwrap();
        assert_eq!(net.gate_properties("R->A").unwrap().gate_type, GateType::Radial);

        net.set_gate_opening("R->A", 9.0).unwrap();
        assert_eq!(net.gate_opening("R->A"), Some(3.0));
        assert!(net.set_gate_opening("R->A", f64::NAN).is_err());
        assert!(net.set_gate_opening("X->Y", 1.0).is_err());
        assert!(net.set_node_level("X", 1.0).is_err());
    }
}
