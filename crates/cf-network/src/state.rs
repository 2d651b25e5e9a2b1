//! Node state and the report types returned by network queries.

use std::collections::BTreeMap;

use cf_hydraulics::FlowRegime;
use serde::{Deserialize, Serialize};

/// Mutable hydraulic state of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeHydraulics {
    pub node_id: String,
    /// Water surface elevation (m)
    pub water_level_m: f64,
    pub inflow_m3s: f64,
    pub outflow_m3s: f64,
    /// Canal bottom elevation (m)
    pub bottom_elevation_m: f64,
}

impl NodeHydraulics {
    pub fn depth_m(&self) -> f64 {
        self.water_level_m - self.bottom_elevation_m
    }

    pub fn net_flow_m3s(&self) -> f64 {
        self.inflow_m3s - self.outflow_m3s
    }
}

/// Flow through one gate at the current network levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateFlowReport {
    pub upstream: String,
    pub downstream: String,
    pub flow_rate_m3s: f64,
    pub flow_regime: FlowRegime,
    pub velocity_ms: f64,
    pub froude_number: f64,
    pub opening_m: f64,
    pub opening_percent: f64,
    pub upstream_level_m: f64,
    pub downstream_level_m: f64,
    #[serde(default)]
    pub backflow: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GateFlowReport {
    pub(crate) fn unknown(upstream: &str, downstream: &str, error: String) -> Self {
        Self {
            upstream: upstream.to_string(),
            downstream: downstream.to_string(),
            flow_rate_m3s: 0.0,
            flow_regime: FlowRegime::Closed,
            velocity_ms: 0.0,
            froude_number: 0.0,
            opening_m: 0.0,
            opening_percent: 0.0,
            upstream_level_m: 0.0,
            downstream_level_m: 0.0,
            backflow: false,
            error: Some(error),
        }
    }

    pub fn key(&self) -> String {
        cf_graph::gate_key(&self.upstream, &self.downstream)
    }
}

/// Derived diagnostics for the reach downstream of a gate.
///
/// Channel quantities are `None` when the reach has no registered geometry
/// or no uniform-flow solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReachHydraulics {
    pub upstream: String,
    pub downstream: String,
    pub flow_rate_m3s: f64,
    pub upstream_level_m: f64,
    pub downstream_level_m: f64,
    pub head_loss_m: f64,
    /// Mean channel velocity at normal depth (m/s)
    pub velocity_ms: Option<f64>,
    pub travel_time_s: Option<f64>,
    pub froude_number: Option<f64>,
}

/// A requested gate position for `simulate_gate_operation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateOperation {
    pub upstream: String,
    pub downstream: String,
    pub opening_m: f64,
}

impl GateOperation {
    pub fn new(upstream: impl Into<String>, downstream: impl Into<String>, opening_m: f64) -> Self {
        Self {
            upstream: upstream.into(),
            downstream: downstream.into(),
            opening_m,
        }
    }
}

/// Outcome of one quasi-steady simulation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub operations: Vec<GateFlowReport>,
    pub node_levels: BTreeMap<String, NodeHydraulics>,
    pub reach_hydraulics: Vec<ReachHydraulics>,
    pub warnings: Vec<String>,
}

/// Point-in-time view of the network used by execution monitoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    /// Gate opening (m) by `"up->down"` key
    pub gate_positions: BTreeMap<String, f64>,
    /// Water level (m) by node id
    pub node_levels: BTreeMap<String, f64>,
    /// Last computed gate flow (m³/s) by key
    pub gate_flows: BTreeMap<String, f64>,
    /// Mean channel velocity (m/s) by key, for reaches with geometry
    pub reach_velocities: BTreeMap<String, f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_and_net_flow() {
        let node = NodeHydraulics {
            node_id: "A".into(),
            water_level_m: 101.2,
            inflow_m3s: 4.0,
            outflow_m3s: 1.5,
            bottom_elevation_m: 100.0,
        };
        assert!((node.depth_m() - 1.2).abs() < 1e-12);
        assert_eq!(node.net_flow_m3s(), 2.5);
    }

    #[test]
    fn unknown_report_is_zero_valued() {
        let report = GateFlowReport::unknown("A", "B", "no gate".into());
        assert_eq!(report.flow_rate_m3s, 0.0);
        assert_eq!(report.key(), "A->B");
        assert_eq!(report.error.as_deref(), Some("no gate"));
    }
}
