//! Project schema definitions.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub version: u32,
    pub name: String,
    pub network: NetworkDef,
    #[serde(default)]
    pub controller: ControllerDef,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkDef {
    /// Primary source (reservoir) node; downstream propagation starts here.
    pub source_node: String,
    #[serde(default)]
    pub nodes: Vec<NodeDef>,
    #[serde(default)]
    pub gates: Vec<GateDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeDef {
    pub id: String,
    /// Canal bottom elevation (m); estimated from the source when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottom_elevation_m: Option<f64>,
    /// Initial water level (m); bottom + 1 m when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_level_m: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateDef {
    pub upstream: String,
    pub downstream: String,
    /// Nominal maximum flow (m³/s)
    pub capacity_m3s: f64,
    /// Gate hardware; estimated from capacity when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<GatePropsDef>,
    /// Reach immediately downstream of the gate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_opening_m: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GateKindDef {
    Sluice,
    Radial,
    ButterflyValve,
    Check,
    Weir,
    Orifice,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatePropsDef {
    #[serde(rename = "type")]
    pub kind: GateKindDef,
    pub width_m: f64,
    pub height_m: f64,
    /// Defaults to the upstream canal bottom.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sill_elevation_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discharge_coefficient: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contraction_coefficient: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_opening_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_opening_m: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ChannelDef {
    pub bottom_width_m: f64,
    pub depth_m: f64,
    pub side_slope: f64,
    pub manning_n: f64,
    pub bed_slope: f64,
    pub length_m: f64,
}

/// Transition controller settings. Every field falls back to its default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControllerDef {
    pub max_gate_speed_percent_per_sec: f64,
    pub max_flow_change_m3s_per_min: f64,
    pub max_level_change_m_per_min: f64,
    pub max_velocity_m_per_s: f64,
    pub min_transition_time_s: f64,
    pub max_transition_time_s: f64,
    pub oscillation_damping_factor: f64,
    pub emergency_stop_threshold_m: f64,
    pub monitoring_interval_s: f64,
    pub priority_zones: Vec<String>,
}

impl Default for ControllerDef {
    fn default() -> Self {
        Self {
            max_gate_speed_percent_per_sec: 1.0,
            max_flow_change_m3s_per_min: 2.0,
            max_level_change_m_per_min: 0.1,
            max_velocity_m_per_s: 2.0,
            min_transition_time_s: 60.0,
            max_transition_time_s: 3600.0,
            oscillation_damping_factor: 0.7,
            emergency_stop_threshold_m: 0.5,
            monitoring_interval_s: 5.0,
            priority_zones: Vec::new(),
        }
    }
}
