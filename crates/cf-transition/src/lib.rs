//! cf-transition: safe, gradual gate transitions.
//!
//! Turns target gate openings into a coordinated, speed-limited schedule
//! and executes it on a tokio runtime while a monitor watches water levels
//! and velocities for oscillation and shock.
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//!
//! use cf_graph::GraphBuilder;
//! use cf_hydraulics::GateHydraulics;
//! use cf_network::HydraulicNetwork;
//! use cf_transition::{
//!     GradualTransitionController, TransitionConstraints, TransitionRequest, TransitionStrategy,
//! };
//!
//! let mut builder = GraphBuilder::new();
//! let r = builder.add_node_with_elevation("reservoir", 100.0);
//! let z = builder.add_node("zone");
//! builder.add_gate(r, z, 4.0);
//! let mut network =
//!     HydraulicNetwork::new(builder.build().unwrap(), "reservoir", GateHydraulics::default()).unwrap();
//! network.set_node_level("reservoir", 102.0).unwrap();
//!
//! let controller =
//!     GradualTransitionController::new(network, TransitionConstraints::default()).unwrap();
//! let request = TransitionRequest {
//!     gate_transitions: BTreeMap::from([("reservoir->zone".to_string(), 0.5)]),
//!     strategy: TransitionStrategy::SCurve,
//!     ..Default::default()
//! };
//! let plan = controller.create_transition_plan(&request).unwrap();
//! let steps = &plan.gate_plans["reservoir->zone"].steps;
//! assert!(steps.len() >= 10);
//! assert_eq!(steps.last().unwrap().target_position_m, 0.5);
//! ```

pub mod constraints;
pub mod controller;
pub mod error;
pub mod monitor;
pub mod plan;
pub mod strategy;

pub use constraints::TransitionConstraints;
pub use controller::{EmergencyStop, ExecutionResult, GradualTransitionController};
pub use error::{TransitionError, TransitionResult};
pub use monitor::{
    classify_oscillation, count_sign_changes, Anomaly, AnomalyKind, HydraulicCondition, Observation,
    SystemMonitor,
};
pub use plan::{
    create_transition_plan, GateTransitionPlan, RiskLevel, SystemImpact, SystemTransitionPlan,
    TransitionPhase, TransitionRequest, TransitionStep,
};
pub use strategy::TransitionStrategy;
