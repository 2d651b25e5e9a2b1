//! cf-hydraulics: gate and channel hydraulics for canalflow.
//!
//! Provides:
//! - Gate geometry/type descriptions and injected coefficient tables
//! - The gate hydraulics engine (flow through a gate under free, submerged
//!   and weir regimes)
//! - The gate opening solver (inverse problem: opening for a target flow)
//! - Manning's-equation helpers for trapezoidal channel reaches
//!
//! Everything here is a pure function of its inputs.
//!
//! # Example
//!
//! ```
//! use cf_hydraulics::{GateCoefficients, GateHydraulics, GateProperties, GateType, HydraulicConditions};
//!
//! let coefficients = GateCoefficients::default();
//! let gate = GateProperties::new("R->Z", GateType::Sluice, 3.0, 2.0, 98.0, &coefficients).unwrap();
//! let engine = GateHydraulics::new(coefficients);
//!
//! let flow = engine.calculate_gate_flow(
//!     &gate,
//!     &HydraulicConditions::new(101.0, 98.5, 0.5),
//! );
//! assert!(flow.flow_rate_m3s > 0.0);
//! ```

pub mod channel;
pub mod coefficients;
pub mod engine;
pub mod error;
pub mod gate;
pub mod solver;

pub use channel::{friction_slope, normal_depth, reach_friction_loss, uniform_velocity, ChannelLoss};
pub use coefficients::{GateCoefficients, TypeCoefficients};
pub use engine::{free_orifice_discharge, GateFlow, GateHydraulics};
pub use error::{HydraulicsError, HydraulicsResult};
pub use gate::{FlowRegime, GateProperties, GateType, HydraulicConditions};
pub use solver::{GateOpeningSolver, GateScheduleRequest, OpeningRequirement};
