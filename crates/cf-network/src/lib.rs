//! cf-network: the hydraulic state of a whole canal network.
//!
//! Owns node water levels and gate positions, evaluates gate flows through
//! the hydraulics engine, and runs the single-pass propagation, backwater
//! and quasi-steady simulation algorithms used by the transition controller.
//!
//! # Example
//!
//! ```
//! use cf_graph::GraphBuilder;
//! use cf_hydraulics::GateHydraulics;
//! use cf_network::{GateOperation, HydraulicNetwork};
//!
//! let mut builder = GraphBuilder::new();
//! let r = builder.add_node_with_elevation("reservoir", 100.0);
//! let z = builder.add_node("zone");
//! builder.add_gate(r, z, 6.0);
//!
//! let mut network =
//!     HydraulicNetwork::new(builder.build().unwrap(), "reservoir", GateHydraulics::default()).unwrap();
//! network.set_node_level("reservoir", 102.5).unwrap();
//!
//! let step = network.simulate_gate_operation(&[GateOperation::new("reservoir", "zone", 0.4)]);
//! assert!(step.operations[0].flow_rate_m3s > 0.0);
//! ```

pub mod error;
pub mod network;
pub mod state;
pub mod topology;

pub use error::{NetworkError, NetworkResult};
pub use network::HydraulicNetwork;
pub use state::{
    GateFlowReport, GateOperation, NetworkSnapshot, NodeHydraulics, ReachHydraulics,
    SimulationResult,
};
pub use topology::build_network;
