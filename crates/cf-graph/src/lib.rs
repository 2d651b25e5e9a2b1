//! cf-graph: canal network topology for canalflow.
//!
//! Provides:
//! - Nodes (reservoirs, junctions, delivery zones) and directed gate edges
//! - Optional trapezoidal channel geometry per gate reach
//! - Incremental builder with structural validation
//! - Upstream/downstream adjacency and breadth-first reachability
//!
//! # Example
//!
//! ```
//! use cf_graph::GraphBuilder;
//!
//! let mut builder = GraphBuilder::new();
//! let res = builder.add_node("reservoir");
//! let zone = builder.add_node("zone_a");
//! builder.add_gate(res, zone, 12.0);
//! let graph = builder.build().unwrap();
//!
//! assert_eq!(graph.nodes().len(), 2);
//! assert!(graph.gate_by_key("reservoir->zone_a").is_some());
//! ```

pub mod builder;
pub mod error;
pub mod graph;
pub(crate) mod validate;

pub use builder::GraphBuilder;
pub use error::GraphError;
pub use graph::{gate_key, CanalGraph, CanalNode, ChannelGeometry, GateEdge};
