//! Compile a project network definition into a `HydraulicNetwork`.

use std::collections::HashMap;

use cf_graph::{gate_key, ChannelGeometry, GraphBuilder};
use cf_hydraulics::{GateCoefficients, GateHydraulics, GateProperties, GateType};
use cf_project::{GateDef, GateKindDef, NetworkDef};
use tracing::debug;

use crate::error::{NetworkError, NetworkResult};
use crate::network::HydraulicNetwork;

pub fn gate_type(kind: GateKindDef) -> GateType {
    match kind {
        GateKindDef::Sluice => GateType::Sluice,
        GateKindDef::Radial => GateType::Radial,
        GateKindDef::ButterflyValve => GateType::ButterflyValve,
        GateKindDef::Check => GateType::Check,
        GateKindDef::Weir => GateType::Weir,
        GateKindDef::Orifice => GateType::Orifice,
    }
}

/// Build the topology, initial levels, gate hardware and gate positions.
///
/// Gate flows and node inflow/outflow are evaluated once at the initial
/// state; levels are left as given.
pub fn build_network(def: &NetworkDef, coefficients: GateCoefficients) -> NetworkResult<HydraulicNetwork> {
    let mut builder = GraphBuilder::new();
    let mut ids = HashMap::new();
    for node in &def.nodes {
        let id = match node.bottom_elevation_m {
            Some(bottom) => builder.add_node_with_elevation(node.id.clone(), bottom),
            None => builder.add_node(node.id.clone()),
        };
        ids.insert(node.id.as_str(), id);
    }

    for gate in &def.gates {
        let lookup = |name: &str| {
            ids.get(name)
                .copied()
                .ok_or_else(|| NetworkError::UnknownNode { id: name.to_string() })
        };
        let edge = builder.add_gate(lookup(&gate.upstream)?, lookup(&gate.downstream)?, gate.capacity_m3s);
        if let Some(c) = &gate.channel {
            builder.set_channel(
                edge,
                ChannelGeometry {
                    bottom_width_m: c.bottom_width_m,
                    depth_m: c.depth_m,
                    side_slope: c.side_slope,
                    manning_n: c.manning_n,
                    bed_slope: c.bed_slope,
                    length_m: c.length_m,
                },
            );
        }
    }

    let graph = builder.build()?;
    let mut network = HydraulicNetwork::new(graph, &def.source_node, GateHydraulics::new(coefficients))?;

    for gate in &def.gates {
        if let Some(props) = gate_properties(gate, &network)? {
            network.set_gate_properties(props)?;
        }
    }
    for node in &def.nodes {
        if let Some(level) = node.initial_level_m {
            network.set_node_level(&node.id, level)?;
        }
    }
    for gate in &def.gates {
        if let Some(opening) = gate.initial_opening_m {
            network.set_gate_opening(&gate_key(&gate.upstream, &gate.downstream), opening)?;
        }
    }

    network.refresh_flows();
    debug!(source = %def.source_node, "network compiled");
    Ok(network)
}

fn gate_properties(gate: &GateDef, network: &HydraulicNetwork) -> NetworkResult<Option<GateProperties>> {
    let Some(def) = &gate.gate else {
        return Ok(None);
    };
    let key = gate_key(&gate.upstream, &gate.downstream);
    let kind = gate_type(def.kind);
    let defaults = network.engine().coefficients().for_type(kind);
    let sill = match def.sill_elevation_m {
        Some(sill) => sill,
        None => network
            .node(&gate.upstream)
            .map(|n| n.bottom_elevation_m)
            .ok_or_else(|| NetworkError::UnknownNode {
                id: gate.upstream.clone(),
            })?,
    };

    let props = GateProperties::new(key, kind, def.width_m, def.height_m, sill, network.engine().coefficients())?
        .with_coefficients(
            def.discharge_coefficient.unwrap_or(defaults.discharge),
            def.contraction_coefficient.unwrap_or(defaults.contraction),
        )?
        .with_opening_limits(
            def.min_opening_m.unwrap_or(0.0),
            def.max_opening_m.unwrap_or(def.height_m),
        )?;
    Ok(Some(props))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_project::{ChannelDef, GatePropsDef, NodeDef};

    fn def() -> NetworkDef {
        NetworkDef {
            source_node: "R".into(),
            nodes: vec![
                NodeDef {
                    id: "R".into(),
                    bottom_elevation_m: Some(50.0),
                    initial_level_m: Some(53.0),
                },
                NodeDef {
                    id: "Z".into(),
                    bottom_elevation_m: None,
                    initial_level_m: None,
                },
            ],
            gates: vec![GateDef {
                upstream: "R".into(),
                downstream: "Z".into(),
                capacity_m3s: 6.0,
                gate: Some(GatePropsDef {
                    kind: GateKindDef::Radial,
                    width_m: 3.0,
                    height_m: 2.5,
                    sill_elevation_m: None,
                    discharge_coefficient: Some(0.9),
                    contraction_coefficient: None,
                    min_opening_m: Some(0.05),
                    max_opening_m: None,
                }),
                channel: Some(ChannelDef {
                    bottom_width_m: 3.0,
                    depth_m: 2.0,
                    side_slope: 1.0,
                    manning_n: 0.025,
                    bed_slope: 0.001,
                    length_m: 1000.0,
                }),
                initial_opening_m: Some(0.4),
            }],
        }
    }

    #[test]
    fn compiles_gate_hardware_and_state() {
        let network = build_network(&def(), GateCoefficients::default()).unwrap();
        let gate = network.gate_properties("R->Z").unwrap();
        assert_eq!(gate.gate_type, GateType::Radial);
        assert_eq!(gate.discharge_coefficient, 0.9);
        assert_eq!(gate.contraction_coefficient, 0.72);
        assert_eq!(gate.sill_elevation_m, 50.0);
        assert_eq!(gate.max_opening_m, 2.5);

        // Z bottom estimated from the reach slope, level defaults to bottom + 1 m
        let z = network.node("Z").unwrap();
        assert!((z.bottom_elevation_m - 49.0).abs() < 1e-12);
        assert!((z.water_level_m - 50.0).abs() < 1e-12);

        assert_eq!(network.gate_opening("R->Z"), Some(0.4));
        assert!(network.gate_flow("R->Z").unwrap() > 0.0);
        assert!(network.node("R").unwrap().outflow_m3s > 0.0);
    }

    #[test]
    fn bad_gate_definition_is_an_error() {
        let mut d = def();
        if let Some(g) = d.gates[0].gate.as_mut() {
            g.min_opening_m = Some(3.0);
        }
        assert!(matches!(
            build_network(&d, GateCoefficients::default()),
            Err(NetworkError::Hydraulics(_))
        ));
    }

    #[test]
    fn unknown_endpoint_is_an_error() {
        let mut d = def();
        d.gates[0].downstream = "nowhere".into();
        assert!(matches!(
            build_network(&d, GateCoefficients::default()),
            Err(NetworkError::UnknownNode { .. })
        ));
    }
}
