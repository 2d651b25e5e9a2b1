//! Project validation logic.

use std::collections::HashSet;

use crate::schema::{ChannelDef, ControllerDef, GateDef, GatePropsDef, NetworkDef, Project};

pub const LATEST_VERSION: u32 = 1;

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Duplicate ID: {id} in {context}")]
    DuplicateId { id: String, context: String },

    #[error("Missing reference: {id} in {context}")]
    MissingReference { id: String, context: String },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

pub fn validate_project(project: &Project) -> Result<(), ValidationError> {
    if project.version == 0 || project.version > LATEST_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            version: project.version,
        });
    }
    validate_network(&project.network)?;
    validate_controller(&project.controller, &project.network)?;
    Ok(())
}

fn invalid(field: impl Into<String>, value: f64, reason: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.into(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn validate_network(network: &NetworkDef) -> Result<(), ValidationError> {
    let mut node_ids = HashSet::new();
    for node in &network.nodes {
        if !node_ids.insert(node.id.as_str()) {
            return Err(ValidationError::DuplicateId {
                id: node.id.clone(),
                context: "network nodes".to_string(),
            });
        }
        for (field, value) in [
            ("bottom_elevation_m", node.bottom_elevation_m),
            ("initial_level_m", node.initial_level_m),
        ] {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(invalid(format!("node '{}' {field}", node.id), v, "must be finite"));
                }
            }
        }
    }

    if !node_ids.contains(network.source_node.as_str()) {
        return Err(ValidationError::MissingReference {
            id: network.source_node.clone(),
            context: "network source_node".to_string(),
        });
    }

    let mut gate_keys = HashSet::new();
    for gate in &network.gates {
        let key = format!("{}->{}", gate.upstream, gate.downstream);
        if !gate_keys.insert(key.clone()) {
            return Err(ValidationError::DuplicateId {
                id: key,
                context: "network gates".to_string(),
            });
        }
        validate_gate(gate, &key, &node_ids)?;
    }

    Ok(())
}

fn validate_gate(gate: &GateDef, key: &str, node_ids: &HashSet<&str>) -> Result<(), ValidationError> {
    for endpoint in [&gate.upstream, &gate.downstream] {
        if !node_ids.contains(endpoint.as_str()) {
            return Err(ValidationError::MissingReference {
                id: endpoint.clone(),
                context: format!("gate '{key}'"),
            });
        }
    }
    if gate.upstream == gate.downstream {
        return Err(ValidationError::InvalidValue {
            field: format!("gate '{key}'"),
            value: gate.upstream.clone(),
            reason: "upstream and downstream must differ".to_string(),
        });
    }
    if !gate.capacity_m3s.is_finite() || gate.capacity_m3s < 0.0 {
        return Err(invalid(
            format!("gate '{key}' capacity_m3s"),
            gate.capacity_m3s,
            "must be finite and non-negative",
        ));
    }
    if let Some(props) = &gate.gate {
        validate_gate_props(props, key)?;
        if let Some(opening) = gate.initial_opening_m {
            let max = props.max_opening_m.unwrap_or(props.height_m);
            if !(0.0..=max).contains(&opening) {
                return Err(invalid(
                    format!("gate '{key}' initial_opening_m"),
                    opening,
                    "must lie within [0, max_opening]",
                ));
            }
        }
    } else if let Some(opening) = gate.initial_opening_m {
        if !opening.is_finite() || opening < 0.0 {
            return Err(invalid(
                format!("gate '{key}' initial_opening_m"),
                opening,
                "must be finite and non-negative",
            ));
        }
    }
    if let Some(channel) = &gate.channel {
        validate_channel(channel, key)?;
    }
    Ok(())
}

fn validate_gate_props(props: &GatePropsDef, key: &str) -> Result<(), ValidationError> {
    let field = |name: &str| format!("gate '{key}' {name}");

    if !(props.width_m.is_finite() && props.width_m > 0.0) {
        return Err(invalid(field("width_m"), props.width_m, "must be positive"));
    }
    if !(props.height_m.is_finite() && props.height_m > 0.0) {
        return Err(invalid(field("height_m"), props.height_m, "must be positive"));
    }
    if let Some(sill) = props.sill_elevation_m {
        if !sill.is_finite() {
            return Err(invalid(field("sill_elevation_m"), sill, "must be finite"));
        }
    }
    if let Some(cd) = props.discharge_coefficient {
        if !(cd.is_finite() && cd > 0.0) {
            return Err(invalid(field("discharge_coefficient"), cd, "must be positive"));
        }
    }
    if let Some(cc) = props.contraction_coefficient {
        if !(cc > 0.0 && cc <= 1.0) {
            return Err(invalid(field("contraction_coefficient"), cc, "must be in (0, 1]"));
        }
    }

    let min = props.min_opening_m.unwrap_or(0.0);
    let max = props.max_opening_m.unwrap_or(props.height_m);
    if !(min.is_finite() && min >= 0.0) {
        return Err(invalid(field("min_opening_m"), min, "must be non-negative"));
    }
    if !(max.is_finite() && max >= min) {
        return Err(invalid(field("max_opening_m"), max, "must not be below min_opening_m"));
    }
    if max > props.height_m {
        return Err(invalid(field("max_opening_m"), max, "must not exceed height_m"));
    }
    Ok(())
}

fn validate_channel(channel: &ChannelDef, key: &str) -> Result<(), ValidationError> {
    let field = |name: &str| format!("gate '{key}' channel {name}");
    let positive = [
        ("bottom_width_m", channel.bottom_width_m),
        ("depth_m", channel.depth_m),
        ("manning_n", channel.manning_n),
        ("length_m", channel.length_m),
    ];
    for (name, value) in positive {
        if !(value.is_finite() && value > 0.0) {
            return Err(invalid(field(name), value, "must be positive"));
        }
    }
    let non_negative = [
        ("side_slope", channel.side_slope),
        ("bed_slope", channel.bed_slope),
    ];
    for (name, value) in non_negative {
        if !(value.is_finite() && value >= 0.0) {
            return Err(invalid(field(name), value, "must be non-negative"));
        }
    }
    Ok(())
}

fn validate_controller(controller: &ControllerDef, network: &NetworkDef) -> Result<(), ValidationError> {
    let positive = [
        ("max_gate_speed_percent_per_sec", controller.max_gate_speed_percent_per_sec),
        ("max_flow_change_m3s_per_min", controller.max_flow_change_m3s_per_min),
        ("max_level_change_m_per_min", controller.max_level_change_m_per_min),
        ("max_velocity_m_per_s", controller.max_velocity_m_per_s),
        ("max_transition_time_s", controller.max_transition_time_s),
        ("emergency_stop_threshold_m", controller.emergency_stop_threshold_m),
        ("monitoring_interval_s", controller.monitoring_interval_s),
    ];
    for (name, value) in positive {
        if !(value.is_finite() && value > 0.0) {
            return Err(invalid(format!("controller {name}"), value, "must be positive"));
        }
    }
    let min_time = controller.min_transition_time_s;
    if !(min_time.is_finite() && min_time >= 0.0) {
        return Err(invalid("controller min_transition_time_s", min_time, "must be non-negative"));
    }
    if min_time > controller.max_transition_time_s {
        return Err(invalid(
            "controller min_transition_time_s",
            min_time,
            "must not exceed max_transition_time_s",
        ));
    }
    let damping = controller.oscillation_damping_factor;
    if !(damping > 0.0 && damping <= 1.0) {
        return Err(invalid("controller oscillation_damping_factor", damping, "must be in (0, 1]"));
    }

    for zone in &controller.priority_zones {
        if !network.nodes.iter().any(|n| &n.id == zone) {
            return Err(ValidationError::MissingReference {
                id: zone.clone(),
                context: "controller priority_zones".to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{GateKindDef, NodeDef};

    fn node(id: &str) -> NodeDef {
        NodeDef {
            id: id.to_string(),
            bottom_elevation_m: None,
            initial_level_m: None,
        }
    }

    fn gate(up: &str, down: &str) -> GateDef {
        GateDef {
            upstream: up.to_string(),
            downstream: down.to_string(),
            capacity_m3s: 5.0,
            gate: None,
            channel: None,
            initial_opening_m: None,
        }
    }

    fn project(gates: Vec<GateDef>) -> Project {
        Project {
            version: 1,
            name: "test".to_string(),
            network: NetworkDef {
                source_node: "R".to_string(),
                nodes: vec![node("R"), node("A"), node("B")],
                gates,
            },
            controller: ControllerDef::default(),
        }
    }

    #[test]
    fn minimal_project_is_valid() {
        validate_project(&project(vec![gate("R", "A"), gate("A", "B")])).unwrap();
    }

    #[test]
    fn rejects_unknown_endpoint() {
        let err = validate_project(&project(vec![gate("R", "X")])).unwrap_err();
        assert!(matches!(err, ValidationError::MissingReference { .. }));
    }

    #[test]
    fn rejects_duplicate_gate() {
        let err = validate_project(&project(vec![gate("R", "A"), gate("R", "A")])).unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateId { .. }));
    }

    #[test]
    fn rejects_missing_source() {
        let mut p = project(vec![]);
        p.network.source_node = "nowhere".to_string();
        assert!(validate_project(&p).is_err());
    }

    #[test]
    fn rejects_opening_limits_above_height() {
        let mut g = gate("R", "A");
        g.gate = Some(GatePropsDef {
            kind: GateKindDef::Sluice,
            width_m: 2.0,
            height_m: 1.5,
            sill_elevation_m: None,
            discharge_coefficient: None,
            contraction_coefficient: None,
            min_opening_m: Some(0.1),
            max_opening_m: Some(2.0),
        });
        let err = validate_project(&project(vec![g])).unwrap_err();
        assert!(err.to_string().contains("max_opening_m"));
    }

    #[test]
    fn rejects_bad_controller() {
        let mut p = project(vec![]);
        p.controller.oscillation_damping_factor = 1.5;
        assert!(validate_project(&p).is_err());

        let mut p = project(vec![]);
        p.controller.priority_zones = vec!["Z9".to_string()];
        assert!(validate_project(&p).is_err());
    }

    #[test]
    fn rejects_future_version() {
        let mut p = project(vec![]);
        p.version = LATEST_VERSION + 1;
        assert!(matches!(
            validate_project(&p),
            Err(ValidationError::UnsupportedVersion { .. })
        ));
    }
}
