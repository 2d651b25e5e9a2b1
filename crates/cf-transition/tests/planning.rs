//! Plan generation against small networks.

use std::collections::BTreeMap;

use cf_graph::GraphBuilder;
use cf_hydraulics::{GateCoefficients, GateHydraulics, GateProperties, GateType};
use cf_network::HydraulicNetwork;
use cf_transition::{
    create_transition_plan, RiskLevel, SystemTransitionPlan, TransitionConstraints, TransitionPhase,
    TransitionRequest, TransitionStrategy,
};
use proptest::prelude::*;

/// R -> M -> {Z, W}; R->M is a 4 m tall sluice, the rest are estimated.
fn network() -> HydraulicNetwork {
    let mut b = GraphBuilder::new();
    let r = b.add_node_with_elevation("R", 100.0);
    let m = b.add_node("M");
    let z = b.add_node("Z");
    let w = b.add_node("W");
    b.add_gate(r, m, 12.0);
    b.add_gate(m, z, 4.0);
    b.add_gate(m, w, 2.0);

    let mut net = HydraulicNetwork::new(b.build().unwrap(), "R", GateHydraulics::default()).unwrap();
    let tall = GateProperties::new("R->M", GateType::Sluice, 3.0, 4.0, 100.0, &GateCoefficients::default()).unwrap();
    net.set_gate_properties(tall).unwrap();
    net.set_node_level("R", 102.0).unwrap();
    net.propagate_levels_downstream("R", 0.0);
    net
}

fn request(targets: &[(&str, f64)], duration: Option<f64>) -> TransitionRequest {
    TransitionRequest {
        gate_transitions: targets.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        target_duration_s: duration,
        ..Default::default()
    }
}

fn plan(net: &HydraulicNetwork, req: &TransitionRequest) -> SystemTransitionPlan {
    create_transition_plan(net, &TransitionConstraints::default(), req).unwrap()
}

fn offsets(plan: &SystemTransitionPlan, key: &str) -> Vec<f64> {
    plan.gate_plans[key].steps.iter().map(|s| s.time_offset_s).collect()
}

fn strategy() -> impl Strategy<Value = TransitionStrategy> {
    prop_oneof![
        Just(TransitionStrategy::Linear),
        Just(TransitionStrategy::Exponential),
        Just(TransitionStrategy::SCurve),
        Just(TransitionStrategy::Adaptive),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn steps_never_exceed_gate_speed(
        strategy in strategy(),
        speed in 0.2_f64..5.0,
        target in proptest::option::of(0.0_f64..4000.0),
    ) {
        let net = network();
        let constraints = TransitionConstraints {
            max_gate_speed_percent_per_sec: speed,
            ..Default::default()
        };
        let req = TransitionRequest {
            strategy,
            ..request(&[("R->M", 3.0)], target)
        };
        let plan = create_transition_plan(&net, &constraints, &req).unwrap();
        let gate = &plan.gate_plans["R->M"];

        prop_assert!(plan.total_duration_s >= constraints.min_transition_time_s);
        prop_assert!(gate.steps.len() >= 10);
        prop_assert_eq!(gate.steps[0].target_position_m, 0.0);
        prop_assert_eq!(gate.steps.last().unwrap().target_position_m, 3.0);

        let max_speed = constraints.max_gate_speed_m_per_s(4.0);
        for pair in gate.steps.windows(2) {
            let dt = pair[1].time_offset_s - pair[0].time_offset_s;
            let dp = (pair[1].target_position_m - pair[0].target_position_m).abs();
            prop_assert!(dt > 0.0);
            prop_assert!(dp <= max_speed * dt + 1e-8, "{} m in {} s", dp, dt);
        }
    }
}

#[test]
fn short_target_is_raised_to_minimum() {
    let net = network();
    let p = plan(&net, &request(&[("M->Z", 0.5)], Some(1.0)));
    assert!(p.total_duration_s >= 60.0);
    assert_eq!(p.phase, TransitionPhase::Coordinating);
}

#[test]
fn long_target_is_capped() {
    let net = network();
    let constraints = TransitionConstraints {
        max_transition_time_s: 100.0,
        ..Default::default()
    };
    let p = create_transition_plan(&net, &constraints, &request(&[("M->Z", 0.3)], Some(5000.0))).unwrap();
    assert!((p.total_duration_s - 100.0).abs() < 1e-9);
}

#[test]
fn downstream_gate_waits_for_upstream() {
    let net = network();
    let alone = plan(&net, &request(&[("M->Z", 0.5)], Some(600.0)));
    let both = plan(&net, &request(&[("R->M", 1.0), ("M->Z", 0.5)], Some(600.0)));

    let isolated = offsets(&alone, "M->Z");
    let coordinated = offsets(&both, "M->Z");
    assert_eq!(isolated.len(), coordinated.len());
    for (a, b) in isolated.iter().zip(&coordinated) {
        assert!(b > a);
        assert!((b - a - 30.0).abs() < 1e-9);
    }
    assert_eq!(offsets(&both, "R->M")[0], 0.0);
}

#[test]
fn priority_zone_adds_holds() {
    let net = network();
    let plain = plan(&net, &request(&[("M->Z", 0.5)], Some(600.0)));
    let guarded = plan(
        &net,
        &TransitionRequest {
            priority_zones: vec!["Z".into()],
            ..request(&[("M->Z", 0.5)], Some(600.0))
        },
    );

    let before = offsets(&plain, "M->Z");
    let after = offsets(&guarded, "M->Z");
    assert_eq!(after[0], before[0]);
    for i in 1..before.len() {
        assert!((after[i] - before[i] - 5.0 * i as f64).abs() < 1e-9);
    }
    assert_eq!(guarded.gate_plans["M->Z"].steps[0].hold_duration_s, Some(5.0));

    // W is not downstream of M->Z
    let elsewhere = plan(
        &net,
        &TransitionRequest {
            priority_zones: vec!["W".into()],
            ..request(&[("M->Z", 0.5)], Some(600.0))
        },
    );
    assert_eq!(offsets(&elsewhere, "M->Z"), before);
}

#[test]
fn unknown_gates_skipped_and_targets_clamped() {
    let net = network();
    let p = plan(&net, &request(&[("X->Y", 1.0), ("M->Z", 9.0)], None));
    assert!(!p.gate_plans.contains_key("X->Y"));
    assert_eq!(p.gate_plans["M->Z"].target_position_m, 2.0);
    assert!(p.warnings.iter().any(|w| w.contains("X->Y")));
    assert!(p.warnings.iter().any(|w| w.contains("clamped")));
}

#[test]
fn expected_flow_runs_between_endpoints() {
    let net = network();
    let p = plan(&net, &request(&[("M->Z", 0.5)], None));
    let gate = &p.gate_plans["M->Z"];
    assert_eq!(gate.steps[0].expected_flow_m3s, gate.start_flow_m3s);
    assert_eq!(gate.steps.last().unwrap().expected_flow_m3s, gate.target_flow_m3s);
    assert!(gate.target_flow_m3s > gate.start_flow_m3s);
    for pair in gate.steps.windows(2) {
        assert!(pair[1].expected_flow_m3s >= pair[0].expected_flow_m3s - 1e-12);
    }
}

#[test]
fn buffers_and_impacts() {
    let net = network();
    let p = plan(&net, &request(&[("R->M", 1.0), ("M->Z", 0.5)], Some(600.0)));

    let buffers: &BTreeMap<String, f64> = &p.safety_buffers;
    assert_eq!(buffers.len(), 3);
    assert!((buffers["M"] - buffers["R"] - buffers["Z"]).abs() < 1e-6);

    // M->Z waits 30 s for R->M; the buffers use the undelayed schedule
    let longest = p.longest_gate_duration_s;
    assert!((longest - 600.0).abs() < 1e-9);
    assert!((p.total_duration_s - 630.0).abs() < 1e-9);

    let change: f64 = p.gate_plans.values().map(|g| g.flow_change_m3s()).sum();
    assert!((buffers["M"] - change * longest / 2.0).abs() < 1e-6);
    assert!((p.impacts.total_flow_change_m3s - change).abs() < 1e-9);
    assert!((p.impacts.estimated_stabilization_time_s - 1.5 * longest).abs() < 1e-9);

    let expected = if change >= 5.0 {
        RiskLevel::High
    } else if change >= 2.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };
    assert_eq!(p.impacts.risk_level, expected);
}

#[test]
fn invalid_constraints_rejected() {
    let net = network();
    let constraints = TransitionConstraints {
        max_velocity_m_per_s: -1.0,
        ..Default::default()
    };
    assert!(create_transition_plan(&net, &constraints, &request(&[("M->Z", 0.5)], None)).is_err());
}
