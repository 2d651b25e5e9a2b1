//! Execution scenarios on a paused tokio clock.

use std::time::Duration;

use cf_graph::GraphBuilder;
use cf_hydraulics::GateHydraulics;
use cf_network::HydraulicNetwork;
use cf_transition::{
    AnomalyKind, GradualTransitionController, HydraulicCondition, TransitionConstraints, TransitionPhase,
    TransitionRequest,
};

/// R -> M -> Z without channel geometry, levels settled from R at 102 m.
fn controller() -> GradualTransitionController {
    let mut b = GraphBuilder::new();
    let r = b.add_node_with_elevation("R", 100.0);
    let m = b.add_node("M");
    let z = b.add_node("Z");
    b.add_gate(r, m, 6.0);
    b.add_gate(m, z, 4.0);

    let mut net = HydraulicNetwork::new(b.build().unwrap(), "R", GateHydraulics::default()).unwrap();
    net.set_node_level("R", 102.0).unwrap();
    net.propagate_levels_downstream("R", 0.0);
    GradualTransitionController::new(net, TransitionConstraints::default()).unwrap()
}

fn request(targets: &[(&str, f64)], duration: Option<f64>) -> TransitionRequest {
    TransitionRequest {
        gate_transitions: targets.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        target_duration_s: duration,
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn transition_runs_to_completion() {
    let controller = controller();
    let plan = controller
        .create_transition_plan(&request(&[("R->M", 0.5), ("M->Z", 0.3)], None))
        .unwrap();
    let planned = plan.total_duration_s;

    let result = controller.execute_transition_plan(plan, 5.0).await;

    assert!(result.completed, "{result:?}");
    assert_eq!(result.phase, TransitionPhase::Completed);
    assert!(result.emergency_stops.is_empty());
    assert_eq!(result.final_condition, HydraulicCondition::Stable);
    assert!((result.final_positions["R->M"] - 0.5).abs() < 1e-12);
    assert!((result.final_positions["M->Z"] - 0.3).abs() < 1e-12);
    assert!(result.duration_s >= planned - 1e-6);
    assert!(controller.active_gates().is_empty());

    let network = controller.network();
    assert!(network.lock().gate_flow("R->M").unwrap() > 0.0);
}

#[tokio::test(start_paused = true)]
async fn level_jump_stops_everything() {
    let controller = controller();
    let plan = controller
        .create_transition_plan(&request(&[("R->M", 0.5)], Some(600.0)))
        .unwrap();

    let network = controller.network();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(100)).await;
        network.lock().set_node_level("R", 103.0).unwrap();
    });

    let result = controller.execute_transition_plan(plan, 5.0).await;

    assert!(!result.completed);
    assert_eq!(result.phase, TransitionPhase::EmergencyStopped);
    assert_eq!(result.emergency_stops.len(), 1);
    assert_eq!(result.emergency_stops[0].condition, HydraulicCondition::ShockDetected);
    assert_eq!(result.emergency_stops[0].gates_stopped, vec!["R->M".to_string()]);
    assert_eq!(result.final_condition, HydraulicCondition::ShockDetected);
    assert!(result
        .anomalies
        .iter()
        .any(|a| a.kind == AnomalyKind::SuddenLevelChange && a.location == "R"));

    // stopped part-way: three steps of 0.025 m had run by 100 s
    let reached = result.final_positions["R->M"];
    assert!(reached > 0.0 && reached < 0.5, "{reached}");
    assert!(result.duration_s < 120.0);
    assert!(controller.active_gates().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failing_gate_does_not_stop_others() {
    let controller = controller();
    let mut plan = controller
        .create_transition_plan(&request(&[("M->Z", 0.3)], None))
        .unwrap();
    let mut ghost = plan.gate_plans["M->Z"].clone();
    ghost.gate_id = "X->Y".into();
    plan.gate_plans.insert("X->Y".into(), ghost);

    let result = controller.execute_transition_plan(plan, 5.0).await;

    assert!(!result.completed);
    assert_eq!(result.phase, TransitionPhase::Failed);
    assert!(result.emergency_stops.is_empty());
    let failure = result
        .anomalies
        .iter()
        .find(|a| a.kind == AnomalyKind::GateFailure)
        .unwrap();
    assert_eq!(failure.location, "X->Y");
    assert!((result.final_positions["M->Z"] - 0.3).abs() < 1e-12);
    assert!(!result.final_positions.contains_key("X->Y"));
}

#[tokio::test(start_paused = true)]
async fn oscillation_adds_holds() {
    let controller = controller();
    let plan = controller
        .create_transition_plan(&request(&[("R->M", 0.5)], Some(300.0)))
        .unwrap();
    let planned = plan.total_duration_s;

    // R swings 0.2 m between every pair of samples
    let network = controller.network();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        for i in 0..400 {
            let level = if i % 2 == 0 { 102.2 } else { 102.0 };
            network.lock().set_node_level("R", level).unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    });

    let result = controller.execute_transition_plan(plan, 5.0).await;

    assert!(result.completed, "{result:?}");
    assert!(result.emergency_stops.is_empty());
    assert_eq!(result.final_condition, HydraulicCondition::MajorOscillation);
    // holds keep coming while the oscillation persists, once per step
    assert!(result.duration_s > planned + 200.0, "{}", result.duration_s);
    assert!(result
        .anomalies
        .iter()
        .any(|a| a.kind == AnomalyKind::RapidLevelChange));
}

#[tokio::test(start_paused = true)]
async fn manual_stop_and_bad_interval() {
    let controller = std::sync::Arc::new(controller());
    let plan = controller
        .create_transition_plan(&request(&[("M->Z", 0.3)], Some(600.0)))
        .unwrap();

    let stopper = std::sync::Arc::clone(&controller);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(45)).await;
        assert_eq!(stopper.active_gates(), vec!["M->Z".to_string()]);
        stopper.emergency_stop("operator request");
    });

    let result = controller.execute_transition_plan(plan, f64::NAN).await;

    assert_eq!(result.phase, TransitionPhase::EmergencyStopped);
    assert_eq!(result.emergency_stops[0].reason, "operator request");
    assert!(result.warnings.iter().any(|w| w.contains("invalid")));
    assert!(result.final_positions["M->Z"] < 0.3);
}

#[tokio::test(start_paused = true)]
async fn finished_gates_leave_the_active_set() {
    let controller = std::sync::Arc::new(controller());
    // M->Z trails R->M by 30 s
    let plan = controller
        .create_transition_plan(&request(&[("R->M", 0.5), ("M->Z", 0.3)], Some(600.0)))
        .unwrap();

    let stopper = std::sync::Arc::clone(&controller);
    let moving = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(615)).await;
        let moving = stopper.active_gates();
        stopper.emergency_stop("operator request");
        moving
    });

    let result = controller.execute_transition_plan(plan, 5.0).await;

    assert_eq!(moving.await.unwrap(), vec!["M->Z".to_string()]);
    assert_eq!(result.emergency_stops.len(), 1);
    assert_eq!(result.emergency_stops[0].gates_stopped, vec!["M->Z".to_string()]);
    assert!((result.final_positions["R->M"] - 0.5).abs() < 1e-12);
    assert!(result.final_positions["M->Z"] < 0.3);
    assert!(controller.active_gates().is_empty());
}
