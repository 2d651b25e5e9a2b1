//! Transition plans and the planner that builds them.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use cf_network::network::{ASSUMED_SURFACE_AREA_M2, MASS_BALANCE_DT_S};
use cf_network::HydraulicNetwork;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::constraints::TransitionConstraints;
use crate::error::{TransitionError, TransitionResult};
use crate::strategy::TransitionStrategy;

/// Minimum number of steps per gate.
pub const MIN_STEPS: usize = 10;
/// Nominal spacing between steps (s).
pub const STEP_INTERVAL_S: f64 = 30.0;
/// Delay for a gate whose upstream neighbour moves in the same batch (s).
pub const UPSTREAM_DELAY_S: f64 = 30.0;
/// Hold between steps of gates feeding a priority zone (s).
pub const PRIORITY_HOLD_S: f64 = 5.0;
/// Total flow change at which risk becomes medium / high (m³/s).
pub const MEDIUM_RISK_FLOW_M3S: f64 = 2.0;
pub const HIGH_RISK_FLOW_M3S: f64 = 5.0;
/// Stabilisation time as a multiple of the longest gate duration.
pub const STABILIZATION_FACTOR: f64 = 1.5;

const POSITION_EPS_M: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPhase {
    Planning,
    Coordinating,
    Executing,
    Completed,
    EmergencyStopped,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionStep {
    pub step_index: usize,
    /// Seconds after execution start
    pub time_offset_s: f64,
    pub target_position_m: f64,
    pub expected_flow_m3s: f64,
    pub max_speed_m_per_s: f64,
    /// Pause after this step before the next one starts (s)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_duration_s: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateTransitionPlan {
    pub gate_id: String,
    pub start_position_m: f64,
    pub target_position_m: f64,
    pub gate_height_m: f64,
    pub strategy: TransitionStrategy,
    /// Offset of the last step (s)
    pub total_duration_s: f64,
    pub start_flow_m3s: f64,
    pub target_flow_m3s: f64,
    pub steps: Vec<TransitionStep>,
    /// A step was clipped to the speed limit while generating the curve.
    pub constraint_applied: bool,
}

impl GateTransitionPlan {
    pub fn flow_change_m3s(&self) -> f64 {
        (self.target_flow_m3s - self.start_flow_m3s).abs()
    }

    /// Shift every step later by `delay_s`.
    pub fn delay(&mut self, delay_s: f64) {
        for step in &mut self.steps {
            step.time_offset_s += delay_s;
        }
        self.refresh_duration();
    }

    /// Insert a `hold_s` pause before every step from `first` on, shifting
    /// later steps cumulatively. The pause is recorded on the preceding step.
    pub fn insert_holds(&mut self, first: usize, hold_s: f64) {
        for i in first..self.steps.len() {
            let shift = hold_s * (i - first + 1) as f64;
            self.steps[i].time_offset_s += shift;
            if i >= 1 {
                let prev = &mut self.steps[i - 1];
                prev.hold_duration_s = Some(prev.hold_duration_s.unwrap_or(0.0) + hold_s);
            }
        }
        self.refresh_duration();
    }

    /// Stretch the steps from `first` on away from `anchor_s` by
    /// `1 / damping`. Earlier steps keep their offsets.
    pub fn stretch_from(&mut self, first: usize, anchor_s: f64, damping: f64) {
        if !(damping > 0.0) {
            return;
        }
        for step in self.steps.iter_mut().skip(first) {
            let ahead = (step.time_offset_s - anchor_s).max(0.0);
            step.time_offset_s = step.time_offset_s.max(anchor_s + ahead / damping);
        }
        self.refresh_duration();
    }

    fn refresh_duration(&mut self) {
        self.total_duration_s = self.steps.last().map_or(0.0, |s| s.time_offset_s);
    }
}

/// Coarse prediction of how the network reacts to a transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemImpact {
    pub total_flow_change_m3s: f64,
    /// Largest change of mean velocity through a gate opening (m/s)
    pub max_velocity_change_m_per_s: f64,
    /// Largest per-minute storage level change at a node (m)
    pub max_level_change_m: f64,
    pub risk_level: RiskLevel,
    pub estimated_stabilization_time_s: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemTransitionPlan {
    pub plan_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub strategy: TransitionStrategy,
    pub gate_plans: BTreeMap<String, GateTransitionPlan>,
    pub total_duration_s: f64,
    /// Longest single-gate schedule before coordination delays and holds
    pub longest_gate_duration_s: f64,
    /// Buffer volume to keep available per node (m³)
    pub safety_buffers: BTreeMap<String, f64>,
    pub impacts: SystemImpact,
    pub priority_zones: Vec<String>,
    pub phase: TransitionPhase,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Inputs of a transition request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionRequest {
    /// Target opening (m) by gate key
    pub gate_transitions: BTreeMap<String, f64>,
    #[serde(default)]
    pub target_duration_s: Option<f64>,
    #[serde(default)]
    pub strategy: TransitionStrategy,
    #[serde(default)]
    pub priority_zones: Vec<String>,
}

/// Per-gate facts gathered from the network before step generation.
struct GateMove {
    key: String,
    upstream: String,
    downstream: String,
    start_m: f64,
    target_m: f64,
    height_m: f64,
    start_flow: f64,
    target_flow: f64,
    min_time_s: f64,
}

/// Build a coordinated plan for a set of target openings.
///
/// Unknown gates are skipped and listed in the plan warnings; targets
/// outside the gate's opening range are clamped.
pub fn create_transition_plan(
    network: &HydraulicNetwork,
    constraints: &TransitionConstraints,
    request: &TransitionRequest,
) -> TransitionResult<SystemTransitionPlan> {
    constraints.validate()?;
    if let Some(t) = request.target_duration_s {
        if !(t.is_finite() && t >= 0.0) {
            return Err(TransitionError::InvalidArg {
                what: "target duration must be finite and non-negative",
            });
        }
    }

    let mut warnings = Vec::new();
    let mut moves = Vec::new();
    for (key, target) in &request.gate_transitions {
        match gate_move(network, constraints, key, *target, &mut warnings) {
            Some(m) => moves.push(m),
            None => {
                warn!(gate = %key, "transition requested for unknown gate");
                warnings.push(format!("unknown gate {key} skipped"));
            }
        }
    }

    let minimum = moves
        .iter()
        .map(|m| m.min_time_s)
        .fold(constraints.min_transition_time_s, f64::max);
    let mut duration = request.target_duration_s.map_or(minimum, |t| t.max(minimum));
    if duration > constraints.max_transition_time_s {
        if minimum > constraints.max_transition_time_s {
            warnings.push(format!(
                "minimum safe duration {minimum:.0} s exceeds the {:.0} s limit; speed limits extend the plan",
                constraints.max_transition_time_s
            ));
        }
        duration = constraints.max_transition_time_s;
    }

    let mut gate_plans: BTreeMap<String, GateTransitionPlan> = moves
        .iter()
        .map(|m| (m.key.clone(), gate_plan(m, duration, request.strategy, constraints)))
        .collect();

    for plan in gate_plans.values().filter(|p| p.constraint_applied) {
        warnings.push(format!(
            "gate {} limited to {:.2} %/s; schedule extended to {:.0} s",
            plan.gate_id, constraints.max_gate_speed_percent_per_sec, plan.total_duration_s
        ));
    }

    let longest_gate = gate_plans
        .values()
        .map(|p| p.total_duration_s)
        .fold(0.0, f64::max);

    coordinate(network, &moves, &mut gate_plans, &request.priority_zones);

    let longest = gate_plans
        .values()
        .map(|p| p.total_duration_s)
        .fold(0.0, f64::max);
    let safety_buffers = safety_buffers(&moves, longest_gate);
    let impacts = predict_impacts(network, &moves, longest_gate);

    let plan = SystemTransitionPlan {
        plan_id: Uuid::new_v4(),
        created_at: Utc::now(),
        strategy: request.strategy,
        gate_plans,
        total_duration_s: longest,
        longest_gate_duration_s: longest_gate,
        safety_buffers,
        impacts,
        priority_zones: request.priority_zones.clone(),
        phase: TransitionPhase::Coordinating,
        warnings,
    };

    info!(
        plan = %plan.plan_id,
        gates = plan.gate_plans.len(),
        duration_s = plan.total_duration_s,
        risk = ?plan.impacts.risk_level,
        "transition plan created"
    );
    Ok(plan)
}

fn gate_move(
    network: &HydraulicNetwork,
    constraints: &TransitionConstraints,
    key: &str,
    target: f64,
    warnings: &mut Vec<String>,
) -> Option<GateMove> {
    let gate = network.gate_properties(key)?;
    let (upstream, downstream) = network.endpoints(key)?;
    let start_m = network.gate_opening(key).unwrap_or(0.0);

    let target_m = gate.clamp_opening(target);
    if (target_m - target).abs() > POSITION_EPS_M {
        warnings.push(format!(
            "gate {key}: target {target:.3} m clamped to {target_m:.3} m"
        ));
    }

    let start_flow = network.calculate_gate_flow(&upstream, &downstream, start_m).flow_rate_m3s;
    let target_flow = network.calculate_gate_flow(&upstream, &downstream, target_m).flow_rate_m3s;

    let percent_change = (target_m - start_m).abs() / gate.height_m * 100.0;
    let speed_time = percent_change / constraints.max_gate_speed_percent_per_sec;
    let flow_time = (target_flow - start_flow).abs() / constraints.max_flow_change_m3s_per_min * 60.0;
    let min_time_s = speed_time.max(flow_time).max(constraints.min_transition_time_s);

    debug!(gate = key, start_m, target_m, speed_time, flow_time, "gate move");

    Some(GateMove {
        key: key.to_string(),
        upstream,
        downstream,
        start_m,
        target_m,
        height_m: gate.height_m,
        start_flow,
        target_flow,
        min_time_s,
    })
}

/// Discretise one gate move along the strategy curve.
///
/// Each step is clipped to the speed limit; if clipping leaves the gate
/// short of its target, extra steps at full speed finish the move.
fn gate_plan(
    m: &GateMove,
    duration_s: f64,
    strategy: TransitionStrategy,
    constraints: &TransitionConstraints,
) -> GateTransitionPlan {
    let n = MIN_STEPS.max((duration_s / STEP_INTERVAL_S).ceil() as usize);
    let dt = duration_s / n as f64;
    let max_speed = constraints.max_gate_speed_m_per_s(m.height_m);
    let max_delta = max_speed * dt;
    let span = m.target_m - m.start_m;

    let expected_flow = |position: f64| {
        if span.abs() <= POSITION_EPS_M {
            m.start_flow
        } else {
            m.start_flow + (m.target_flow - m.start_flow) * (position - m.start_m) / span
        }
    };
    let step = |index: usize, offset: f64, position: f64| TransitionStep {
        step_index: index,
        time_offset_s: offset,
        target_position_m: position,
        expected_flow_m3s: expected_flow(position),
        max_speed_m_per_s: max_speed,
        hold_duration_s: None,
    };

    let mut steps = vec![step(0, 0.0, m.start_m)];
    let mut position = m.start_m;
    let mut constraint_applied = false;

    for i in 1..=n {
        let desired = m.start_m + span * strategy.progress(i as f64 / n as f64);
        let mut delta = desired - position;
        if delta.abs() > max_delta + POSITION_EPS_M {
            delta = max_delta.copysign(delta);
            constraint_applied = true;
        }
        position += delta;
        steps.push(step(i, i as f64 * dt, position));
    }

    let mut offset = n as f64 * dt;
    while (m.target_m - position).abs() > POSITION_EPS_M && max_delta > 0.0 {
        let delta = (m.target_m - position).clamp(-max_delta, max_delta);
        position += delta;
        offset += dt;
        steps.push(step(steps.len(), offset, position));
    }
    if let Some(last) = steps.last_mut() {
        last.target_position_m = m.target_m;
        last.expected_flow_m3s = m.target_flow;
    }

    GateTransitionPlan {
        gate_id: m.key.clone(),
        start_position_m: m.start_m,
        target_position_m: m.target_m,
        gate_height_m: m.height_m,
        strategy,
        total_duration_s: offset,
        start_flow_m3s: m.start_flow,
        target_flow_m3s: m.target_flow,
        steps,
        constraint_applied,
    }
}

/// Upstream-before-downstream delay and priority-zone holds.
fn coordinate(
    network: &HydraulicNetwork,
    moves: &[GateMove],
    plans: &mut BTreeMap<String, GateTransitionPlan>,
    priority_zones: &[String],
) {
    let feeding: HashSet<&str> = moves.iter().map(|m| m.downstream.as_str()).collect();
    let graph = network.graph();

    for m in moves {
        let Some(plan) = plans.get_mut(&m.key) else {
            continue;
        };
        if feeding.contains(m.upstream.as_str()) {
            plan.delay(UPSTREAM_DELAY_S);
            debug!(gate = %m.key, delay_s = UPSTREAM_DELAY_S, "upstream gate moves first");
        }

        if priority_zones.is_empty() {
            continue;
        }
        let Some(start) = graph.node_by_name(&m.downstream) else {
            continue;
        };
        let affects_zone = graph
            .reachable_from(start.id)
            .into_iter()
            .any(|node| priority_zones.iter().any(|z| z == graph.node_name(node)));
        if affects_zone {
            plan.insert_holds(1, PRIORITY_HOLD_S);
            debug!(gate = %m.key, "priority zone holds inserted");
        }
    }
}

/// Buffer volume per node: flow change of every gate touching the node
/// times half the longest single-gate duration.
fn safety_buffers(moves: &[GateMove], longest_s: f64) -> BTreeMap<String, f64> {
    let mut flow_change: BTreeMap<String, f64> = BTreeMap::new();
    for m in moves {
        let change = (m.target_flow - m.start_flow).abs();
        let nodes: BTreeSet<&str> = [m.upstream.as_str(), m.downstream.as_str()].into();
        for node in nodes {
            *flow_change.entry(node.to_string()).or_default() += change;
        }
    }
    flow_change
        .into_iter()
        .map(|(node, change)| (node, change * longest_s / 2.0))
        .collect()
}

fn predict_impacts(network: &HydraulicNetwork, moves: &[GateMove], longest_s: f64) -> SystemImpact {
    let total_flow_change: f64 = moves.iter().map(|m| (m.target_flow - m.start_flow).abs()).sum();

    let max_velocity_change = moves
        .iter()
        .filter_map(|m| {
            let gate = network.gate_properties(&m.key)?;
            let velocity = |flow: f64, opening: f64| {
                if opening > 0.0 {
                    flow / (gate.width_m * opening)
                } else {
                    0.0
                }
            };
            Some((velocity(m.target_flow, m.target_m) - velocity(m.start_flow, m.start_m)).abs())
        })
        .fold(0.0, f64::max);

    let max_level_change = moves
        .iter()
        .map(|m| (m.target_flow - m.start_flow).abs() * MASS_BALANCE_DT_S / ASSUMED_SURFACE_AREA_M2)
        .fold(0.0, f64::max);

    let risk_level = if total_flow_change >= HIGH_RISK_FLOW_M3S {
        RiskLevel::High
    } else if total_flow_change >= MEDIUM_RISK_FLOW_M3S {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    SystemImpact {
        total_flow_change_m3s: total_flow_change,
        max_velocity_change_m_per_s: max_velocity_change,
        max_level_change_m: max_level_change,
        risk_level,
        estimated_stabilization_time_s: STABILIZATION_FACTOR * longest_s,
    }
}
