//! Runs transition plans against a shared network.
//!
//! Every gate follows its own step schedule in a separate task while a
//! monitoring task samples the network at a fixed interval. A gate task
//! only moves its gate while the gate is present in the active map, so
//! removing entries is the whole cancellation mechanism. The monitor edits
//! the unexecuted part of active schedules and wakes the gate tasks so they
//! re-read their next due time.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use cf_network::HydraulicNetwork;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::constraints::TransitionConstraints;
use crate::error::TransitionResult;
use crate::monitor::{Anomaly, AnomalyKind, HydraulicCondition, SystemMonitor};
use crate::plan::{
    self, GateTransitionPlan, SystemTransitionPlan, TransitionPhase, TransitionRequest, PRIORITY_HOLD_S,
};
use crate::strategy::TransitionStrategy;

/// Used when the requested monitoring interval is not usable.
pub const DEFAULT_MONITORING_INTERVAL_S: f64 = 5.0;
/// Shortest accepted monitoring interval (s).
pub const MIN_MONITORING_INTERVAL_S: f64 = 1e-3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyStop {
    pub reason: String,
    pub condition: HydraulicCondition,
    /// Seconds since execution start
    pub elapsed_s: f64,
    pub timestamp: DateTime<Utc>,
    /// Gates that were still moving
    pub gates_stopped: Vec<String>,
}

/// Outcome of `execute_transition_plan`. Always returned, also after an
/// emergency stop or gate failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub plan_id: Uuid,
    /// Every gate reached its final step without stops or failures.
    pub completed: bool,
    pub emergency_stops: Vec<EmergencyStop>,
    pub anomalies: Vec<Anomaly>,
    /// Opening (m) of every planned gate when execution ended
    pub final_positions: BTreeMap<String, f64>,
    pub duration_s: f64,
    pub final_condition: HydraulicCondition,
    pub phase: TransitionPhase,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
struct ActiveTransition {
    plan: GateTransitionPlan,
    next_step: usize,
    /// Pending step when the monitor last adjusted this schedule
    adjusted_at: Option<usize>,
}

#[derive(Debug)]
enum GateOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

/// State shared between the controller and its tasks.
///
/// Lock order: `active` before `network`.
struct Shared {
    network: Arc<Mutex<HydraulicNetwork>>,
    active: Mutex<BTreeMap<String, ActiveTransition>>,
    wake: Notify,
    stops: Mutex<Vec<EmergencyStop>>,
    anomalies: Mutex<Vec<Anomaly>>,
    condition: Mutex<HydraulicCondition>,
    started: Mutex<Option<Instant>>,
}

impl Shared {
    fn elapsed_s(&self) -> f64 {
        self.started.lock().map_or(0.0, |t| t.elapsed().as_secs_f64())
    }

    /// Clear every active transition and record the stop.
    fn halt(&self, reason: String, condition: HydraulicCondition) {
        let gates_stopped: Vec<String> = {
            let mut active = self.active.lock();
            let keys = active.keys().cloned().collect();
            active.clear();
            keys
        };
        let stop = EmergencyStop {
            reason,
            condition,
            elapsed_s: self.elapsed_s(),
            timestamp: Utc::now(),
            gates_stopped,
        };
        error!(
            reason = %stop.reason,
            gates = ?stop.gates_stopped,
            elapsed_s = stop.elapsed_s,
            "emergency stop"
        );
        self.stops.lock().push(stop);
        self.wake.notify_waiters();
    }

    /// Apply `edit` to the remaining steps of every active plan accepted by
    /// `filter`, then wake the gate tasks.
    ///
    /// A schedule is adjusted at most once per pending step unless `fresh`
    /// is set, which marks a condition the monitor has just entered.
    fn reschedule(
        &self,
        fresh: bool,
        filter: impl Fn(&GateTransitionPlan) -> bool,
        edit: impl Fn(&mut GateTransitionPlan, usize),
    ) -> usize {
        let mut touched = 0;
        {
            let mut active = self.active.lock();
            for transition in active.values_mut() {
                if !filter(&transition.plan) {
                    continue;
                }
                if !fresh && transition.adjusted_at == Some(transition.next_step) {
                    continue;
                }
                edit(&mut transition.plan, transition.next_step);
                transition.adjusted_at = Some(transition.next_step);
                touched += 1;
            }
        }
        if touched > 0 {
            self.wake.notify_waiters();
        }
        touched
    }
}

pub struct GradualTransitionController {
    shared: Arc<Shared>,
    constraints: TransitionConstraints,
}

impl GradualTransitionController {
    pub fn new(network: HydraulicNetwork, constraints: TransitionConstraints) -> TransitionResult<Self> {
        Self::with_shared_network(Arc::new(Mutex::new(network)), constraints)
    }

    /// Control a network that other parts of the process also observe.
    pub fn with_shared_network(
        network: Arc<Mutex<HydraulicNetwork>>,
        constraints: TransitionConstraints,
    ) -> TransitionResult<Self> {
        constraints.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                network,
                active: Mutex::new(BTreeMap::new()),
                wake: Notify::new(),
                stops: Mutex::new(Vec::new()),
                anomalies: Mutex::new(Vec::new()),
                condition: Mutex::new(HydraulicCondition::Stable),
                started: Mutex::new(None),
            }),
            constraints,
        })
    }

    pub fn network(&self) -> Arc<Mutex<HydraulicNetwork>> {
        Arc::clone(&self.shared.network)
    }

    pub fn constraints(&self) -> &TransitionConstraints {
        &self.constraints
    }

    /// Gates currently moving.
    pub fn active_gates(&self) -> Vec<String> {
        self.shared.active.lock().keys().cloned().collect()
    }

    /// Latest condition reported by the monitor.
    pub fn condition(&self) -> HydraulicCondition {
        *self.shared.condition.lock()
    }

    /// Plan against the current network state.
    pub fn create_transition_plan(&self, request: &TransitionRequest) -> TransitionResult<SystemTransitionPlan> {
        let network = self.shared.network.lock();
        plan::create_transition_plan(&network, &self.constraints, request)
    }

    /// Stop every active gate where it is.
    pub fn emergency_stop(&self, reason: impl Into<String>) {
        let condition = self.condition();
        self.shared.halt(reason.into(), condition);
    }

    /// Execute a plan to completion, emergency stop or failure.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn execute_transition_plan(
        &self,
        mut plan: SystemTransitionPlan,
        monitoring_interval_s: f64,
    ) -> ExecutionResult {
        let mut warnings = Vec::new();
        let interval_s = if monitoring_interval_s.is_finite() && monitoring_interval_s >= MIN_MONITORING_INTERVAL_S {
            monitoring_interval_s
        } else {
            warnings.push(format!(
                "monitoring interval {monitoring_interval_s} s is invalid; using {DEFAULT_MONITORING_INTERVAL_S} s"
            ));
            DEFAULT_MONITORING_INTERVAL_S
        };

        plan.phase = TransitionPhase::Executing;
        let start = Instant::now();
        *self.shared.started.lock() = Some(start);
        self.shared.stops.lock().clear();
        self.shared.anomalies.lock().clear();
        *self.shared.condition.lock() = HydraulicCondition::Stable;
        {
            let mut active = self.shared.active.lock();
            for (key, gate_plan) in &plan.gate_plans {
                active.insert(
                    key.clone(),
                    ActiveTransition {
                        plan: gate_plan.clone(),
                        next_step: 0,
                        adjusted_at: None,
                    },
                );
            }
        }
        info!(
            plan = %plan.plan_id,
            gates = plan.gate_plans.len(),
            planned_s = plan.total_duration_s,
            interval_s,
            "executing transition plan"
        );

        let gate_tasks: Vec<(String, JoinHandle<GateOutcome>)> = plan
            .gate_plans
            .keys()
            .map(|key| {
                let task = tokio::spawn(run_gate(Arc::clone(&self.shared), key.clone(), start));
                (key.clone(), task)
            })
            .collect();
        let monitor = tokio::spawn(run_monitor(
            Arc::clone(&self.shared),
            self.constraints.clone(),
            Duration::try_from_secs_f64(interval_s)
                .unwrap_or(Duration::from_secs_f64(DEFAULT_MONITORING_INTERVAL_S)),
            start,
        ));

        let mut failures = Vec::new();
        let mut all_completed = true;
        for (key, task) in gate_tasks {
            let failure = match task.await {
                Ok(GateOutcome::Completed) => None,
                Ok(GateOutcome::Cancelled) => {
                    all_completed = false;
                    None
                }
                Ok(GateOutcome::Failed(message)) => Some(message),
                Err(join) => Some(format!("gate task ended abnormally: {join}")),
            };
            if let Some(message) = failure {
                all_completed = false;
                warn!(gate = %key, %message, "gate transition failed");
                failures.push(Anomaly {
                    kind: AnomalyKind::GateFailure,
                    location: key,
                    value: 0.0,
                    threshold: 0.0,
                    elapsed_s: start.elapsed().as_secs_f64(),
                    message,
                });
            }
        }
        monitor.abort();
        let _ = monitor.await;

        let emergency_stops = std::mem::take(&mut *self.shared.stops.lock());
        let mut anomalies = std::mem::take(&mut *self.shared.anomalies.lock());
        let had_failures = !failures.is_empty();
        anomalies.extend(failures);

        let final_positions: BTreeMap<String, f64> = {
            let network = self.shared.network.lock();
            let positions = plan
                .gate_plans
                .keys()
                .filter_map(|key| network.gate_opening(key).map(|p| (key.clone(), p)))
                .collect();
            positions
        };

        let phase = if !emergency_stops.is_empty() {
            TransitionPhase::EmergencyStopped
        } else if had_failures {
            TransitionPhase::Failed
        } else {
            TransitionPhase::Completed
        };
        let completed = phase == TransitionPhase::Completed && all_completed;
        let duration_s = start.elapsed().as_secs_f64();
        let final_condition = self.condition();
        *self.shared.started.lock() = None;

        info!(
            plan = %plan.plan_id,
            ?phase,
            completed,
            duration_s,
            anomalies = anomalies.len(),
            "transition finished"
        );

        ExecutionResult {
            plan_id: plan.plan_id,
            completed,
            emergency_stops,
            anomalies,
            final_positions,
            duration_s,
            final_condition,
            phase,
            warnings,
        }
    }
}

fn due_at(start: Instant, offset_s: f64) -> Instant {
    start + Duration::try_from_secs_f64(offset_s.max(0.0)).unwrap_or_default()
}

async fn run_gate(shared: Arc<Shared>, key: String, start: Instant) -> GateOutcome {
    loop {
        let notified = shared.wake.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let due = {
            let mut active = shared.active.lock();
            let Some(transition) = active.get(&key) else {
                return GateOutcome::Cancelled;
            };
            let pending = transition.plan.steps.get(transition.next_step);
            match pending.map(|step| due_at(start, step.time_offset_s)) {
                Some(due) => due,
                None => {
                    active.remove(&key);
                    return GateOutcome::Completed;
                }
            }
        };

        tokio::select! {
            _ = sleep_until(due) => {}
            _ = &mut notified => continue,
        }

        let (report, finished) = {
            let mut active = shared.active.lock();
            let Some(transition) = active.get_mut(&key) else {
                return GateOutcome::Cancelled;
            };
            let Some(step) = transition.plan.steps.get(transition.next_step) else {
                active.remove(&key);
                return GateOutcome::Completed;
            };
            if due_at(start, step.time_offset_s) > Instant::now() {
                // rescheduled between wake-up and lock
                continue;
            }
            let position = step.target_position_m;
            let index = step.step_index;
            let report = shared.network.lock().apply_gate_opening(&key, position);
            let mut finished = report.error.is_some();
            if !finished {
                transition.next_step += 1;
                finished = transition.next_step >= transition.plan.steps.len();
                debug!(gate = %key, step = index, position, flow = report.flow_rate_m3s, "step applied");
            }
            if finished {
                active.remove(&key);
            }
            (report, finished)
        };

        if let Some(message) = report.error {
            return GateOutcome::Failed(message);
        }
        if finished {
            return GateOutcome::Completed;
        }
    }
}

async fn run_monitor(shared: Arc<Shared>, constraints: TransitionConstraints, interval: Duration, start: Instant) {
    let mut monitor = SystemMonitor::new(constraints.clone());
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = HydraulicCondition::Stable;

    loop {
        ticker.tick().await;
        let snapshot = shared.network.lock().snapshot();
        let elapsed_s = start.elapsed().as_secs_f64();
        let observation = monitor.observe(&snapshot, elapsed_s);

        for anomaly in &observation.anomalies {
            warn!(kind = ?anomaly.kind, location = %anomaly.location, value = anomaly.value, "{}", anomaly.message);
        }
        shared.anomalies.lock().extend(observation.anomalies.iter().cloned());
        *shared.condition.lock() = observation.condition;

        let condition = observation.condition;
        if condition == HydraulicCondition::ShockDetected {
            let reason = observation
                .anomalies
                .iter()
                .find(|a| a.kind == AnomalyKind::SuddenLevelChange)
                .map_or_else(|| "shock detected".to_string(), |a| a.message.clone());
            shared.halt(reason, condition);
            break;
        }
        let fresh = condition != last;
        if fresh {
            info!(from = %last, to = %condition, elapsed_s, "hydraulic condition changed");
            last = condition;
        }

        let damping = constraints.oscillation_damping_factor;
        let touched = match condition {
            HydraulicCondition::ShockRisk => shared.reschedule(
                fresh,
                |_| true,
                |plan, next| plan.stretch_from(next, elapsed_s, damping),
            ),
            HydraulicCondition::MajorOscillation => shared.reschedule(
                fresh,
                |_| true,
                |plan, next| plan.insert_holds(next, PRIORITY_HOLD_S),
            ),
            HydraulicCondition::MinorOscillation => shared.reschedule(
                fresh,
                |plan| plan.strategy == TransitionStrategy::Adaptive,
                |plan, next| plan.stretch_from(next, elapsed_s, damping),
            ),
            HydraulicCondition::Stable | HydraulicCondition::ShockDetected => 0,
        };
        if touched > 0 {
            debug!(%condition, gates = touched, "remaining schedules adjusted");
        }
    }
}
