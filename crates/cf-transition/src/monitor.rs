//! Anomaly detection and hydraulic condition classification.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use cf_network::NetworkSnapshot;
use serde::{Deserialize, Serialize};

use crate::constraints::TransitionConstraints;

/// Level samples kept per node.
pub const HISTORY_LEN: usize = 10;
/// Level differences smaller than this do not count as a direction (m).
pub const OSCILLATION_DEAD_BAND_M: f64 = 1e-3;
/// Sign changes for minor / major oscillation.
pub const MINOR_OSCILLATION_CHANGES: usize = 2;
pub const MAJOR_OSCILLATION_CHANGES: usize = 4;
/// Fraction of the velocity limit treated as shock risk.
pub const SHOCK_RISK_VELOCITY_FRACTION: f64 = 0.9;

/// Overall condition, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HydraulicCondition {
    #[default]
    Stable,
    MinorOscillation,
    MajorOscillation,
    ShockRisk,
    ShockDetected,
}

impl fmt::Display for HydraulicCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HydraulicCondition::Stable => "stable",
            HydraulicCondition::MinorOscillation => "minor_oscillation",
            HydraulicCondition::MajorOscillation => "major_oscillation",
            HydraulicCondition::ShockRisk => "shock_risk",
            HydraulicCondition::ShockDetected => "shock_detected",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Level jump between two samples above the emergency threshold.
    SuddenLevelChange,
    /// Level rate above the per-minute limit.
    RapidLevelChange,
    ExcessiveVelocity,
    /// A gate's execution task failed.
    GateFailure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    /// Node id or gate key
    pub location: String,
    pub value: f64,
    pub threshold: f64,
    /// Seconds since execution start
    pub elapsed_s: f64,
    pub message: String,
}

/// Number of direction reversals in a level series, ignoring moves within
/// the dead band.
pub fn count_sign_changes(history: &[f64]) -> usize {
    let mut changes = 0;
    let mut last_sign = 0.0;
    for pair in history.windows(2) {
        let diff = pair[1] - pair[0];
        if diff.abs() < OSCILLATION_DEAD_BAND_M {
            continue;
        }
        let sign = diff.signum();
        if last_sign != 0.0 && sign != last_sign {
            changes += 1;
        }
        last_sign = sign;
    }
    changes
}

pub fn classify_oscillation(sign_changes: usize) -> HydraulicCondition {
    if sign_changes >= MAJOR_OSCILLATION_CHANGES {
        HydraulicCondition::MajorOscillation
    } else if sign_changes >= MINOR_OSCILLATION_CHANGES {
        HydraulicCondition::MinorOscillation
    } else {
        HydraulicCondition::Stable
    }
}

/// Result of one monitoring sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub condition: HydraulicCondition,
    pub anomalies: Vec<Anomaly>,
    pub max_sign_changes: usize,
    pub max_velocity_m_per_s: f64,
}

/// Keeps per-node level history between samples.
#[derive(Debug, Clone)]
pub struct SystemMonitor {
    constraints: TransitionConstraints,
    history: BTreeMap<String, VecDeque<f64>>,
    last_elapsed_s: Option<f64>,
}

impl SystemMonitor {
    pub fn new(constraints: TransitionConstraints) -> Self {
        Self {
            constraints,
            history: BTreeMap::new(),
            last_elapsed_s: None,
        }
    }

    /// Recent levels of one node, oldest first.
    pub fn history(&self, node: &str) -> Vec<f64> {
        self.history
            .get(node)
            .map(|h| h.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Record a snapshot taken `elapsed_s` after start and classify.
    ///
    /// A sudden level change wins over everything, then shock risk from
    /// velocity, then oscillation.
    pub fn observe(&mut self, snapshot: &NetworkSnapshot, elapsed_s: f64) -> Observation {
        let mut anomalies = Vec::new();
        let dt = self.last_elapsed_s.map(|t| elapsed_s - t).filter(|dt| *dt > 0.0);
        self.last_elapsed_s = Some(elapsed_s);

        let mut sudden = false;
        let mut max_sign_changes = 0;
        for (node, level) in &snapshot.node_levels {
            let history = self.history.entry(node.clone()).or_default();
            if let Some(&previous) = history.back() {
                let change = (level - previous).abs();
                if change > self.constraints.emergency_stop_threshold_m {
                    sudden = true;
                    anomalies.push(Anomaly {
                        kind: AnomalyKind::SuddenLevelChange,
                        location: node.clone(),
                        value: change,
                        threshold: self.constraints.emergency_stop_threshold_m,
                        elapsed_s,
                        message: format!("level at {node} changed {change:.3} m between samples"),
                    });
                } else if let Some(dt) = dt {
                    let rate = change / dt * 60.0;
                    if rate > self.constraints.max_level_change_m_per_min {
                        anomalies.push(Anomaly {
                            kind: AnomalyKind::RapidLevelChange,
                            location: node.clone(),
                            value: rate,
                            threshold: self.constraints.max_level_change_m_per_min,
                            elapsed_s,
                            message: format!("level at {node} changing {rate:.3} m/min"),
                        });
                    }
                }
            }
            history.push_back(*level);
            if history.len() > HISTORY_LEN {
                history.pop_front();
            }
            max_sign_changes = max_sign_changes.max(count_sign_changes(history.make_contiguous()));
        }

        let mut max_velocity = 0.0_f64;
        for (reach, velocity) in &snapshot.reach_velocities {
            max_velocity = max_velocity.max(*velocity);
            if *velocity > self.constraints.max_velocity_m_per_s {
                anomalies.push(Anomaly {
                    kind: AnomalyKind::ExcessiveVelocity,
                    location: reach.clone(),
                    value: *velocity,
                    threshold: self.constraints.max_velocity_m_per_s,
                    elapsed_s,
                    message: format!("velocity in {reach} is {velocity:.2} m/s"),
                });
            }
        }

        let condition = if sudden {
            HydraulicCondition::ShockDetected
        } else if max_velocity >= SHOCK_RISK_VELOCITY_FRACTION * self.constraints.max_velocity_m_per_s {
            HydraulicCondition::ShockRisk
        } else {
            classify_oscillation(max_sign_changes)
        };

        Observation {
            condition,
            anomalies,
            max_sign_changes,
            max_velocity_m_per_s: max_velocity,
        }
    }
}
