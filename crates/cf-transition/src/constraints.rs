//! Safety limits applied to every transition.

use cf_project::ControllerDef;
use serde::{Deserialize, Serialize};

use crate::error::{TransitionError, TransitionResult};

/// Process-wide transition limits, read-only while a transition runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionConstraints {
    /// Percent of gate height per second
    pub max_gate_speed_percent_per_sec: f64,
    pub max_flow_change_m3s_per_min: f64,
    pub max_level_change_m_per_min: f64,
    pub max_velocity_m_per_s: f64,
    pub min_transition_time_s: f64,
    pub max_transition_time_s: f64,
    /// Applied to the remaining schedule when a shock risk appears; a
    /// factor of 0.7 stretches remaining intervals by 1/0.7.
    pub oscillation_damping_factor: f64,
    /// Level jump between two monitoring samples that stops everything (m)
    pub emergency_stop_threshold_m: f64,
}

impl Default for TransitionConstraints {
    fn default() -> Self {
        Self {
            max_gate_speed_percent_per_sec: 1.0,
            max_flow_change_m3s_per_min: 2.0,
            max_level_change_m_per_min: 0.1,
            max_velocity_m_per_s: 2.0,
            min_transition_time_s: 60.0,
            max_transition_time_s: 3600.0,
            oscillation_damping_factor: 0.7,
            emergency_stop_threshold_m: 0.5,
        }
    }
}

impl TransitionConstraints {
    pub fn validate(&self) -> TransitionResult<()> {
        let positive = [
            ("max_gate_speed_percent_per_sec", self.max_gate_speed_percent_per_sec),
            ("max_flow_change_m3s_per_min", self.max_flow_change_m3s_per_min),
            ("max_level_change_m_per_min", self.max_level_change_m_per_min),
            ("max_velocity_m_per_s", self.max_velocity_m_per_s),
            ("max_transition_time_s", self.max_transition_time_s),
            ("emergency_stop_threshold_m", self.emergency_stop_threshold_m),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(TransitionError::InvalidConstraint {
                    field,
                    value,
                    reason: "must be positive",
                });
            }
        }
        if !(self.min_transition_time_s.is_finite() && self.min_transition_time_s >= 0.0) {
            return Err(TransitionError::InvalidConstraint {
                field: "min_transition_time_s",
                value: self.min_transition_time_s,
                reason: "must be non-negative",
            });
        }
        if self.min_transition_time_s > self.max_transition_time_s {
            return Err(TransitionError::InvalidConstraint {
                field: "min_transition_time_s",
                value: self.min_transition_time_s,
                reason: "must not exceed max_transition_time_s",
            });
        }
        let damping = self.oscillation_damping_factor;
        if !(damping > 0.0 && damping <= 1.0) {
            return Err(TransitionError::InvalidConstraint {
                field: "oscillation_damping_factor",
                value: damping,
                reason: "must be in (0, 1]",
            });
        }
        Ok(())
    }

    /// Gate speed limit in m/s for a gate of the given height.
    pub fn max_gate_speed_m_per_s(&self, gate_height_m: f64) -> f64 {
        self.max_gate_speed_percent_per_sec / 100.0 * gate_height_m
    }
}

impl From<&ControllerDef> for TransitionConstraints {
    fn from(def: &ControllerDef) -> Self {
        Self {
            max_gate_speed_percent_per_sec: def.max_gate_speed_percent_per_sec,
            max_flow_change_m3s_per_min: def.max_flow_change_m3s_per_min,
            max_level_change_m_per_min: def.max_level_change_m_per_min,
            max_velocity_m_per_s: def.max_velocity_m_per_s,
            min_transition_time_s: def.min_transition_time_s,
            max_transition_time_s: def.max_transition_time_s,
            oscillation_damping_factor: def.oscillation_damping_factor,
            emergency_stop_threshold_m: def.emergency_stop_threshold_m,
        }
    }
}
