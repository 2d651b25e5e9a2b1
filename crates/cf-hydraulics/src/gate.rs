//! Gate descriptions and boundary conditions.

use serde::{Deserialize, Serialize};

use crate::coefficients::GateCoefficients;
use crate::error::{HydraulicsError, HydraulicsResult};

/// Hydraulic type of a gate. Behaviour differs only in the flow formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateType {
    /// Vertical-lift underflow gate.
    Sluice,
    /// Tainter gate; opening is the chord between lip and sill.
    Radial,
    /// Rotating disc; opening fraction maps to a 0-90° angle.
    ButterflyValve,
    /// Cross-regulator check gate.
    Check,
    /// Overshot gate; opening lowers the crest below the fully-raised top.
    Weir,
    /// Fixed-perimeter orifice that needs a drowned outlet to act as one.
    Orifice,
}

impl GateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateType::Sluice => "sluice",
            GateType::Radial => "radial",
            GateType::ButterflyValve => "butterfly_valve",
            GateType::Check => "check",
            GateType::Weir => "weir",
            GateType::Orifice => "orifice",
        }
    }

    /// Gates set in an open channel, which water can pass over once fully raised.
    pub fn is_open_channel(&self) -> bool {
        matches!(
            self,
            GateType::Sluice | GateType::Radial | GateType::Check | GateType::Weir
        )
    }
}

/// Flow regime through a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowRegime {
    /// Opening is zero.
    Closed,
    /// No water above the sill.
    Dry,
    /// Downstream level does not affect the discharge.
    Free,
    /// Downstream level reduces the effective driving head.
    Submerged,
    /// Water passes over the crest.
    Weir,
}

/// Immutable gate geometry and calibration, fixed at network load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateProperties {
    pub id: String,
    pub gate_type: GateType,
    /// Gate width b (m)
    pub width_m: f64,
    /// Fully-open dimension (m)
    pub height_m: f64,
    /// Bottom of the opening (m, datum-relative)
    pub sill_elevation_m: f64,
    /// Cd
    pub discharge_coefficient: f64,
    /// Cc
    pub contraction_coefficient: f64,
    pub min_opening_m: f64,
    pub max_opening_m: f64,
}

impl GateProperties {
    /// Create a gate using the type's default coefficients and a full
    /// `[0, height]` opening range.
    pub fn new(
        id: impl Into<String>,
        gate_type: GateType,
        width_m: f64,
        height_m: f64,
        sill_elevation_m: f64,
        coefficients: &GateCoefficients,
    ) -> HydraulicsResult<Self> {
        let defaults = coefficients.for_type(gate_type);
        let gate = Self {
            id: id.into(),
            gate_type,
            width_m,
            height_m,
            sill_elevation_m,
            discharge_coefficient: defaults.discharge,
            contraction_coefficient: defaults.contraction,
            min_opening_m: 0.0,
            max_opening_m: height_m,
        };
        gate.validate()?;
        Ok(gate)
    }

    /// Override calibrated coefficients.
    pub fn with_coefficients(mut self, cd: f64, cc: f64) -> HydraulicsResult<Self> {
        self.discharge_coefficient = cd;
        self.contraction_coefficient = cc;
        self.validate()?;
        Ok(self)
    }

    /// Restrict the controllable opening range.
    pub fn with_opening_limits(mut self, min_m: f64, max_m: f64) -> HydraulicsResult<Self> {
        self.min_opening_m = min_m;
        self.max_opening_m = max_m;
        self.validate()?;
        Ok(self)
    }

    /// Check geometry and the `0 <= min <= max <= height` invariant.
    pub fn validate(&self) -> HydraulicsResult<()> {
        let invalid = |what| {
            Err(HydraulicsError::InvalidGate {
                id: self.id.clone(),
                what,
            })
        };

        let values = [
            self.width_m,
            self.height_m,
            self.sill_elevation_m,
            self.discharge_coefficient,
            self.contraction_coefficient,
            self.min_opening_m,
            self.max_opening_m,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return invalid("non-finite value");
        }
        if self.width_m <= 0.0 {
            return invalid("width must be positive");
        }
        if self.height_m <= 0.0 {
            return invalid("height must be positive");
        }
        if self.discharge_coefficient <= 0.0 {
            return invalid("discharge coefficient must be positive");
        }
        if self.contraction_coefficient <= 0.0 || self.contraction_coefficient > 1.0 {
            return invalid("contraction coefficient must be in (0, 1]");
        }
        if self.min_opening_m < 0.0 {
            return invalid("min opening must be non-negative");
        }
        if self.min_opening_m > self.max_opening_m {
            return invalid("min opening exceeds max opening");
        }
        if self.max_opening_m > self.height_m {
            return invalid("max opening exceeds gate height");
        }
        Ok(())
    }

    /// Opening expressed as a percentage of the gate height.
    pub fn opening_percent(&self, opening_m: f64) -> f64 {
        opening_m / self.height_m * 100.0
    }

    /// Clamp an opening to `[0, max_opening]`; NaN maps to closed.
    pub fn clamp_opening(&self, opening_m: f64) -> f64 {
        if opening_m.is_nan() {
            return 0.0;
        }
        opening_m.clamp(0.0, self.max_opening_m)
    }
}

/// Boundary conditions for one gate flow calculation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HydraulicConditions {
    /// Absolute upstream water level (m)
    pub upstream_level_m: f64,
    /// Absolute downstream water level (m)
    pub downstream_level_m: f64,
    pub gate_opening_m: f64,
}

impl HydraulicConditions {
    pub fn new(upstream_level_m: f64, downstream_level_m: f64, gate_opening_m: f64) -> Self {
        Self {
            upstream_level_m,
            downstream_level_m,
            gate_opening_m,
        }
    }
}
