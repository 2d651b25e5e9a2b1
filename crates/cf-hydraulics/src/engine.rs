//! Gate hydraulics engine: flow through a gate from geometry and levels.
//!
//! Regime selection:
//! - opening <= 0 => closed, no flow
//! - upstream head <= 0 => dry, no flow
//! - opening >= height and upstream head > height => weir flow over the top
//!   (open-channel gates only; valves and orifices cannot be overtopped)
//! - submergence ratio h2/h1 above the type threshold => submerged
//! - otherwise free flow
//!
//! Overshot (`Weir`) gates always use the weir equation over a crest that
//! drops as the gate opens.

use std::f64::consts::FRAC_PI_2;

use cf_core::constants::G_MPS2;
use cf_core::finite_or_zero;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coefficients::GateCoefficients;
use crate::gate::{FlowRegime, GateProperties, GateType, HydraulicConditions};

/// Butterfly opening angle below which the disc passes almost nothing.
const BUTTERFLY_CRACK_ANGLE_DEG: f64 = 9.0;
/// Area fraction at the crack angle.
const BUTTERFLY_CRACK_AREA: f64 = 0.01;
/// Area fraction at 45°.
const BUTTERFLY_MID_AREA: f64 = 0.40;

/// Result of one gate flow calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateFlow {
    pub flow_rate_m3s: f64,
    pub flow_regime: FlowRegime,
    /// Diagnostic: Q / (width * opening)
    pub velocity_ms: f64,
    /// Diagnostic: v / sqrt(g * opening)
    pub froude_number: f64,
    /// Opening actually used after clamping (m)
    pub opening_m: f64,
    pub opening_percent: f64,
    /// h2/h1 relative to the sill (or crest for weir flow); 0 when undefined
    pub submergence_ratio: f64,
    /// Downstream level at or above upstream level
    pub backflow: bool,
}

impl GateFlow {
    fn no_flow(regime: FlowRegime, opening_m: f64, opening_percent: f64) -> Self {
        Self {
            flow_rate_m3s: 0.0,
            flow_regime: regime,
            velocity_ms: 0.0,
            froude_number: 0.0,
            opening_m,
            opening_percent,
            submergence_ratio: 0.0,
            backflow: false,
        }
    }
}

/// Free underflow discharge `Q = Cd * b * a * sqrt(2 g h)`.
///
/// `opening_m` is the effective (already contracted) opening.
pub fn free_orifice_discharge(cd: f64, width_m: f64, opening_m: f64, head_m: f64) -> f64 {
    if head_m <= 0.0 || opening_m <= 0.0 {
        return 0.0;
    }
    cd * width_m * opening_m * (2.0 * G_MPS2 * head_m).sqrt()
}

/// Fraction of the full port area exposed at a butterfly disc angle.
///
/// Near zero below the crack angle, sinusoidal growth to 45°, linear to 90°.
pub fn butterfly_area_ratio(angle_deg: f64) -> f64 {
    let angle = angle_deg.clamp(0.0, 90.0);
    if angle < BUTTERFLY_CRACK_ANGLE_DEG {
        BUTTERFLY_CRACK_AREA * angle / BUTTERFLY_CRACK_ANGLE_DEG
    } else if angle <= 45.0 {
        let t = (angle - BUTTERFLY_CRACK_ANGLE_DEG) / (45.0 - BUTTERFLY_CRACK_ANGLE_DEG);
        BUTTERFLY_CRACK_AREA + (BUTTERFLY_MID_AREA - BUTTERFLY_CRACK_AREA) * (t * FRAC_PI_2).sin()
    } else {
        BUTTERFLY_MID_AREA + (1.0 - BUTTERFLY_MID_AREA) * (angle - 45.0) / 45.0
    }
}

/// Stateless gate flow calculator.
#[derive(Debug, Clone, Default)]
pub struct GateHydraulics {
    coefficients: GateCoefficients,
}

impl GateHydraulics {
    pub fn new(coefficients: GateCoefficients) -> Self {
        Self { coefficients }
    }

    pub fn coefficients(&self) -> &GateCoefficients {
        &self.coefficients
    }

    /// Compute flow, regime and diagnostics for a gate.
    ///
    /// The opening in `conditions` is clamped to `[0, max_opening]` on a
    /// local copy; the caller's value is untouched.
    pub fn calculate_gate_flow(
        &self,
        gate: &GateProperties,
        conditions: &HydraulicConditions,
    ) -> GateFlow {
        let opening = gate.clamp_opening(conditions.gate_opening_m);
        let opening_percent = gate.opening_percent(opening);

        if opening <= 0.0 {
            return GateFlow::no_flow(FlowRegime::Closed, opening, opening_percent);
        }

        let h1 = conditions.upstream_level_m - gate.sill_elevation_m;
        let h2 = conditions.downstream_level_m - gate.sill_elevation_m;

        if !(h1 > 0.0) {
            return GateFlow::no_flow(FlowRegime::Dry, opening, opening_percent);
        }

        let (flow, regime, ratio) = if gate.gate_type == GateType::Weir {
            let crest = gate.sill_elevation_m + gate.height_m - opening;
            let (q, ratio) = self.weir_discharge(
                gate.discharge_coefficient,
                gate.width_m,
                crest,
                conditions.upstream_level_m,
                conditions.downstream_level_m,
            );
            (q, FlowRegime::Weir, ratio)
        } else if h2 >= h1 {
            // No positive head across the gate; the caller decides how to warn.
            let mut flow = GateFlow::no_flow(FlowRegime::Submerged, opening, opening_percent);
            flow.submergence_ratio = h2 / h1;
            flow.backflow = h2 > h1;
            return flow;
        } else if gate.gate_type.is_open_channel() && opening >= gate.height_m && h1 > gate.height_m {
            let crest = gate.sill_elevation_m + gate.height_m;
            let (q, ratio) = self.weir_discharge(
                gate.discharge_coefficient,
                gate.width_m,
                crest,
                conditions.upstream_level_m,
                conditions.downstream_level_m,
            );
            (q, FlowRegime::Weir, ratio)
        } else {
            let ratio = if h2 > 0.0 { h2 / h1 } else { 0.0 };
            let q_free = self.free_discharge(gate, opening, h1);
            if self.is_submerged(gate, opening, h2, ratio) {
                let q = q_free * self.coefficients.submerged_reduction(gate.gate_type, ratio);
                (q, FlowRegime::Submerged, ratio)
            } else {
                (q_free, FlowRegime::Free, ratio)
            }
        };

        let flow = finite_or_zero(flow).max(0.0);
        let velocity = finite_or_zero(flow / (gate.width_m * opening));
        let froude = finite_or_zero(velocity / (G_MPS2 * opening).sqrt());

        debug!(
            gate = %gate.id,
            opening,
            h1,
            h2,
            flow,
            ?regime,
            "gate flow"
        );

        GateFlow {
            flow_rate_m3s: flow,
            flow_regime: regime,
            velocity_ms: velocity,
            froude_number: froude,
            opening_m: opening,
            opening_percent,
            submergence_ratio: ratio,
            backflow: false,
        }
    }

    /// Submerged-regime test shared with the opening solver.
    ///
    /// Orifice gates additionally need the downstream level above the top of
    /// the opening.
    pub fn is_submerged(&self, gate: &GateProperties, opening: f64, h2: f64, ratio: f64) -> bool {
        let threshold = self
            .coefficients
            .for_type(gate.gate_type)
            .submergence_threshold;
        if ratio <= threshold {
            return false;
        }
        match gate.gate_type {
            GateType::Orifice => h2 > opening,
            _ => true,
        }
    }

    /// Free-flow discharge for underflow gate types.
    fn free_discharge(&self, gate: &GateProperties, opening: f64, h1: f64) -> f64 {
        match gate.gate_type {
            GateType::ButterflyValve => {
                let fraction = (opening / gate.height_m).clamp(0.0, 1.0);
                let area_ratio = butterfly_area_ratio(fraction * 90.0);
                // Cd falls off as the disc closes.
                let cd = gate.discharge_coefficient * (0.5 + 0.5 * area_ratio);
                let area = area_ratio * gate.width_m * gate.height_m;
                cd * area * (2.0 * G_MPS2 * h1).sqrt()
            }
            GateType::Sluice | GateType::Radial | GateType::Check | GateType::Orifice | GateType::Weir => {
                let effective = opening * gate.contraction_coefficient;
                free_orifice_discharge(gate.discharge_coefficient, gate.width_m, effective, h1)
            }
        }
    }

    /// Sharp-crested weir discharge with tailwater reduction.
    ///
    /// Returns `(flow, tailwater ratio)`. Flow is zero once the tailwater
    /// ratio exceeds the drowned-out limit.
    fn weir_discharge(&self, cd: f64, width: f64, crest: f64, upstream: f64, downstream: f64) -> (f64, f64) {
        let head = upstream - crest;
        if head <= 0.0 {
            return (0.0, 0.0);
        }
        let tail = downstream - crest;
        let ratio = if tail > 0.0 { tail / head } else { 0.0 };
        if ratio > self.coefficients.weir_drowned_ratio {
            return (0.0, ratio);
        }
        let reduction = if ratio > 0.0 {
            self.coefficients.submerged_reduction(GateType::Weir, ratio)
        } else {
            1.0
        };
        let q = cd * width * (2.0 / 3.0) * (2.0 * G_MPS2).sqrt() * head.powf(1.5) * reduction;
        (q, ratio)
    }
}
