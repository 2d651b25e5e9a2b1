//! Gate opening solver: the inverse of the gate hydraulics engine.
//!
//! Underflow gates (sluice, radial, check, orifice) are inverted
//! algebraically per regime. Butterfly valves and overshot weirs have
//! non-linear opening laws and are solved by bisection on the engine.

use std::collections::{BTreeMap, HashMap};

use cf_core::constants::G_MPS2;
use cf_core::{bisect, finite_or_zero};
use cf_graph::gate_key;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::engine::GateHydraulics;
use crate::gate::{FlowRegime, GateProperties, GateType, HydraulicConditions};

const OPENING_TOL_M: f64 = 1e-7;
const MAX_BISECTION_ITERS: usize = 200;
/// Uniform samples used to locate the opening of peak flow.
const PEAK_SCAN_SAMPLES: usize = 256;
/// Ternary-search refinements around the best sample.
const PEAK_REFINE_ITERS: usize = 80;

/// Outcome of an opening request. Infeasibility is a normal result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpeningRequirement {
    pub target_flow_m3s: f64,
    pub required_opening_m: f64,
    pub opening_percent: f64,
    /// Flow the gate delivers at `required_opening_m`
    pub achievable_flow_m3s: f64,
    pub is_feasible: bool,
    pub flow_regime: FlowRegime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limiting_factor: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<String>,
}

impl OpeningRequirement {
    /// A zero-opening result that explains why no opening was found.
    pub fn infeasible(target: f64, regime: FlowRegime, limiting: impl Into<String>) -> Self {
        Self {
            target_flow_m3s: target,
            required_opening_m: 0.0,
            opening_percent: 0.0,
            achievable_flow_m3s: 0.0,
            is_feasible: false,
            flow_regime: regime,
            limiting_factor: Some(limiting.into()),
            recommendations: Vec::new(),
        }
    }
}

/// One gate of a batch schedule request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateScheduleRequest {
    pub upstream: String,
    pub downstream: String,
    pub gate: GateProperties,
    pub target_flow_m3s: f64,
}

/// Finds the opening that delivers a target flow.
#[derive(Debug, Clone, Copy)]
pub struct GateOpeningSolver<'e> {
    engine: &'e GateHydraulics,
}

impl<'e> GateOpeningSolver<'e> {
    pub fn new(engine: &'e GateHydraulics) -> Self {
        Self { engine }
    }

    /// Opening required for `target_flow` given the current boundary levels.
    pub fn calculate_required_opening(
        &self,
        target_flow: f64,
        gate: &GateProperties,
        upstream_level: f64,
        downstream_level: f64,
    ) -> OpeningRequirement {
        let h1 = upstream_level - gate.sill_elevation_m;
        let h2 = downstream_level - gate.sill_elevation_m;

        if !target_flow.is_finite() {
            return OpeningRequirement::infeasible(target_flow, FlowRegime::Closed, "invalid target flow");
        }

        if !(h1 > 0.0) {
            let mut result = OpeningRequirement::infeasible(target_flow, FlowRegime::Dry, "no water above sill");
            result.recommendations.push(format!(
                "Raise the upstream level above the sill at {:.2} m",
                gate.sill_elevation_m
            ));
            return result;
        }

        if target_flow <= 0.0 {
            return OpeningRequirement {
                target_flow_m3s: target_flow,
                required_opening_m: 0.0,
                opening_percent: 0.0,
                achievable_flow_m3s: 0.0,
                is_feasible: true,
                flow_regime: FlowRegime::Closed,
                limiting_factor: None,
                recommendations: Vec::new(),
            };
        }

        if h2 >= h1 && gate.gate_type != GateType::Weir {
            let mut result =
                OpeningRequirement::infeasible(target_flow, FlowRegime::Submerged, "no positive head across gate");
            result
                .recommendations
                .push("Lower the downstream level or raise the upstream level before opening".into());
            return result;
        }

        let opening = match gate.gate_type {
            GateType::Sluice | GateType::Radial | GateType::Check | GateType::Orifice => {
                self.analytic_opening(target_flow, gate, h1, h2)
            }
            GateType::ButterflyValve | GateType::Weir => {
                self.iterative_opening(target_flow, gate, upstream_level, downstream_level)
            }
        };

        self.finish(target_flow, gate, opening, upstream_level, downstream_level)
    }

    /// Batch entry point: one independent solve per gate, keyed `"up->down"`.
    pub fn calculate_gate_schedule(
        &self,
        gates_info: &[GateScheduleRequest],
        water_levels: &HashMap<String, f64>,
    ) -> BTreeMap<String, OpeningRequirement> {
        gates_info
            .par_iter()
            .map(|request| {
                let key = gate_key(&request.upstream, &request.downstream);
                let up = water_levels.get(&request.upstream);
                let down = water_levels.get(&request.downstream);
                let result = match (up, down) {
                    (Some(up), Some(down)) => {
                        self.calculate_required_opening(request.target_flow_m3s, &request.gate, *up, *down)
                    }
                    (None, _) => OpeningRequirement::infeasible(
                        request.target_flow_m3s,
                        FlowRegime::Closed,
                        format!("unknown water level at node {}", request.upstream),
                    ),
                    (_, None) => OpeningRequirement::infeasible(
                        request.target_flow_m3s,
                        FlowRegime::Closed,
                        format!("unknown water level at node {}", request.downstream),
                    ),
                };
                (key, result)
            })
            .collect::<Vec<_>>()
            .into_iter()
            .collect()
    }

    /// Invert `Q = Cd b (Cc a) sqrt(2 g h1)` (free) or
    /// `Q = Cd k b (Cc a) sqrt(2 g (h1 - h2))` (submerged).
    ///
    /// May return a value above `max_opening`; the caller handles overflow.
    fn analytic_opening(&self, target: f64, gate: &GateProperties, h1: f64, h2: f64) -> f64 {
        let coefficients = self.engine.coefficients();
        let cd = gate.discharge_coefficient;
        let cc = gate.contraction_coefficient;
        let b = gate.width_m;

        let free = target / (cd * b * (2.0 * G_MPS2 * h1).sqrt()) / cc;

        let ratio = if h2 > 0.0 { h2 / h1 } else { 0.0 };
        let threshold = coefficients.for_type(gate.gate_type).submergence_threshold;
        if ratio <= threshold {
            return free;
        }

        let k = coefficients.submerged_cd_multiplier(gate.gate_type, ratio);
        if k <= 0.0 {
            return f64::INFINITY;
        }
        let submerged = target / (cd * k * b * (2.0 * G_MPS2 * (h1 - h2)).sqrt()) / cc;

        // The submerged form only holds if the engine would call that opening submerged.
        if self.engine.is_submerged(gate, submerged, h2, ratio) {
            submerged
        } else {
            free
        }
    }

    /// Bisection on the engine's flow over `[0, peak]`.
    ///
    /// Weir flow is not monotone in the opening: a lower crest raises the
    /// tailwater ratio until the weir drowns, so full opening can carry less
    /// than a partial one.
    fn iterative_opening(&self, target: f64, gate: &GateProperties, upstream: f64, downstream: f64) -> f64 {
        let flow_at = |opening: f64| {
            self.engine
                .calculate_gate_flow(gate, &HydraulicConditions::new(upstream, downstream, opening))
                .flow_rate_m3s
        };

        let (peak, peak_flow) = self.peak_flow(gate, upstream, downstream);
        if peak_flow < target {
            return f64::INFINITY;
        }
        if flow_at(0.0) >= target {
            return 0.0;
        }

        bisect(0.0, peak, OPENING_TOL_M, MAX_BISECTION_ITERS, |a| flow_at(a) - target).unwrap_or(peak)
    }

    /// Opening and flow of the largest flow over `[0, max_opening]`: a
    /// uniform scan, then a ternary search within one sample of the best.
    fn peak_flow(&self, gate: &GateProperties, upstream: f64, downstream: f64) -> (f64, f64) {
        let flow_at = |opening: f64| {
            self.engine
                .calculate_gate_flow(gate, &HydraulicConditions::new(upstream, downstream, opening))
                .flow_rate_m3s
        };
        let step = gate.max_opening_m / PEAK_SCAN_SAMPLES as f64;

        let mut best = (0.0, 0.0);
        for i in 0..=PEAK_SCAN_SAMPLES {
            let opening = step * i as f64;
            let flow = flow_at(opening);
            if flow > best.1 {
                best = (opening, flow);
            }
        }

        let mut lo = (best.0 - step).max(0.0);
        let mut hi = (best.0 + step).min(gate.max_opening_m);
        for _ in 0..PEAK_REFINE_ITERS {
            let m1 = lo + (hi - lo) / 3.0;
            let m2 = hi - (hi - lo) / 3.0;
            let (q1, q2) = (flow_at(m1), flow_at(m2));
            for sample in [(m1, q1), (m2, q2)] {
                if sample.1 > best.1 {
                    best = sample;
                }
            }
            if q1 < q2 {
                lo = m1;
            } else {
                hi = m2;
            }
        }
        best
    }

    /// Opening at which the gate carries its largest flow.
    fn capacity_opening(&self, gate: &GateProperties, upstream: f64, downstream: f64) -> f64 {
        match gate.gate_type {
            GateType::ButterflyValve | GateType::Weir => self.peak_flow(gate, upstream, downstream).0,
            _ => gate.max_opening_m,
        }
    }

    /// Apply opening limits and build the report.
    fn finish(
        &self,
        target: f64,
        gate: &GateProperties,
        opening: f64,
        upstream: f64,
        downstream: f64,
    ) -> OpeningRequirement {
        let flow_at = |opening: f64| {
            self.engine
                .calculate_gate_flow(gate, &HydraulicConditions::new(upstream, downstream, opening))
        };

        if !(opening <= gate.max_opening_m) {
            let capacity = self.capacity_opening(gate, upstream, downstream);
            let at_max = flow_at(capacity);
            let shortfall = target - at_max.flow_rate_m3s;
            warn!(
                gate = %gate.id,
                target,
                max_flow = at_max.flow_rate_m3s,
                opening = capacity,
                "gate capacity exceeded"
            );
            return OpeningRequirement {
                target_flow_m3s: target,
                required_opening_m: capacity,
                opening_percent: gate.opening_percent(capacity),
                achievable_flow_m3s: at_max.flow_rate_m3s,
                is_feasible: false,
                flow_regime: at_max.flow_regime,
                limiting_factor: Some("gate capacity exceeded".into()),
                recommendations: vec![
                    format!(
                        "Maximum flow is {:.3} m3/s at {:.3} m opening; reduce the target by {:.3} m3/s",
                        at_max.flow_rate_m3s, capacity, shortfall
                    ),
                    "Open a parallel gate to share the flow".into(),
                    "Raise the upstream water level to increase the driving head".into(),
                ],
            };
        }

        if opening < gate.min_opening_m {
            let at_min = flow_at(gate.min_opening_m);
            return OpeningRequirement {
                target_flow_m3s: target,
                required_opening_m: gate.min_opening_m,
                opening_percent: gate.opening_percent(gate.min_opening_m),
                achievable_flow_m3s: at_min.flow_rate_m3s,
                is_feasible: false,
                flow_regime: at_min.flow_regime,
                limiting_factor: Some("below minimum controllable opening".into()),
                recommendations: vec![format!(
                    "Smallest controllable flow is {:.3} m3/s at {:.3} m; close the gate or accept the higher flow",
                    at_min.flow_rate_m3s, gate.min_opening_m
                )],
            };
        }

        let achieved = flow_at(opening);
        debug!(gate = %gate.id, target, opening, "required opening");
        OpeningRequirement {
            target_flow_m3s: target,
            required_opening_m: opening,
            opening_percent: finite_or_zero(gate.opening_percent(opening)),
            achievable_flow_m3s: achieved.flow_rate_m3s,
            is_feasible: true,
            flow_regime: achieved.flow_regime,
            limiting_factor: None,
            recommendations: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coefficients::GateCoefficients;

    fn sluice() -> GateProperties {
        GateProperties::new("A->B", GateType::Sluice, 3.0, 2.0, 100.0, &GateCoefficients::default())
            .unwrap()
            .with_opening_limits(0.05, 2.0)
            .unwrap()
    }

    #[test]
    fn no_head_is_infeasible() {
        let engine = GateHydraulics::default();
        let solver = GateOpeningSolver::new(&engine);
        let r = solver.calculate_required_opening(5.0, &sluice(), 99.0, 98.0);
        assert!(!r.is_feasible);
        assert_eq!(r.limiting_factor.as_deref(), Some("no water above sill"));
    }

    #[test]
    fn zero_target_closes_gate() {
        let engine = GateHydraulics::default();
        let solver = GateOpeningSolver::new(&engine);
        let r = solver.calculate_required_opening(0.0, &sluice(), 102.0, 100.5);
        assert!(r.is_feasible);
        assert_eq!(r.required_opening_m, 0.0);
    }

    #[test]
    fn free_flow_inverts_exactly() {
        let engine = GateHydraulics::default();
        let solver = GateOpeningSolver::new(&engine);
        let gate = sluice();
        let q = engine
            .calculate_gate_flow(&gate, &HydraulicConditions::new(102.0, 100.3, 0.7))
            .flow_rate_m3s;
        let r = solver.calculate_required_opening(q, &gate, 102.0, 100.3);
        assert!(r.is_feasible);
        assert_eq!(r.flow_regime, FlowRegime::Free);
        assert!((r.required_opening_m - 0.7).abs() < 1e-9);
    }

    #[test]
    fn submerged_flow_inverts() {
        let engine = GateHydraulics::default();
        let solver = GateOpeningSolver::new(&engine);
        let gate = sluice();
        let q = engine
            .calculate_gate_flow(&gate, &HydraulicConditions::new(102.0, 101.8, 0.7))
            .flow_rate_m3s;
        let r = solver.calculate_required_opening(q, &gate, 102.0, 101.8);
        assert_eq!(r.flow_regime, FlowRegime::Submerged);
        assert!((r.required_opening_m - 0.7).abs() < 1e-6);
    }

    #[test]
    fn capacity_exceeded_reports_max_flow() {
        let engine = GateHydraulics::default();
        let solver = GateOpeningSolver::new(&engine);
        let r = solver.calculate_required_opening(500.0, &sluice(), 102.0, 100.3);
        assert!(!r.is_feasible);
        assert_eq!(r.limiting_factor.as_deref(), Some("gate capacity exceeded"));
        assert_eq!(r.required_opening_m, 2.0);
        assert!(r.achievable_flow_m3s > 0.0 && r.achievable_flow_m3s < 500.0);
        assert_eq!(r.recommendations.len(), 3);
    }

    #[test]
    fn below_min_opening_reported() {
        let engine = GateHydraulics::default();
        let solver = GateOpeningSolver::new(&engine);
        let r = solver.calculate_required_opening(0.01, &sluice(), 102.0, 100.3);
        assert!(!r.is_feasible);
        assert_eq!(r.required_opening_m, 0.05);
        assert!(r.achievable_flow_m3s > 0.01);
    }

    #[test]
    fn butterfly_solved_iteratively() {
        let engine = GateHydraulics::default();
        let solver = GateOpeningSolver::new(&engine);
        let gate = GateProperties::new("V", GateType::ButterflyValve, 1.2, 1.2, 100.0, &GateCoefficients::default())
            .unwrap();
        let q = engine
            .calculate_gate_flow(&gate, &HydraulicConditions::new(103.0, 100.4, 0.6))
            .flow_rate_m3s;
        let r = solver.calculate_required_opening(q, &gate, 103.0, 100.4);
        assert!(r.is_feasible);
        assert!((r.required_opening_m - 0.6).abs() < 1e-4);
    }

    /// Crest drops with opening; 0.2 m between the pools drowns it past 2 m.
    fn drowning_weir() -> (GateProperties, f64, f64) {
        let gate = GateProperties::new("W", GateType::Weir, 2.0, 3.0, 100.0, &GateCoefficients::default()).unwrap();
        (gate, 103.0, 102.8)
    }

    #[test]
    fn weir_solved_below_drowning() {
        let engine = GateHydraulics::default();
        let solver = GateOpeningSolver::new(&engine);
        let (gate, up, down) = drowning_weir();
        let flow_at = |a: f64| {
            engine
                .calculate_gate_flow(&gate, &HydraulicConditions::new(up, down, a))
                .flow_rate_m3s
        };
        assert_eq!(flow_at(gate.max_opening_m), 0.0);

        let q = flow_at(1.0);
        let r = solver.calculate_required_opening(q, &gate, up, down);
        assert!(r.is_feasible, "{r:?}");
        assert!((r.required_opening_m - 1.0).abs() < 1e-4);
        assert!((r.achievable_flow_m3s - q).abs() < 1e-4 * q);
    }

    #[test]
    fn weir_capacity_is_the_peak_flow() {
        let engine = GateHydraulics::default();
        let solver = GateOpeningSolver::new(&engine);
        let (gate, up, down) = drowning_weir();
        let r = solver.calculate_required_opening(500.0, &gate, up, down);
        assert!(!r.is_feasible);
        assert_eq!(r.limiting_factor.as_deref(), Some("gate capacity exceeded"));
        assert!(r.required_opening_m > 1.0 && r.required_opening_m <= 2.0);
        assert!(r.achievable_flow_m3s > 0.0);
    }

    #[test]
    fn schedule_is_keyed_by_endpoints() {
        let engine = GateHydraulics::default();
        let solver = GateOpeningSolver::new(&engine);
        let requests = vec![
            GateScheduleRequest {
                upstream: "A".into(),
                downstream: "B".into(),
                gate: sluice(),
                target_flow_m3s: 3.0,
            },
            GateScheduleRequest {
                upstream: "B".into(),
                downstream: "X".into(),
                gate: sluice(),
                target_flow_m3s: 3.0,
            },
        ];
        let levels = HashMap::from([("A".to_string(), 102.0), ("B".to_string(), 100.4)]);
        let schedule = solver.calculate_gate_schedule(&requests, &levels);

        assert_eq!(schedule.len(), 2);
        assert!(schedule["A->B"].is_feasible);
        let missing = &schedule["B->X"];
        assert!(!missing.is_feasible);
        assert!(missing.limiting_factor.as_deref().unwrap().contains("X"));
    }
}
