//! Manning's-equation helpers for trapezoidal channel reaches.
//!
//! `V = (1/n) R^(2/3) S^(1/2)`, `Q = V A`. Manning's n carries the awkward
//! `s/m^(1/3)` unit, so the fractional power is taken on raw SI values and the
//! result is wrapped back into a typed quantity.

use cf_core::units::{Area, Length, Ratio, Velocity, VolumeRate};
use cf_core::{bisect, m, m2, mps};
use cf_graph::ChannelGeometry;
use serde::{Deserialize, Serialize};
use uom::si::area::square_meter;
use uom::si::length::meter;
use uom::si::ratio::ratio;
use uom::si::velocity::meter_per_second;
use uom::si::volume_rate::cubic_meter_per_second;

use crate::error::{HydraulicsError, HydraulicsResult};

const DEPTH_TOL_M: f64 = 1e-6;
const MAX_BRACKET_DOUBLINGS: usize = 40;

/// Friction characteristics of one reach at uniform flow.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelLoss {
    pub normal_depth_m: f64,
    pub area_m2: f64,
    pub hydraulic_radius_m: f64,
    pub velocity_ms: f64,
    /// Energy slope Sf (m/m); equals the bed slope at normal depth.
    pub friction_slope: f64,
    /// Sf * L (m)
    pub head_loss_m: f64,
}

/// Flow area of a trapezoid at depth `y`.
pub fn flow_area(geom: &ChannelGeometry, depth: Length) -> Area {
    let y = depth.get::<meter>();
    m2((geom.bottom_width_m + geom.side_slope * y) * y)
}

/// Wetted perimeter of a trapezoid at depth `y`.
pub fn wetted_perimeter(geom: &ChannelGeometry, depth: Length) -> Length {
    let y = depth.get::<meter>();
    m(geom.bottom_width_m + 2.0 * y * (1.0 + geom.side_slope * geom.side_slope).sqrt())
}

pub fn hydraulic_radius(geom: &ChannelGeometry, depth: Length) -> Length {
    let p = wetted_perimeter(geom, depth);
    if p.get::<meter>() <= 0.0 {
        return m(0.0);
    }
    flow_area(geom, depth) / p
}

pub fn manning_velocity(n: f64, radius: Length, slope: Ratio) -> Velocity {
    let r = radius.get::<meter>().max(0.0);
    let s = slope.get::<ratio>().max(0.0);
    if n <= 0.0 {
        return mps(0.0);
    }
    mps(r.powf(2.0 / 3.0) * s.sqrt() / n)
}

pub fn manning_discharge(n: f64, area: Area, radius: Length, slope: Ratio) -> VolumeRate {
    area * manning_velocity(n, radius, slope)
}

/// Friction slope that carries `flow_m3s` at `depth_m` in this section.
pub fn friction_slope(geom: &ChannelGeometry, depth_m: f64, flow_m3s: f64) -> f64 {
    let depth = m(depth_m);
    let a = flow_area(geom, depth).get::<square_meter>();
    let r = hydraulic_radius(geom, depth).get::<meter>();
    if a <= 0.0 || r <= 0.0 {
        return 0.0;
    }
    let v = flow_m3s / a;
    (v * geom.manning_n / r.powf(2.0 / 3.0)).powi(2)
}

fn uniform_discharge(geom: &ChannelGeometry, depth_m: f64) -> f64 {
    let depth = m(depth_m);
    manning_discharge(
        geom.manning_n,
        flow_area(geom, depth),
        hydraulic_radius(geom, depth),
        cf_core::unitless(geom.bed_slope),
    )
    .get::<cubic_meter_per_second>()
}

/// Depth at which uniform flow carries `flow_m3s`.
///
/// Zero for zero flow. A flat or adverse bed has no normal depth.
pub fn normal_depth(geom: &ChannelGeometry, flow_m3s: f64) -> HydraulicsResult<f64> {
    if !flow_m3s.is_finite() {
        return Err(HydraulicsError::InvalidArg {
            what: "flow must be finite",
        });
    }
    if flow_m3s <= 0.0 {
        return Ok(0.0);
    }
    if let Some(what) = geom.check() {
        return Err(HydraulicsError::InvalidArg { what });
    }
    if geom.bed_slope <= 0.0 {
        return Err(HydraulicsError::NotSupported {
            what: "normal depth on a flat bed",
        });
    }

    let mut hi = geom.depth_m;
    let mut doublings = 0;
    while uniform_discharge(geom, hi) < flow_m3s {
        hi *= 2.0;
        doublings += 1;
        if doublings > MAX_BRACKET_DOUBLINGS {
            return Err(HydraulicsError::ConvergenceFailed {
                what: "normal depth bracket",
            });
        }
    }

    bisect(0.0, hi, DEPTH_TOL_M, 200, |y| uniform_discharge(geom, y) - flow_m3s).ok_or(
        HydraulicsError::ConvergenceFailed {
            what: "normal depth",
        },
    )
}

/// Uniform-flow friction loss along a reach carrying `flow_m3s`.
pub fn reach_friction_loss(geom: &ChannelGeometry, flow_m3s: f64) -> HydraulicsResult<ChannelLoss> {
    let yn = normal_depth(geom, flow_m3s)?;
    let depth = m(yn);
    let area = flow_area(geom, depth).get::<square_meter>();
    let radius = hydraulic_radius(geom, depth).get::<meter>();
    let velocity = if area > 0.0 { flow_m3s / area } else { 0.0 };
    let sf = friction_slope(geom, yn, flow_m3s);

    Ok(ChannelLoss {
        normal_depth_m: yn,
        area_m2: area,
        hydraulic_radius_m: radius,
        velocity_ms: velocity,
        friction_slope: sf,
        head_loss_m: sf * geom.length_m,
    })
}

/// Velocity at uniform flow, or `None` when no normal depth exists.
pub fn uniform_velocity(geom: &ChannelGeometry, flow_m3s: f64) -> Option<f64> {
    reach_friction_loss(geom, flow_m3s)
        .ok()
        .map(|loss| loss.velocity_ms)
}
