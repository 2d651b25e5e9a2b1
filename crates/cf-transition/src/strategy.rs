//! Shape of a gate's position curve over a transition.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const EXPONENTIAL_RATE: f64 = 3.0;
const S_CURVE_STEEPNESS: f64 = 10.0;
const S_CURVE_MIDPOINT: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionStrategy {
    /// Constant rate.
    #[default]
    Linear,
    /// Fast start, slow finish: `1 - e^(-3p)`.
    Exponential,
    /// Logistic ramp centred on the half-way point.
    SCurve,
    /// Planned linear; the execution loop also slows it on minor oscillation.
    Adaptive,
}

impl TransitionStrategy {
    /// Fraction of the move completed at progress `p` in `[0, 1]`.
    ///
    /// Every curve is normalised to run exactly from 0 to 1.
    pub fn progress(self, p: f64) -> f64 {
        let p = p.clamp(0.0, 1.0);
        match self {
            TransitionStrategy::Linear | TransitionStrategy::Adaptive => p,
            TransitionStrategy::Exponential => {
                (1.0 - (-EXPONENTIAL_RATE * p).exp()) / (1.0 - (-EXPONENTIAL_RATE).exp())
            }
            TransitionStrategy::SCurve => {
                let logistic = |x: f64| 1.0 / (1.0 + (-S_CURVE_STEEPNESS * (x - S_CURVE_MIDPOINT)).exp());
                let (lo, hi) = (logistic(0.0), logistic(1.0));
                (logistic(p) - lo) / (hi - lo)
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransitionStrategy::Linear => "linear",
            TransitionStrategy::Exponential => "exponential",
            TransitionStrategy::SCurve => "s_curve",
            TransitionStrategy::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for TransitionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransitionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "linear" => Ok(TransitionStrategy::Linear),
            "exponential" => Ok(TransitionStrategy::Exponential),
            "s_curve" | "scurve" => Ok(TransitionStrategy::SCurve),
            "adaptive" => Ok(TransitionStrategy::Adaptive),
            other => Err(format!("unknown transition strategy '{other}'")),
        }
    }
}
