//! Error types for hydraulic calculations.

use cf_core::CfError;
use thiserror::Error;

/// Errors raised while constructing gates or evaluating channel hydraulics.
///
/// Runtime outcomes such as infeasible openings or unknown ids are reported
/// as values, not errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HydraulicsError {
    #[error("Invalid gate {id}: {what}")]
    InvalidGate { id: String, what: &'static str },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Not supported: {what}")]
    NotSupported { what: &'static str },

    #[error("Convergence failed: {what}")]
    ConvergenceFailed { what: &'static str },
}

pub type HydraulicsResult<T> = Result<T, HydraulicsError>;

impl From<HydraulicsError> for CfError {
    fn from(e: HydraulicsError) -> Self {
        match e {
            HydraulicsError::InvalidGate { what, .. } => CfError::InvalidArg { what },
            HydraulicsError::InvalidArg { what } => CfError::InvalidArg { what },
            HydraulicsError::NotSupported { what } => CfError::InvalidArg { what },
            HydraulicsError::ConvergenceFailed { what } => CfError::Invariant {
                what: what.to_string(),
            },
        }
    }
}
