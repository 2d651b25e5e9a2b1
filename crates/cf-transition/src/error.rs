//! Error types for transition planning.

use cf_core::CfError;
use cf_network::NetworkError;
use thiserror::Error;

/// Errors raised before a transition starts.
///
/// Problems during execution are reported in `ExecutionResult`, never as
/// errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransitionError {
    #[error("Invalid constraint {field}: {value} ({reason})")]
    InvalidConstraint {
        field: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
}

pub type TransitionResult<T> = Result<T, TransitionError>;

impl From<TransitionError> for CfError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::InvalidConstraint { field, .. } => CfError::InvalidArg { what: field },
            TransitionError::InvalidArg { what } => CfError::InvalidArg { what },
            TransitionError::Network(e) => e.into(),
        }
    }
}
