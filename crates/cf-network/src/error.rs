//! Error types for network construction.

use cf_core::CfError;
use cf_hydraulics::HydraulicsError;
use thiserror::Error;

/// Errors raised while assembling or externally updating a network.
///
/// Calculation requests against unknown gates or nodes do not fail; they
/// return zero-valued reports carrying an `error` message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    #[error("Unknown node: {id}")]
    UnknownNode { id: String },

    #[error("Unknown gate: {key}")]
    UnknownGate { key: String },

    #[error("Invalid value for {what}: {value}")]
    InvalidValue { what: &'static str, value: f64 },

    #[error("Topology error: {0}")]
    Topology(#[from] CfError),

    #[error("Hydraulics error: {0}")]
    Hydraulics(#[from] HydraulicsError),
}

pub type NetworkResult<T> = Result<T, NetworkError>;

impl From<NetworkError> for CfError {
    fn from(e: NetworkError) -> Self {
        match e {
            NetworkError::UnknownNode { id } => CfError::UnknownRef { what: "node", id },
            NetworkError::UnknownGate { key } => CfError::UnknownRef { what: "gate", id: key },
            NetworkError::InvalidValue { what, .. } => CfError::InvalidArg { what },
            NetworkError::Topology(e) => e,
            NetworkError::Hydraulics(e) => e.into(),
        }
    }
}
