//! cf-core: stable foundation for canalflow.
//!
//! Contains:
//! - units (uom SI types + constructors, gravity)
//! - numeric (Real + tolerances + float helpers)
//! - ids (compact IDs for graph objects)
//! - error (shared error types)

pub mod error;
pub mod ids;
pub mod numeric;
pub mod units;

pub use error::{CfError, CfResult};
pub use ids::*;
pub use numeric::*;
pub use units::*;
