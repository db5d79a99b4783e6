//! SCOREGRID Core Types
//!
//! This crate contains pure types and logic with no I/O.
//! Everything a plan, a worker or a report needs to agree on lives here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod feature;
pub mod goal;
pub mod id;
pub mod time;

// Re-exports
pub use error::{CoreError, CoreResult};
pub use feature::{FeatureBank, FeatureSet, Provenance};
pub use goal::Goal;
pub use id::{NodeId, RunId};
pub use time::LogicalTime;
