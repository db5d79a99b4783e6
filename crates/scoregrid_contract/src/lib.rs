//! SCOREGRID Contracts
//!
//! Named output schemas and the validator every node result passes
//! through. Worker output is assumed hostile until it validates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod criterion;
pub mod registry;
pub mod schema;
pub mod validate;

pub use criterion::{
    COMPOSITE_REPORT, CRITERION_SCORE, CompositeReport, CriterionScore, SCORE_MAX, SCORE_MIN,
};
pub use registry::{ContractRegistry, RegistryError};
pub use schema::{Contract, FieldKind, FieldSpec};
pub use validate::{DefectKind, FieldDefect, SchemaViolation, check_output, json_type};
