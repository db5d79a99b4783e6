//! SCOREGRID Plan
//!
//! Turns a planner's JSON answer into a [`Dag`], and a `Dag` into an
//! [`ApprovedDag`] once it passes structural validation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dag;
pub mod error;
pub mod planner;
pub mod validate;

pub use dag::{ApprovedDag, Dag, Edge, InputBinding, Node};
pub use error::PlanError;
pub use planner::{Planner, parse_plan};
pub use validate::DagValidator;
