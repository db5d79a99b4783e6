//! SCOREGRID Workers
//!
//! The boundary to every worker role. A role is bound to one registered
//! [`Worker`]; the [`Invoker`] adds the per-call timeout and the retry
//! policy on top.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builtin;
pub mod invoker;
pub mod registry;
pub mod retry;
pub mod trait_;

pub use invoker::Invoker;
pub use registry::{RegisterError, WorkerRegistry};
pub use retry::RetryPolicy;
pub use trait_::{InvocationError, NodeInput, Worker, decode_response};
