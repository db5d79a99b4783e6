//! SCOREGRID Runtime
//!
//! Executes approved plans: the scheduler decides which nodes may run,
//! the executor drives one node through its attempts, and the engine
//! ties both to a [`Run`] and assembles the final [`Report`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod composer;
pub mod config;
pub mod engine;
pub mod executor;
pub mod orchestrator;
pub mod report;
pub mod run;
pub mod scheduler;

pub use composer::{COMPOSER_ROLE, Composer, ComposerWorker, CompositionPolicy};
pub use config::{ConfigError, DispatchMode, EngineConfig, OrchestratorConfig};
pub use engine::{Engine, ExecutionError};
pub use executor::{AttemptError, Executor, ExecutorResult, NodeTask};
pub use orchestrator::{OrchestrationError, Orchestrator, builtin_registry};
pub use report::{GRID_HEADER, GridRow, NodeOutcome, Report, RunStatus};
pub use run::{FailureReason, NodeFailure, NodeResult, NodeState, Run, RunError, Transition};
pub use scheduler::{ScheduleDecision, ScheduleError, Scheduler};
