//! Goal-to-report pipeline: plan, validate, execute.

use crate::composer::{ComposerWorker, CompositionPolicy};
use crate::config::OrchestratorConfig;
use crate::engine::{Engine, ExecutionError};
use crate::report::Report;
use scoregrid_core::{FeatureBank, Goal};
use scoregrid_plan::{DagValidator, PlanError, Planner};
use scoregrid_worker::builtin::{RuleScorer, StaticPlanner};
use scoregrid_worker::{Invoker, RegisterError, WorkerRegistry};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Orchestration error
#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    /// Planning or validation failed; nothing ran
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// Execution failed
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// Turns goals into reports
#[derive(Debug, Clone)]
pub struct Orchestrator {
    planner: Planner,
    validator: DagValidator,
    engine: Engine,
}

impl Orchestrator {
    /// Create an orchestrator over a worker registry
    #[must_use]
    pub fn new(registry: Arc<WorkerRegistry>, config: OrchestratorConfig) -> Self {
        let planner = Planner::new(Invoker::new(
            Arc::clone(&registry),
            config.engine.node_timeout(),
        ))
        .with_role(config.planner_role)
        .with_retry(config.engine.retry);
        Self {
            planner,
            validator: DagValidator::default(),
            engine: Engine::new(registry, config.engine),
        }
    }

    /// Plan, validate and execute a goal
    ///
    /// # Errors
    ///
    /// Returns error if planning, validation or execution fails
    pub async fn run(&self, goal: &Goal, features: &FeatureBank) -> Result<Report, OrchestrationError> {
        self.run_with_cancel(goal, features, CancellationToken::new())
            .await
    }

    /// Same as [`run`](Self::run), cancellable from outside
    ///
    /// # Errors
    ///
    /// Returns error if planning, validation or execution fails, or on
    /// cancellation
    pub async fn run_with_cancel(
        &self,
        goal: &Goal,
        features: &FeatureBank,
        cancel: CancellationToken,
    ) -> Result<Report, OrchestrationError> {
        let dag = self.planner.plan(goal).await?;
        let approved = self.validator.approve(dag).inspect_err(|e| {
            warn!(kind = e.kind(), error = %e, "plan rejected");
        })?;
        info!(
            nodes = approved.len(),
            terminals = approved.terminals().len(),
            dispatch = ?self.engine.config().dispatch,
            "plan approved"
        );
        Ok(self
            .engine
            .execute_with_cancel(&approved, goal, features, cancel)
            .await?)
    }
}

/// Registry with the static spinoff planner, the rule scorers and a composer
///
/// # Errors
///
/// Returns error if two built-ins share a role
pub fn builtin_registry(policy: CompositionPolicy) -> Result<WorkerRegistry, RegisterError> {
    let mut registry = WorkerRegistry::new();
    registry.register(Arc::new(StaticPlanner::spinoff_grid()))?;
    for scorer in RuleScorer::spinoff_scorers() {
        registry.register(Arc::new(scorer))?;
    }
    registry.register(Arc::new(ComposerWorker::new(policy)))?;
    Ok(registry)
}
