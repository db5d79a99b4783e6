//! Planner adapter: goal in, plan document out.

use crate::dag::Dag;
use crate::error::PlanError;
use scoregrid_core::Goal;
use scoregrid_worker::builtin::PLANNER_ROLE;
use scoregrid_worker::{Invoker, RetryPolicy, decode_response};
use serde_json::{Value, json};
use tracing::info;

const REQUIRED_KEYS: [&str; 3] = ["nodes", "edges", "contracts"];

/// Asks the planning role for a plan
#[derive(Debug, Clone)]
pub struct Planner {
    invoker: Invoker,
    role: String,
    retry: RetryPolicy,
}

impl Planner {
    /// Planner using the default role
    #[must_use]
    pub fn new(invoker: Invoker) -> Self {
        Self {
            invoker,
            role: PLANNER_ROLE.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    /// Use a different planning role
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    /// Use a different retry policy for the invocation
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Planning role
    #[must_use]
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Produce a plan for a goal
    ///
    /// # Errors
    ///
    /// Returns `PlannerUnavailable` if the worker cannot be reached and
    /// `MalformedPlan` if its answer is not a plan document
    pub async fn plan(&self, goal: &Goal) -> Result<Dag, PlanError> {
        let response = self
            .invoker
            .invoke_retrying(&self.role, json!({ "goal": goal.as_str() }), &self.retry)
            .await
            .map_err(|e| PlanError::PlannerUnavailable {
                reason: e.to_string(),
            })?;

        let dag = parse_plan(response)?;
        info!(
            role = %self.role,
            nodes = dag.nodes.len(),
            edges = dag.edges.len(),
            contracts = dag.contracts.len(),
            "plan received"
        );
        Ok(dag)
    }
}

/// Parse a planner response into a plan document
///
/// # Errors
///
/// Returns `MalformedPlan` for anything but a complete plan object
pub fn parse_plan(response: Value) -> Result<Dag, PlanError> {
    let value = decode_response(response);
    if value.is_string() {
        return Err(PlanError::malformed("response is not a JSON document"));
    }

    let obj = value
        .as_object()
        .ok_or_else(|| PlanError::malformed("plan must be a JSON object"))?;
    for key in REQUIRED_KEYS {
        if !obj.contains_key(key) {
            return Err(PlanError::malformed(format!("missing key `{key}`")));
        }
    }

    serde_json::from_value(value).map_err(|e| PlanError::malformed(e.to_string()))
}
