//! Planner worker that returns a fixed plan document.

use crate::trait_::{InvocationError, Worker};
use async_trait::async_trait;
use scoregrid_contract::{COMPOSITE_REPORT, CRITERION_SCORE};
use serde_json::{Value, json};

/// Default role for planners
pub const PLANNER_ROLE: &str = "planner";

/// Answers every goal with the same plan
#[derive(Debug, Clone)]
pub struct StaticPlanner {
    role: String,
    plan: Value,
}

impl StaticPlanner {
    /// Planner returning `plan` under the default role
    #[must_use]
    pub fn new(plan: Value) -> Self {
        Self {
            role: PLANNER_ROLE.to_string(),
            plan,
        }
    }

    /// Serve a different role
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    /// Three rule scorers feeding one composer
    #[must_use]
    pub fn spinoff_grid() -> Self {
        Self::new(spinoff_grid_plan())
    }
}

/// The spinoff grid plan document
#[must_use]
pub fn spinoff_grid_plan() -> Value {
    json!({
        "nodes": [
            {
                "id": "score_debt",
                "role": "debt_loading_scorer",
                "inputs": [{ "feature": "capital_structure" }],
                "outputs": CRITERION_SCORE
            },
            {
                "id": "score_index",
                "role": "index_exclusion_scorer",
                "inputs": [{ "feature": "microstructure" }],
                "outputs": CRITERION_SCORE
            },
            {
                "id": "score_equity",
                "role": "equity_incentives_scorer",
                "inputs": [{ "feature": "ownership" }],
                "outputs": CRITERION_SCORE
            },
            {
                "id": "compose",
                "role": "composer",
                "inputs": ["score_debt", "score_index", "score_equity"],
                "outputs": COMPOSITE_REPORT
            }
        ],
        "edges": [
            { "from": "score_debt", "to": "compose" },
            { "from": "score_index", "to": "compose" },
            { "from": "score_equity", "to": "compose" }
        ],
        "contracts": {}
    })
}

#[async_trait]
impl Worker for StaticPlanner {
    fn role(&self) -> &str {
        &self.role
    }

    async fn invoke(&self, input: Value) -> Result<Value, InvocationError> {
        if input.get("goal").and_then(Value::as_str).is_none() {
            return Err(InvocationError::InvalidInput {
                role: self.role.clone(),
                reason: "expected {\"goal\": string}".to_string(),
            });
        }
        Ok(self.plan.clone())
    }
}
