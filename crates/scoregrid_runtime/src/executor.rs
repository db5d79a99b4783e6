//! Single-node execution.
//!
//! Drives one node through its attempts: build the envelope, invoke the
//! worker, decode, validate. Schema defects are fed back on the next
//! attempt immediately; invocation errors back off first.

use crate::run::NodeResult;
use scoregrid_contract::{Contract, FieldDefect, SchemaViolation, check_output};
use scoregrid_core::NodeId;
use scoregrid_worker::{InvocationError, Invoker, NodeInput, RetryPolicy, decode_response};
use serde_json::Value;
use tracing::{debug, warn};

/// Everything needed to run one node
#[derive(Debug, Clone)]
pub struct NodeTask {
    /// Node id
    pub node_id: NodeId,
    /// Worker role
    pub role: String,
    /// Output contract
    pub contract: Contract,
    /// Bound inputs in declaration order
    pub inputs: Vec<Value>,
}

/// Why an attempt failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttemptError {
    /// Worker call failed
    #[error(transparent)]
    Invocation(#[from] InvocationError),

    /// Output rejected by the contract
    #[error(transparent)]
    Schema(#[from] SchemaViolation),
}

impl AttemptError {
    /// Field defects, when the output was rejected
    #[must_use]
    pub fn defects(&self) -> Vec<FieldDefect> {
        match self {
            Self::Schema(violation) => violation.defects.clone(),
            Self::Invocation(_) => Vec::new(),
        }
    }
}

/// Outcome of executing a node
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorResult {
    /// Output validated
    Succeeded(NodeResult),
    /// Attempt budget exhausted, or a non-retryable error
    Failed {
        /// Node id
        node_id: NodeId,
        /// Attempts made
        attempts: u32,
        /// Error of the last attempt
        last: AttemptError,
    },
}

impl ExecutorResult {
    /// Node the result belongs to
    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        match self {
            Self::Succeeded(result) => &result.node_id,
            Self::Failed { node_id, .. } => node_id,
        }
    }
}

/// Runs nodes against their workers
#[derive(Debug, Clone)]
pub struct Executor {
    invoker: Invoker,
    retry: RetryPolicy,
}

impl Executor {
    /// Create an executor
    #[must_use]
    pub fn new(invoker: Invoker, retry: RetryPolicy) -> Self {
        Self { invoker, retry }
    }

    /// Execute one node to a final outcome
    pub async fn execute(&self, task: NodeTask) -> ExecutorResult {
        let mut attempt = 1;
        let mut feedback: Vec<Value> = Vec::new();

        loop {
            let envelope = NodeInput {
                node: task.node_id.clone(),
                role: task.role.clone(),
                inputs: task.inputs.clone(),
                attempt,
                feedback: std::mem::take(&mut feedback),
            };
            debug!(node_id = %task.node_id, attempt, "dispatching node");

            let error = match self.invoker.invoke_once(&task.role, envelope.to_json()).await {
                Ok(response) => {
                    let output = decode_response(response);
                    match check_output(&task.contract, &output) {
                        Ok(()) => {
                            return ExecutorResult::Succeeded(NodeResult {
                                node_id: task.node_id,
                                role: task.role,
                                contract: task.contract.name,
                                output,
                                attempts: attempt,
                            });
                        }
                        Err(violation) => AttemptError::Schema(violation),
                    }
                }
                Err(e) => AttemptError::Invocation(e),
            };

            let retryable = match &error {
                AttemptError::Schema(_) => true,
                AttemptError::Invocation(e) => e.is_retryable(),
            };
            if !retryable || !self.retry.allows_another(attempt) {
                return ExecutorResult::Failed {
                    node_id: task.node_id,
                    attempts: attempt,
                    last: error,
                };
            }

            warn!(
                node_id = %task.node_id,
                attempt,
                max_attempts = self.retry.max_attempts,
                error = %error,
                "attempt failed, retrying"
            );
            match &error {
                AttemptError::Schema(violation) => feedback = violation.feedback(),
                AttemptError::Invocation(_) => tokio::time::sleep(self.retry.backoff(attempt)).await,
            }
            attempt += 1;
        }
    }
}
