//! Run state: one goal, one approved plan, and the results so far.

use scoregrid_contract::FieldDefect;
use scoregrid_core::{Goal, LogicalTime, NodeId, RunId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Lifecycle state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Waiting on upstream nodes
    Pending,
    /// All upstream nodes succeeded
    Ready,
    /// Dispatched to its worker
    Running,
    /// Output validated and stored
    Succeeded,
    /// Attempt budget exhausted, or cancelled while running
    Failed,
    /// Never ran because of a failed ancestor or cancellation
    Blocked,
}

impl NodeState {
    /// Check if the state is final
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Blocked)
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
        };
        f.write_str(name)
    }
}

/// Validated output of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    /// Node that produced it
    pub node_id: NodeId,
    /// Role of the worker
    pub role: String,
    /// Contract it satisfied
    pub contract: String,
    /// The output
    pub output: Value,
    /// Attempts used
    pub attempts: u32,
}

/// Why a node did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    /// Every attempt failed
    RetriesExhausted {
        /// Attempts made
        attempts: u32,
        /// Error of the last attempt
        last_error: String,
        /// Field defects of the last attempt, if its output was rejected
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        defects: Vec<FieldDefect>,
    },
    /// An ancestor failed
    AncestorFailed {
        /// Smallest-id failed ancestor
        ancestor: NodeId,
    },
    /// The run was cancelled
    Cancelled,
}

/// Failure marker stored instead of a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFailure {
    /// `Failed` or `Blocked`
    pub state: NodeState,
    /// Cause
    #[serde(flatten)]
    pub reason: FailureReason,
}

impl NodeFailure {
    /// Node ran and failed
    #[must_use]
    pub const fn failed(reason: FailureReason) -> Self {
        Self {
            state: NodeState::Failed,
            reason,
        }
    }

    /// Node never ran
    #[must_use]
    pub const fn blocked(reason: FailureReason) -> Self {
        Self {
            state: NodeState::Blocked,
            reason,
        }
    }
}

/// A state change stamped with logical time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// When
    pub at: LogicalTime,
    /// Which node
    pub node: NodeId,
    /// New state
    pub state: NodeState,
}

/// Error writing to a run
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunError {
    /// Node already has a result or failure marker
    #[error("Node {node} already has a recorded outcome")]
    AlreadyRecorded {
        /// Node id
        node: NodeId,
    },
}

/// Execution instance of one plan
#[derive(Debug, Clone)]
pub struct Run {
    id: RunId,
    goal: Goal,
    results: BTreeMap<NodeId, NodeResult>,
    failures: BTreeMap<NodeId, NodeFailure>,
    trace: Vec<Transition>,
}

impl Run {
    /// Start a run for a goal
    #[must_use]
    pub fn new(goal: Goal) -> Self {
        Self {
            id: RunId::new(),
            goal,
            results: BTreeMap::new(),
            failures: BTreeMap::new(),
            trace: Vec::new(),
        }
    }

    /// Run id
    #[must_use]
    pub const fn id(&self) -> RunId {
        self.id
    }

    /// Goal
    #[must_use]
    pub fn goal(&self) -> &Goal {
        &self.goal
    }

    fn ensure_unrecorded(&self, node: &NodeId) -> Result<(), RunError> {
        if self.results.contains_key(node) || self.failures.contains_key(node) {
            return Err(RunError::AlreadyRecorded { node: node.clone() });
        }
        Ok(())
    }

    /// Store a node's result
    ///
    /// # Errors
    ///
    /// Returns error if the node already has an outcome
    pub fn record_success(&mut self, result: NodeResult) -> Result<(), RunError> {
        self.ensure_unrecorded(&result.node_id)?;
        self.results.insert(result.node_id.clone(), result);
        Ok(())
    }

    /// Store a node's failure marker
    ///
    /// # Errors
    ///
    /// Returns error if the node already has an outcome
    pub fn record_failure(&mut self, node: NodeId, failure: NodeFailure) -> Result<(), RunError> {
        self.ensure_unrecorded(&node)?;
        self.failures.insert(node, failure);
        Ok(())
    }

    /// Append transitions to the trace
    pub fn extend_trace(&mut self, transitions: impl IntoIterator<Item = Transition>) {
        self.trace.extend(transitions);
    }

    /// Result of a node
    #[must_use]
    pub fn result(&self, node: &NodeId) -> Option<&NodeResult> {
        self.results.get(node)
    }

    /// Failure marker of a node
    #[must_use]
    pub fn failure(&self, node: &NodeId) -> Option<&NodeFailure> {
        self.failures.get(node)
    }

    /// All results
    #[must_use]
    pub fn results(&self) -> &BTreeMap<NodeId, NodeResult> {
        &self.results
    }

    /// All failure markers
    #[must_use]
    pub fn failures(&self) -> &BTreeMap<NodeId, NodeFailure> {
        &self.failures
    }

    /// State transitions in logical-time order
    #[must_use]
    pub fn trace(&self) -> &[Transition] {
        &self.trace
    }

    /// Terminal-state assignment of every recorded node
    #[must_use]
    pub fn terminal_states(&self) -> BTreeMap<NodeId, NodeState> {
        self.results
            .keys()
            .map(|id| (id.clone(), NodeState::Succeeded))
            .chain(self.failures.iter().map(|(id, f)| (id.clone(), f.state)))
            .collect()
    }

    /// Check if anything was cancelled
    #[must_use]
    pub fn was_cancelled(&self) -> bool {
        self.failures
            .values()
            .any(|f| f.reason == FailureReason::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(id: &str) -> NodeResult {
        NodeResult {
            node_id: NodeId::new(id),
            role: "r".to_string(),
            contract: "CriterionScore".to_string(),
            output: json!({}),
            attempts: 1,
        }
    }

    #[test]
    fn test_results_written_once() {
        let mut run = Run::new(Goal::new("g"));
        run.record_success(result("a")).unwrap();
        assert_eq!(
            run.record_success(result("a")),
            Err(RunError::AlreadyRecorded { node: NodeId::new("a") })
        );
        let err = run
            .record_failure(NodeId::new("a"), NodeFailure::failed(FailureReason::Cancelled))
            .unwrap_err();
        assert!(matches!(err, RunError::AlreadyRecorded { .. }));
    }

    #[test]
    fn test_terminal_states() {
        let mut run = Run::new(Goal::new("g"));
        run.record_success(result("a")).unwrap();
        run.record_failure(
            NodeId::new("b"),
            NodeFailure::blocked(FailureReason::AncestorFailed {
                ancestor: NodeId::new("x"),
            }),
        )
        .unwrap();
        let states = run.terminal_states();
        assert_eq!(states[&NodeId::new("a")], NodeState::Succeeded);
        assert_eq!(states[&NodeId::new("b")], NodeState::Blocked);
        assert!(!run.was_cancelled());
    }

    #[test]
    fn test_failure_serializes_flat() {
        let failure = NodeFailure::blocked(FailureReason::AncestorFailed {
            ancestor: NodeId::new("score_debt"),
        });
        let value = serde_json::to_value(&failure).unwrap();
        assert_eq!(
            value,
            json!({ "state": "blocked", "reason": "ancestor_failed", "ancestor": "score_debt" })
        );
    }

    #[test]
    fn test_state_terminality() {
        assert!(NodeState::Blocked.is_terminal());
        assert!(!NodeState::Running.is_terminal());
        assert_eq!(NodeState::Ready.to_string(), "ready");
    }
}
