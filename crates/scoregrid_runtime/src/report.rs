//! Final run report.

use crate::run::{FailureReason, NodeState, Run};
use scoregrid_contract::{COMPOSITE_REPORT, CRITERION_SCORE, CompositeReport, CriterionScore};
use scoregrid_core::{Goal, NodeId};
use scoregrid_plan::ApprovedDag;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Column names of the flat grid
pub const GRID_HEADER: [&str; 5] = ["Company", "Criterion", "Score", "Confidence", "Rationale"];

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every node succeeded
    Completed,
    /// At least one node failed or was blocked
    PartialFailure,
    /// The run was cancelled
    Cancelled,
}

/// Final outcome of one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NodeOutcome {
    /// Validated output
    Succeeded {
        /// Contract the output satisfied
        contract: String,
        /// The output
        output: Value,
        /// Attempts used
        attempts: u32,
    },
    /// Ran and failed
    Failed {
        /// Cause
        reason: FailureReason,
    },
    /// Never ran
    Blocked {
        /// Cause
        reason: FailureReason,
    },
}

impl NodeOutcome {
    /// Output, if the node succeeded
    #[must_use]
    pub fn output(&self) -> Option<&Value> {
        match self {
            Self::Succeeded { output, .. } => Some(output),
            Self::Failed { .. } | Self::Blocked { .. } => None,
        }
    }
}

/// Everything a run produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Goal the run served
    pub goal: Goal,
    /// Overall status
    pub status: RunStatus,
    /// Criterion scores by criterion name
    pub criteria: BTreeMap<String, CriterionScore>,
    /// Outcomes of the terminal nodes
    pub branches: BTreeMap<NodeId, NodeOutcome>,
    /// Outcomes of all nodes
    pub nodes: BTreeMap<NodeId, NodeOutcome>,
}

impl Report {
    /// Assemble the report of a finished run
    ///
    /// When two nodes score the same criterion, the lower node id wins.
    #[must_use]
    pub fn from_run(dag: &ApprovedDag, run: &Run) -> Self {
        let mut nodes = BTreeMap::new();
        let mut criteria = BTreeMap::new();

        for id in dag.node_ids() {
            let outcome = if let Some(result) = run.result(id) {
                if result.contract == CRITERION_SCORE {
                    if let Ok(score) = CriterionScore::from_value(&result.output) {
                        criteria.entry(score.criterion.clone()).or_insert(score);
                    }
                }
                NodeOutcome::Succeeded {
                    contract: result.contract.clone(),
                    output: result.output.clone(),
                    attempts: result.attempts,
                }
            } else if let Some(failure) = run.failure(id) {
                let reason = failure.reason.clone();
                match failure.state {
                    NodeState::Failed => NodeOutcome::Failed { reason },
                    _ => NodeOutcome::Blocked { reason },
                }
            } else {
                NodeOutcome::Blocked {
                    reason: FailureReason::Cancelled,
                }
            };
            nodes.insert(id.clone(), outcome);
        }

        let branches = dag
            .terminals()
            .iter()
            .filter_map(|id| nodes.get(id).map(|o| (id.clone(), o.clone())))
            .collect();

        let status = if run.was_cancelled() {
            RunStatus::Cancelled
        } else if nodes
            .values()
            .all(|o| matches!(o, NodeOutcome::Succeeded { .. }))
        {
            RunStatus::Completed
        } else {
            RunStatus::PartialFailure
        };

        Self {
            goal: run.goal().clone(),
            status,
            criteria,
            branches,
            nodes,
        }
    }

    /// Composite from the first succeeded composer branch
    #[must_use]
    pub fn composite(&self) -> Option<CompositeReport> {
        self.branches.values().find_map(|outcome| match outcome {
            NodeOutcome::Succeeded {
                contract, output, ..
            } if contract == COMPOSITE_REPORT => CompositeReport::from_value(output).ok(),
            _ => None,
        })
    }

    /// Flat grid rows for a subject, in criterion order
    #[must_use]
    pub fn grid_rows(&self, subject: &str) -> Vec<GridRow> {
        self.criteria
            .values()
            .map(|score| GridRow {
                subject: subject.to_string(),
                criterion: score.criterion.clone(),
                score: score.score,
                confidence: score.confidence,
                rationale: score.rationale.clone(),
            })
            .collect()
    }
}

/// One row of the flat grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridRow {
    /// Company or other subject
    pub subject: String,
    /// Criterion name
    pub criterion: String,
    /// Score in `[1, 5]`
    pub score: i64,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
    /// Rationale text
    pub rationale: String,
}

impl GridRow {
    /// Cells in [`GRID_HEADER`] order
    #[must_use]
    pub fn fields(&self) -> [String; 5] {
        [
            self.subject.clone(),
            self.criterion.clone(),
            self.score.to_string(),
            format!("{:.2}", self.confidence),
            self.rationale.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::{NodeFailure, NodeResult};
    use scoregrid_plan::{Dag, DagValidator, InputBinding, Node};

    fn dag() -> ApprovedDag {
        let dag = Dag::new()
            .with_node(Node::new("a", "s", CRITERION_SCORE))
            .with_node(Node::new("b", "s", CRITERION_SCORE))
            .with_node(
                Node::new("c", "composer", COMPOSITE_REPORT)
                    .with_input(InputBinding::Node(NodeId::new("a")))
                    .with_input(InputBinding::Node(NodeId::new("b"))),
            );
        DagValidator::default().approve(dag).unwrap()
    }

    fn scored(id: &str, criterion: &str, score: i64) -> NodeResult {
        NodeResult {
            node_id: NodeId::new(id),
            role: "s".to_string(),
            contract: CRITERION_SCORE.to_string(),
            output: CriterionScore::new(criterion, score, 0.5, "r").to_json(),
            attempts: 1,
        }
    }

    #[test]
    fn test_lowest_node_id_wins_criterion() {
        let mut run = Run::new(Goal::new("g"));
        run.record_success(scored("b", "Debt Loading", 2)).unwrap();
        run.record_success(scored("a", "Debt Loading", 4)).unwrap();
        run.record_failure(
            NodeId::new("c"),
            NodeFailure::failed(FailureReason::RetriesExhausted {
                attempts: 3,
                last_error: "boom".to_string(),
                defects: vec![],
            }),
        )
        .unwrap();

        let report = Report::from_run(&dag(), &run);
        assert_eq!(report.criteria.len(), 1);
        assert_eq!(report.criteria["Debt Loading"].score, 4);
        assert_eq!(report.status, RunStatus::PartialFailure);
        assert!(report.composite().is_none());
        assert_eq!(report.branches.len(), 1);
    }

    #[test]
    fn test_grid_rows() {
        let mut run = Run::new(Goal::new("g"));
        run.record_success(scored("a", "Index Exclusion", 5)).unwrap();
        run.record_success(scored("b", "Debt Loading", 4)).unwrap();
        let report = Report::from_run(&dag(), &run);

        let rows = report.grid_rows("Example SpinCo");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].criterion, "Debt Loading");
        assert_eq!(
            rows[1].fields(),
            [
                "Example SpinCo".to_string(),
                "Index Exclusion".to_string(),
                "5".to_string(),
                "0.50".to_string(),
                "r".to_string(),
            ]
        );
        assert_eq!(GRID_HEADER.len(), rows[0].fields().len());
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = NodeOutcome::Blocked {
            reason: FailureReason::AncestorFailed {
                ancestor: NodeId::new("a"),
            },
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["outcome"], "blocked");
        assert_eq!(value["reason"]["ancestor"], "a");
    }
}
