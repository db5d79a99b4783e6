//! Plan errors. Any of these is fatal to a run before a node executes.

use scoregrid_core::NodeId;

/// Error from planning or plan validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// Planner output is not a well-formed plan document
    #[error("Malformed plan: {reason}")]
    MalformedPlan {
        /// What was wrong
        reason: String,
    },

    /// Two nodes share an id
    #[error("Duplicate node id: {id}")]
    DuplicateNode {
        /// Repeated id
        id: NodeId,
    },

    /// Edge or input reference names a node that does not exist
    #[error("Dangling edge {from} -> {to}")]
    DanglingEdge {
        /// Edge source
        from: NodeId,
        /// Edge target
        to: NodeId,
    },

    /// Dependencies form a cycle
    #[error("Cyclic plan: {}", format_cycle(.cycle))]
    CyclicPlan {
        /// Nodes on the cycle, first node repeated last
        cycle: Vec<NodeId>,
    },

    /// Output contract is neither declared nor registered
    #[error("Node {node} declares unknown contract {contract}")]
    UnknownContract {
        /// Declaring node
        node: NodeId,
        /// Contract name
        contract: String,
    },

    /// No node is free of dependents
    #[error("Plan has no terminal node")]
    NoTerminalNode,

    /// Planner worker could not be reached
    #[error("Planner unavailable: {reason}")]
    PlannerUnavailable {
        /// Last invocation error
        reason: String,
    },
}

impl PlanError {
    /// Stable short name of the error kind
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MalformedPlan { .. } => "malformed_plan",
            Self::DuplicateNode { .. } => "duplicate_node",
            Self::DanglingEdge { .. } => "dangling_edge",
            Self::CyclicPlan { .. } => "cyclic_plan",
            Self::UnknownContract { .. } => "unknown_contract",
            Self::NoTerminalNode => "no_terminal_node",
            Self::PlannerUnavailable { .. } => "planner_unavailable",
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedPlan {
            reason: reason.into(),
        }
    }
}

fn format_cycle(cycle: &[NodeId]) -> String {
    let mut parts: Vec<&str> = cycle.iter().map(NodeId::as_str).collect();
    if let Some(first) = cycle.first() {
        parts.push(first.as_str());
    }
    parts.join(" -> ")
}
