//! Deterministic scheduler for plan execution.
//!
//! - Ready nodes are kept in a `BTreeSet`, so the next pick is always
//!   the smallest ready id
//! - Logical time ticks on every state change
//! - A failure blocks every transitive descendant at once

use crate::run::{NodeState, Transition};
use scoregrid_core::{LogicalTime, NodeId};
use scoregrid_plan::ApprovedDag;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Scheduling decision - which node to run next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleDecision {
    /// Run this node next
    Run(NodeId),
    /// Running nodes must finish first
    Wait,
    /// Every node is terminal
    Complete,
}

/// Scheduler error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    /// Node not in the plan
    #[error("Node not found: {node}")]
    NodeNotFound {
        /// Node id
        node: NodeId,
    },

    /// Transition not allowed from the node's current state
    #[error("Node {node} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Node id
        node: NodeId,
        /// Current state
        from: NodeState,
        /// Requested state
        to: NodeState,
    },
}

/// Tracks node states for one run
#[derive(Debug, Clone)]
pub struct Scheduler {
    states: BTreeMap<NodeId, NodeState>,
    dependencies: BTreeMap<NodeId, BTreeSet<NodeId>>,
    dependents: BTreeMap<NodeId, BTreeSet<NodeId>>,
    ready: BTreeSet<NodeId>,
    time: LogicalTime,
    trace: Vec<Transition>,
}

impl Scheduler {
    /// Scheduler for an approved plan, with root nodes already ready
    #[must_use]
    pub fn from_dag(dag: &ApprovedDag) -> Self {
        let mut dependencies = BTreeMap::new();
        let mut dependents = BTreeMap::new();
        for id in dag.node_ids() {
            dependencies.insert(id.clone(), dag.dependencies(id).cloned().unwrap_or_default());
            dependents.insert(id.clone(), dag.dependents(id).cloned().unwrap_or_default());
        }
        let states = dag
            .node_ids()
            .map(|id| (id.clone(), NodeState::Pending))
            .collect();

        let mut scheduler = Self {
            states,
            dependencies,
            dependents,
            ready: BTreeSet::new(),
            time: LogicalTime::zero(),
            trace: Vec::new(),
        };

        let roots: Vec<NodeId> = scheduler
            .dependencies
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        for id in roots {
            scheduler.set(&id, NodeState::Ready);
            scheduler.ready.insert(id);
        }
        scheduler
    }

    /// Next scheduling decision, without changing state
    #[must_use]
    pub fn decide(&self) -> ScheduleDecision {
        if let Some(id) = self.ready.first() {
            ScheduleDecision::Run(id.clone())
        } else if self.is_complete() {
            ScheduleDecision::Complete
        } else {
            ScheduleDecision::Wait
        }
    }

    /// Move a ready node to running
    ///
    /// # Errors
    ///
    /// Returns error if the node is not ready
    pub fn mark_running(&mut self, id: &NodeId) -> Result<(), ScheduleError> {
        self.expect(id, NodeState::Ready, NodeState::Running)?;
        self.ready.remove(id);
        self.set(id, NodeState::Running);
        Ok(())
    }

    /// Move a running node to succeeded
    ///
    /// Returns the dependents that became ready, in ascending order.
    ///
    /// # Errors
    ///
    /// Returns error if the node is not running
    pub fn mark_succeeded(&mut self, id: &NodeId) -> Result<Vec<NodeId>, ScheduleError> {
        self.expect(id, NodeState::Running, NodeState::Succeeded)?;
        self.set(id, NodeState::Succeeded);

        let mut newly_ready = Vec::new();
        let candidates: Vec<NodeId> = self
            .dependents
            .get(id)
            .map(|d| d.iter().cloned().collect())
            .unwrap_or_default();
        for dep in candidates {
            if self.state(&dep) == Some(NodeState::Pending) && self.upstream_succeeded(&dep) {
                self.set(&dep, NodeState::Ready);
                self.ready.insert(dep.clone());
                newly_ready.push(dep);
            }
        }
        Ok(newly_ready)
    }

    /// Move a running node to failed and block its descendants
    ///
    /// Returns each newly blocked node, in breadth-first order from the
    /// failed node.
    ///
    /// # Errors
    ///
    /// Returns error if the node is not running
    pub fn mark_failed(&mut self, id: &NodeId) -> Result<Vec<NodeId>, ScheduleError> {
        self.expect(id, NodeState::Running, NodeState::Failed)?;
        self.set(id, NodeState::Failed);

        let mut blocked = Vec::new();
        let mut queue: VecDeque<NodeId> = VecDeque::from([id.clone()]);
        while let Some(current) = queue.pop_front() {
            let next: Vec<NodeId> = self
                .dependents
                .get(&current)
                .map(|d| d.iter().cloned().collect())
                .unwrap_or_default();
            for dep in next {
                if matches!(self.state(&dep), Some(NodeState::Pending | NodeState::Ready)) {
                    self.ready.remove(&dep);
                    self.set(&dep, NodeState::Blocked);
                    blocked.push(dep.clone());
                    queue.push_back(dep);
                }
            }
        }
        Ok(blocked)
    }

    /// Fail a running node because the run was cancelled
    ///
    /// # Errors
    ///
    /// Returns error if the node is not running
    pub fn mark_cancelled(&mut self, id: &NodeId) -> Result<(), ScheduleError> {
        self.expect(id, NodeState::Running, NodeState::Failed)?;
        self.set(id, NodeState::Failed);
        Ok(())
    }

    /// Block every node that has not started
    ///
    /// Returns the blocked nodes in ascending order.
    pub fn block_unstarted(&mut self) -> Vec<NodeId> {
        let unstarted: Vec<NodeId> = self
            .states
            .iter()
            .filter(|(_, s)| matches!(s, NodeState::Pending | NodeState::Ready))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &unstarted {
            self.set(id, NodeState::Blocked);
        }
        self.ready.clear();
        unstarted
    }

    /// Nodes currently running, ascending
    #[must_use]
    pub fn running(&self) -> Vec<NodeId> {
        self.states
            .iter()
            .filter(|(_, s)| **s == NodeState::Running)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Current state of a node
    #[must_use]
    pub fn state(&self, id: &NodeId) -> Option<NodeState> {
        self.states.get(id).copied()
    }

    /// Check if every node is terminal
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.states.values().all(|s| s.is_terminal())
    }

    /// Number of ready nodes
    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.ready.len()
    }

    /// Current logical time
    #[must_use]
    pub const fn time(&self) -> LogicalTime {
        self.time
    }

    /// Recorded transitions
    #[must_use]
    pub fn trace(&self) -> &[Transition] {
        &self.trace
    }

    /// Take the recorded transitions
    pub fn take_trace(&mut self) -> Vec<Transition> {
        std::mem::take(&mut self.trace)
    }

    fn upstream_succeeded(&self, id: &NodeId) -> bool {
        self.dependencies
            .get(id)
            .is_none_or(|deps| deps.iter().all(|d| self.state(d) == Some(NodeState::Succeeded)))
    }

    fn expect(&self, id: &NodeId, from: NodeState, to: NodeState) -> Result<(), ScheduleError> {
        match self.state(id) {
            None => Err(ScheduleError::NodeNotFound { node: id.clone() }),
            Some(current) if current == from => Ok(()),
            Some(current) => Err(ScheduleError::InvalidTransition {
                node: id.clone(),
                from: current,
                to,
            }),
        }
    }

    fn set(&mut self, id: &NodeId, state: NodeState) {
        if let Some(slot) = self.states.get_mut(id) {
            *slot = state;
            self.time.increment();
            self.trace.push(Transition {
                at: self.time,
                node: id.clone(),
                state,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scoregrid_contract::CRITERION_SCORE;
    use scoregrid_plan::{Dag, DagValidator, Edge, Node};

    fn id(s: &str) -> NodeId {
        NodeId::new(s)
    }

    /// a -> c, b -> c, c -> d, e alone
    fn diamond() -> ApprovedDag {
        let dag = ["a", "b", "c", "d", "e"]
            .into_iter()
            .fold(Dag::new(), |dag, n| dag.with_node(Node::new(n, "r", CRITERION_SCORE)))
            .with_edge(Edge::new("a", "c"))
            .with_edge(Edge::new("b", "c"))
            .with_edge(Edge::new("c", "d"));
        DagValidator::default().approve(dag).unwrap()
    }

    #[test]
    fn test_roots_ready_in_id_order() {
        let scheduler = Scheduler::from_dag(&diamond());
        assert_eq!(scheduler.ready_count(), 3);
        assert_eq!(scheduler.decide(), ScheduleDecision::Run(id("a")));
        assert_eq!(scheduler.state(&id("c")), Some(NodeState::Pending));
    }

    #[test]
    fn test_join_waits_for_all_upstream() {
        let mut scheduler = Scheduler::from_dag(&diamond());
        scheduler.mark_running(&id("a")).unwrap();
        assert!(scheduler.mark_succeeded(&id("a")).unwrap().is_empty());
        scheduler.mark_running(&id("b")).unwrap();
        assert_eq!(scheduler.mark_succeeded(&id("b")).unwrap(), vec![id("c")]);
    }

    #[test]
    fn test_failure_blocks_descendants_only() {
        let mut scheduler = Scheduler::from_dag(&diamond());
        scheduler.mark_running(&id("a")).unwrap();
        let blocked = scheduler.mark_failed(&id("a")).unwrap();
        assert_eq!(blocked, vec![id("c"), id("d")]);
        assert_eq!(scheduler.state(&id("b")), Some(NodeState::Ready));
        assert_eq!(scheduler.state(&id("e")), Some(NodeState::Ready));
        assert_eq!(scheduler.decide(), ScheduleDecision::Run(id("b")));
    }

    #[test]
    fn test_wait_and_complete() {
        let mut scheduler = Scheduler::from_dag(&diamond());
        for n in ["a", "b", "e"] {
            scheduler.mark_running(&id(n)).unwrap();
        }
        assert_eq!(scheduler.decide(), ScheduleDecision::Wait);
        for n in ["a", "b", "e"] {
            scheduler.mark_succeeded(&id(n)).unwrap();
        }
        scheduler.mark_running(&id("c")).unwrap();
        scheduler.mark_succeeded(&id("c")).unwrap();
        scheduler.mark_running(&id("d")).unwrap();
        scheduler.mark_succeeded(&id("d")).unwrap();
        assert_eq!(scheduler.decide(), ScheduleDecision::Complete);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut scheduler = Scheduler::from_dag(&diamond());
        assert!(matches!(
            scheduler.mark_running(&id("c")),
            Err(ScheduleError::InvalidTransition { from: NodeState::Pending, .. })
        ));
        assert!(matches!(
            scheduler.mark_succeeded(&id("a")),
            Err(ScheduleError::InvalidTransition { .. })
        ));
        assert!(matches!(
            scheduler.mark_running(&id("zz")),
            Err(ScheduleError::NodeNotFound { .. })
        ));
    }

    #[test]
    fn test_block_unstarted() {
        let mut scheduler = Scheduler::from_dag(&diamond());
        scheduler.mark_running(&id("a")).unwrap();
        let blocked = scheduler.block_unstarted();
        assert_eq!(blocked, vec![id("b"), id("c"), id("d"), id("e")]);
        assert_eq!(scheduler.running(), vec![id("a")]);
        scheduler.mark_cancelled(&id("a")).unwrap();
        assert!(scheduler.is_complete());
    }

    #[test]
    fn test_time_ticks_per_transition() {
        let mut scheduler = Scheduler::from_dag(&diamond());
        // three roots made ready
        assert_eq!(scheduler.time().as_u64(), 3);
        scheduler.mark_running(&id("a")).unwrap();
        assert_eq!(scheduler.time().as_u64(), 4);
        let trace = scheduler.take_trace();
        assert_eq!(trace.len(), 4);
        assert_eq!(trace[3].state, NodeState::Running);
        assert!(scheduler.trace().is_empty());
    }
}
