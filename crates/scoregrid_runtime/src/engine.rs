//! Execution engine for approved plans.
//!
//! Combines the scheduler and executor to run a plan to completion.
//! Sequential mode keeps one node in flight; parallel mode keeps up to
//! `max_concurrency` in a `FuturesUnordered` set and reacts to whichever
//! finishes first.

use crate::config::EngineConfig;
use crate::executor::{Executor, ExecutorResult, NodeTask};
use crate::report::Report;
use crate::run::{FailureReason, NodeFailure, NodeState, Run};
use crate::scheduler::{ScheduleDecision, Scheduler};
use futures::stream::{FuturesUnordered, StreamExt};
use scoregrid_core::{FeatureBank, Goal, NodeId};
use scoregrid_plan::{ApprovedDag, InputBinding};
use scoregrid_worker::{Invoker, WorkerRegistry};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Execution engine error
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// A node names a role with no registered worker
    #[error("Node {node} uses unregistered role {role}")]
    UnknownRole {
        /// Node naming it
        node: NodeId,
        /// Missing role
        role: String,
    },

    /// A feature binding has no matching feature set
    #[error("Node {node} binds missing feature set {domain}")]
    UnresolvedBinding {
        /// Node naming it
        node: NodeId,
        /// Missing domain
        domain: String,
    },

    /// Internal invariant broken; the run was cancelled
    #[error("Invariant violated: {reason}")]
    Invariant {
        /// What broke
        reason: String,
        /// Report of the partial run
        report: Box<Report>,
    },

    /// Run cancelled from outside
    #[error("Run cancelled")]
    Cancelled {
        /// Report of the partial run
        report: Box<Report>,
    },
}

impl ExecutionError {
    /// Partial report, for errors raised after execution started
    #[must_use]
    pub fn report(&self) -> Option<&Report> {
        match self {
            Self::Invariant { report, .. } | Self::Cancelled { report } => Some(report),
            Self::UnknownRole { .. } | Self::UnresolvedBinding { .. } => None,
        }
    }
}

enum Abort {
    Cancelled,
    Invariant(String),
}

/// Runs approved plans against registered workers
#[derive(Debug, Clone)]
pub struct Engine {
    registry: Arc<WorkerRegistry>,
    config: EngineConfig,
}

impl Engine {
    /// Create an engine
    #[must_use]
    pub fn new(registry: Arc<WorkerRegistry>, config: EngineConfig) -> Self {
        Self { registry, config }
    }

    /// Engine configuration
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute a plan and assemble its report
    ///
    /// # Errors
    ///
    /// Returns error on a failed preflight or an invariant violation
    pub async fn execute(
        &self,
        dag: &ApprovedDag,
        goal: &Goal,
        features: &FeatureBank,
    ) -> Result<Report, ExecutionError> {
        self.execute_with_cancel(dag, goal, features, CancellationToken::new())
            .await
    }

    /// Execute a plan that can be cancelled from outside
    ///
    /// # Errors
    ///
    /// Returns error on a failed preflight, an invariant violation, or
    /// cancellation
    pub async fn execute_with_cancel(
        &self,
        dag: &ApprovedDag,
        goal: &Goal,
        features: &FeatureBank,
        cancel: CancellationToken,
    ) -> Result<Report, ExecutionError> {
        let run = self.run(dag, goal, features, cancel).await?;
        Ok(Report::from_run(dag, &run))
    }

    /// Execute a plan and return the full run, trace included
    ///
    /// # Errors
    ///
    /// Same as [`execute_with_cancel`](Self::execute_with_cancel)
    pub async fn run(
        &self,
        dag: &ApprovedDag,
        goal: &Goal,
        features: &FeatureBank,
        cancel: CancellationToken,
    ) -> Result<Run, ExecutionError> {
        self.preflight(dag, features)?;
        let run = Run::new(goal.clone());
        let span = info_span!("run", run_id = %run.id());
        self.drive(dag, features, run, cancel).instrument(span).await
    }

    fn preflight(&self, dag: &ApprovedDag, features: &FeatureBank) -> Result<(), ExecutionError> {
        for id in dag.node_ids() {
            let Some(node) = dag.node(id) else { continue };
            if !self.registry.contains(&node.role) {
                return Err(ExecutionError::UnknownRole {
                    node: id.clone(),
                    role: node.role.clone(),
                });
            }
            for input in &node.inputs {
                if let InputBinding::Feature(domain) = input {
                    if !features.contains(domain) {
                        return Err(ExecutionError::UnresolvedBinding {
                            node: id.clone(),
                            domain: domain.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    async fn drive(
        &self,
        dag: &ApprovedDag,
        features: &FeatureBank,
        mut run: Run,
        cancel: CancellationToken,
    ) -> Result<Run, ExecutionError> {
        let executor = Executor::new(
            Invoker::new(Arc::clone(&self.registry), self.config.node_timeout()),
            self.config.retry,
        );
        let limit = self.config.concurrency_limit();
        let mut scheduler = Scheduler::from_dag(dag);
        let mut in_flight = FuturesUnordered::new();
        let mut abort = None;

        info!(
            nodes = dag.len(),
            dispatch = ?self.config.dispatch,
            goal = %run.goal(),
            "run started"
        );

        loop {
            if cancel.is_cancelled() {
                abort = Some(Abort::Cancelled);
            }

            while abort.is_none() && in_flight.len() < limit {
                let ScheduleDecision::Run(id) = scheduler.decide() else {
                    break;
                };
                let task = match prepare(dag, features, &run, &id) {
                    Ok(task) => task,
                    Err(reason) => {
                        abort = Some(Abort::Invariant(reason));
                        break;
                    }
                };
                if let Err(e) = scheduler.mark_running(&id) {
                    abort = Some(Abort::Invariant(e.to_string()));
                    break;
                }
                debug!(node_id = %id, role = %task.role, "node running");
                in_flight.push(executor.execute(task));
            }

            if abort.is_some() || in_flight.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    abort = Some(Abort::Cancelled);
                }
                Some(result) = in_flight.next() => {
                    if let Err(reason) = record(&mut scheduler, &mut run, result) {
                        abort = Some(Abort::Invariant(reason));
                    }
                }
            }
        }

        if let Some(abort) = abort {
            let drained = tokio::time::timeout(self.config.drain_timeout(), async {
                while in_flight.next().await.is_some() {}
            })
            .await;
            if drained.is_err() {
                warn!(in_flight = in_flight.len(), "drain timed out");
            }
            drop(in_flight);

            attribute_blocked(dag, &scheduler, &mut run);
            cancel_remaining(&mut scheduler, &mut run);
            run.extend_trace(scheduler.take_trace());
            let report = Box::new(Report::from_run(dag, &run));
            return Err(match abort {
                Abort::Cancelled => {
                    warn!("run cancelled");
                    ExecutionError::Cancelled { report }
                }
                Abort::Invariant(reason) => {
                    error!(reason = %reason, "run aborted");
                    ExecutionError::Invariant { reason, report }
                }
            });
        }

        attribute_blocked(dag, &scheduler, &mut run);
        run.extend_trace(scheduler.take_trace());
        info!(
            succeeded = run.results().len(),
            failed = run.failures().len(),
            "run finished"
        );
        Ok(run)
    }
}

fn prepare(
    dag: &ApprovedDag,
    features: &FeatureBank,
    run: &Run,
    id: &NodeId,
) -> Result<NodeTask, String> {
    let node = dag
        .node(id)
        .ok_or_else(|| format!("node {id} missing from plan"))?;
    let contract = dag
        .contract_for(id)
        .cloned()
        .ok_or_else(|| format!("contract {} of node {id} not resolved", node.output))?;

    let inputs = node
        .inputs
        .iter()
        .map(|binding| match binding {
            InputBinding::Feature(domain) => features
                .get(domain)
                .map(scoregrid_core::FeatureSet::to_json)
                .ok_or_else(|| format!("feature set {domain} for node {id} not found")),
            InputBinding::Node(upstream) => run
                .result(upstream)
                .map(|r| r.output.clone())
                .ok_or_else(|| format!("input {upstream} of node {id} has no result")),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(NodeTask {
        node_id: id.clone(),
        role: node.role.clone(),
        contract,
        inputs,
    })
}

fn record(scheduler: &mut Scheduler, run: &mut Run, result: ExecutorResult) -> Result<(), String> {
    debug!(node_id = %result.node_id(), "node finished");
    match result {
        ExecutorResult::Succeeded(result) => {
            let id = result.node_id.clone();
            info!(node_id = %id, attempts = result.attempts, "node succeeded");
            run.record_success(result).map_err(|e| e.to_string())?;
            for ready in scheduler.mark_succeeded(&id).map_err(|e| e.to_string())? {
                debug!(node_id = %ready, "node ready");
            }
        }
        ExecutorResult::Failed {
            node_id,
            attempts,
            last,
        } => {
            error!(node_id = %node_id, attempts, error = %last, "node failed");
            let reason = FailureReason::RetriesExhausted {
                attempts,
                last_error: last.to_string(),
                defects: last.defects(),
            };
            run.record_failure(node_id.clone(), NodeFailure::failed(reason))
                .map_err(|e| e.to_string())?;
            // markers are written once dispatch stops, see `attribute_blocked`
            for blocked in scheduler.mark_failed(&node_id).map_err(|e| e.to_string())? {
                warn!(node_id = %blocked, failed = %node_id, "node blocked");
            }
        }
    }
    Ok(())
}

/// Record a marker for every blocked node, naming its smallest-id failed
/// ancestor so the marker does not depend on completion order.
fn attribute_blocked(dag: &ApprovedDag, scheduler: &Scheduler, run: &mut Run) {
    let unmarked: Vec<NodeId> = dag
        .node_ids()
        .filter(|id| scheduler.state(id) == Some(NodeState::Blocked) && !is_recorded(run, id))
        .cloned()
        .collect();
    for id in unmarked {
        let Some(ancestor) = first_failed_ancestor(dag, run, &id) else {
            warn!(node_id = %id, "blocked node has no failed ancestor");
            continue;
        };
        let failure = NodeFailure::blocked(FailureReason::AncestorFailed { ancestor });
        if let Err(e) = run.record_failure(id, failure) {
            warn!(error = %e, "blocked marker not recorded");
        }
    }
}

fn first_failed_ancestor(dag: &ApprovedDag, run: &Run, id: &NodeId) -> Option<NodeId> {
    let mut ancestors = BTreeSet::new();
    let mut stack: Vec<&NodeId> = dag.dependencies(id).into_iter().flatten().collect();
    while let Some(current) = stack.pop() {
        if ancestors.insert(current) {
            stack.extend(dag.dependencies(current).into_iter().flatten());
        }
    }
    ancestors
        .into_iter()
        .find(|a| run.failure(a).is_some_and(|f| f.state == NodeState::Failed))
        .cloned()
}

fn is_recorded(run: &Run, id: &NodeId) -> bool {
    run.failure(id).is_some() || run.result(id).is_some()
}

fn cancel_remaining(scheduler: &mut Scheduler, run: &mut Run) {
    for id in scheduler.running() {
        if scheduler.mark_cancelled(&id).is_err() || is_recorded(run, &id) {
            continue;
        }
        if let Err(e) = run.record_failure(id, NodeFailure::failed(FailureReason::Cancelled)) {
            warn!(error = %e, "cancellation marker not recorded");
        }
    }
    for id in scheduler.block_unstarted() {
        if is_recorded(run, &id) {
            continue;
        }
        if let Err(e) = run.record_failure(id, NodeFailure::blocked(FailureReason::Cancelled)) {
            warn!(error = %e, "cancellation marker not recorded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::ComposerWorker;
    use crate::report::{NodeOutcome, RunStatus};
    use async_trait::async_trait;
    use scoregrid_contract::{COMPOSITE_REPORT, CRITERION_SCORE, CriterionScore};
    use scoregrid_core::FeatureSet;
    use scoregrid_plan::{Dag, DagValidator, Edge, Node};
    use scoregrid_worker::builtin::RuleScorer;
    use scoregrid_worker::{InvocationError, RetryPolicy, Worker};
    use serde_json::{Value, json};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Always answers with a fixed score
    struct Fixed {
        role: &'static str,
        criterion: &'static str,
        score: i64,
    }

    #[async_trait]
    impl Worker for Fixed {
        fn role(&self) -> &str {
            self.role
        }

        async fn invoke(&self, _input: Value) -> Result<Value, InvocationError> {
            Ok(CriterionScore::new(self.criterion, self.score, 0.9, "fixed").to_json())
        }
    }

    /// Never answers
    struct Hang;

    #[async_trait]
    impl Worker for Hang {
        fn role(&self) -> &str {
            "hang"
        }

        async fn invoke(&self, _input: Value) -> Result<Value, InvocationError> {
            std::future::pending::<()>().await;
            Ok(Value::Null)
        }
    }

    /// Fails every call after a delay
    struct Failing {
        role: &'static str,
        delay: Duration,
    }

    #[async_trait]
    impl Worker for Failing {
        fn role(&self) -> &str {
            self.role
        }

        async fn invoke(&self, _input: Value) -> Result<Value, InvocationError> {
            tokio::time::sleep(self.delay).await;
            Err(InvocationError::Transport {
                role: self.role.to_string(),
                message: "connection reset".to_string(),
            })
        }
    }

    /// Tracks the peak number of concurrent calls
    #[derive(Default)]
    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Worker for Gauge {
        fn role(&self) -> &str {
            "gauge"
        }

        async fn invoke(&self, _input: Value) -> Result<Value, InvocationError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(CriterionScore::new("Ops Quality", 3, 0.5, "gauge").to_json())
        }
    }

    fn bank() -> FeatureBank {
        FeatureBank::from_sets([
            FeatureSet::new(
                "capital_structure",
                [("net_leverage_turns", json!(3.2)), ("fcf_to_net_debt_pct", json!(22))],
            )
            .unwrap(),
            FeatureSet::new(
                "ownership",
                [("mgmt_ownership_pct", json!(2.1)), ("perf_equity_present", json!(1))],
            )
            .unwrap(),
            FeatureSet::new(
                "microstructure",
                [("russell_eligible", json!(0)), ("avg_daily_dollar_volume", json!(12_000_000))],
            )
            .unwrap(),
        ])
        .unwrap()
    }

    fn registry(extra: Vec<Arc<dyn Worker>>) -> Arc<WorkerRegistry> {
        let mut registry = WorkerRegistry::new();
        for scorer in RuleScorer::spinoff_scorers() {
            registry.register(Arc::new(scorer)).unwrap();
        }
        registry.register(Arc::new(ComposerWorker::default())).unwrap();
        for worker in extra {
            registry.register(worker).unwrap();
        }
        Arc::new(registry)
    }

    fn spinoff_dag() -> ApprovedDag {
        let plan = scoregrid_worker::builtin::spinoff_grid_plan();
        let dag = scoregrid_plan::parse_plan(plan).unwrap();
        DagValidator::default().approve(dag).unwrap()
    }

    fn fast(config: EngineConfig) -> EngineConfig {
        config.with_retry(RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
        })
    }

    #[tokio::test]
    async fn test_spinoff_grid_completes() {
        let engine = Engine::new(registry(vec![]), EngineConfig::sequential());
        let report = engine
            .execute(&spinoff_dag(), &Goal::new("score SpinCo"), &bank())
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.criteria.len(), 3);
        assert_eq!(report.criteria["Debt Loading"].score, 4);
        assert_eq!(report.criteria["Index Exclusion"].score, 5);
        assert_eq!(report.criteria["Equity Incentives"].score, 4);
        assert_eq!(report.branches.len(), 1);

        let composite = report.composite().unwrap();
        assert_eq!(composite.criteria.len(), 3);
        assert!(composite.composite_score > 4.0 && composite.composite_score < 5.0);
    }

    #[tokio::test]
    async fn test_sequential_order_and_dependencies() {
        let engine = Engine::new(registry(vec![]), EngineConfig::sequential());
        let run = engine
            .run(&spinoff_dag(), &Goal::new("g"), &bank(), CancellationToken::new())
            .await
            .unwrap();

        let running: Vec<&str> = run
            .trace()
            .iter()
            .filter(|t| t.state == NodeState::Running)
            .map(|t| t.node.as_str())
            .collect();
        assert_eq!(running, vec!["score_debt", "score_equity", "score_index", "compose"]);
        assert_dependencies_respected(&spinoff_dag(), &run);
    }

    fn assert_dependencies_respected(dag: &ApprovedDag, run: &Run) {
        let mut succeeded_at = BTreeMap::new();
        let mut running_at = BTreeMap::new();
        for t in run.trace() {
            match t.state {
                NodeState::Succeeded => {
                    succeeded_at.insert(t.node.clone(), t.at);
                }
                NodeState::Running => {
                    running_at.insert(t.node.clone(), t.at);
                }
                _ => {}
            }
        }
        for (node, started) in &running_at {
            for upstream in dag.dependencies(node).into_iter().flatten() {
                let done = succeeded_at.get(upstream).copied();
                assert!(done.is_some_and(|d| d < *started), "{node} ran before {upstream}");
            }
        }
    }

    #[tokio::test]
    async fn test_parallel_matches_sequential() {
        let sequential = Engine::new(registry(vec![]), EngineConfig::sequential())
            .execute(&spinoff_dag(), &Goal::new("g"), &bank())
            .await
            .unwrap();

        for _ in 0..5 {
            let engine = Engine::new(registry(vec![]), EngineConfig::parallel(4));
            let run = engine
                .run(&spinoff_dag(), &Goal::new("g"), &bank(), CancellationToken::new())
                .await
                .unwrap();
            assert_dependencies_respected(&spinoff_dag(), &run);
            assert_eq!(Report::from_run(&spinoff_dag(), &run), sequential);
        }
    }

    #[tokio::test]
    async fn test_sequential_runs_identical() {
        let engine = Engine::new(registry(vec![]), EngineConfig::sequential());
        let first = engine
            .run(&spinoff_dag(), &Goal::new("g"), &bank(), CancellationToken::new())
            .await
            .unwrap();
        let second = engine
            .run(&spinoff_dag(), &Goal::new("g"), &bank(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(first.trace(), second.trace());
        assert_eq!(first.terminal_states(), second.terminal_states());
        assert_ne!(first.id(), second.id());
    }

    #[tokio::test]
    async fn test_out_of_range_scorer_fails_and_blocks_composer() {
        let bad: Arc<dyn Worker> = Arc::new(Fixed {
            role: "bad_scorer",
            criterion: "Ops Quality",
            score: 7,
        });
        let dag = Dag::new()
            .with_node(Node::new("a_ops", "bad_scorer", CRITERION_SCORE))
            .with_node(
                Node::new("score_equity", "equity_incentives_scorer", CRITERION_SCORE)
                    .with_input(InputBinding::Feature("ownership".to_string())),
            )
            .with_node(
                Node::new("compose", "composer", COMPOSITE_REPORT)
                    .with_input(InputBinding::Node(NodeId::new("a_ops")))
                    .with_input(InputBinding::Node(NodeId::new("score_equity"))),
            );
        let dag = DagValidator::default().approve(dag).unwrap();

        let engine = Engine::new(registry(vec![bad]), fast(EngineConfig::sequential()));
        let report = engine.execute(&dag, &Goal::new("g"), &bank()).await.unwrap();

        assert_eq!(report.status, RunStatus::PartialFailure);
        match &report.nodes[&NodeId::new("a_ops")] {
            NodeOutcome::Failed { reason } => match reason {
                FailureReason::RetriesExhausted { attempts, defects, .. } => {
                    assert_eq!(*attempts, 3);
                    assert!(defects.iter().any(|d| d.field == "score"));
                }
                other => panic!("unexpected reason {other:?}"),
            },
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(
            report.branches[&NodeId::new("compose")],
            NodeOutcome::Blocked {
                reason: FailureReason::AncestorFailed {
                    ancestor: NodeId::new("a_ops")
                }
            }
        );
        // sibling unaffected
        assert!(matches!(
            report.nodes[&NodeId::new("score_equity")],
            NodeOutcome::Succeeded { .. }
        ));
        assert_eq!(report.criteria.len(), 1);
        assert!(report.composite().is_none());
    }

    #[tokio::test]
    async fn test_failure_isolated_to_descendants() {
        let dag = Dag::new()
            .with_node(Node::new("a", "hang", CRITERION_SCORE))
            .with_node(Node::new("b", "fixed", CRITERION_SCORE).with_input(InputBinding::Node(NodeId::new("a"))))
            .with_node(Node::new("c", "fixed", CRITERION_SCORE))
            .with_node(Node::new("d", "fixed", CRITERION_SCORE))
            .with_edge(Edge::new("c", "d"));
        let dag = DagValidator::default().approve(dag).unwrap();
        let fixed: Arc<dyn Worker> = Arc::new(Fixed {
            role: "fixed",
            criterion: "Ops Quality",
            score: 3,
        });
        let config = fast(EngineConfig::parallel(4)).with_node_timeout(Duration::from_millis(20));
        let hang: Arc<dyn Worker> = Arc::new(Hang);
        let engine = Engine::new(registry(vec![hang, fixed]), config);
        let run = engine
            .run(&dag, &Goal::new("g"), &bank(), CancellationToken::new())
            .await
            .unwrap();

        let states = run.terminal_states();
        assert_eq!(states[&NodeId::new("a")], NodeState::Failed);
        assert_eq!(states[&NodeId::new("b")], NodeState::Blocked);
        assert_eq!(states[&NodeId::new("c")], NodeState::Succeeded);
        assert_eq!(states[&NodeId::new("d")], NodeState::Succeeded);
    }

    #[tokio::test]
    async fn test_preflight_unknown_role() {
        let dag = DagValidator::default()
            .approve(Dag::new().with_node(Node::new("a", "ghost", CRITERION_SCORE)))
            .unwrap();
        let engine = Engine::new(registry(vec![]), EngineConfig::sequential());
        let err = engine.execute(&dag, &Goal::new("g"), &bank()).await.unwrap_err();
        assert!(matches!(&err, ExecutionError::UnknownRole { role, .. } if role == "ghost"));
        assert!(err.report().is_none());
    }

    #[tokio::test]
    async fn test_preflight_unresolved_binding() {
        let engine = Engine::new(registry(vec![]), EngineConfig::sequential());
        let err = engine
            .execute(&spinoff_dag(), &Goal::new("g"), &FeatureBank::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::UnresolvedBinding { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_marks_everything() {
        let dag = Dag::new()
            .with_node(Node::new("a", "hang", CRITERION_SCORE))
            .with_node(Node::new("b", "hang", CRITERION_SCORE).with_input(InputBinding::Node(NodeId::new("a"))));
        let dag = DagValidator::default().approve(dag).unwrap();
        let hang: Arc<dyn Worker> = Arc::new(Hang);
        let engine = Engine::new(registry(vec![hang]), EngineConfig::sequential());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            trigger.cancel();
        });

        let err = engine
            .execute_with_cancel(&dag, &Goal::new("g"), &bank(), cancel)
            .await
            .unwrap_err();
        let ExecutionError::Cancelled { report } = err else {
            panic!("expected cancellation");
        };
        assert_eq!(report.status, RunStatus::Cancelled);
        assert_eq!(
            report.nodes[&NodeId::new("a")],
            NodeOutcome::Failed {
                reason: FailureReason::Cancelled
            }
        );
        assert_eq!(
            report.nodes[&NodeId::new("b")],
            NodeOutcome::Blocked {
                reason: FailureReason::Cancelled
            }
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let engine = Engine::new(registry(vec![]), EngineConfig::sequential());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = engine
            .run(&spinoff_dag(), &Goal::new("g"), &bank(), cancel)
            .await
            .unwrap_err();
        let report = err.report().unwrap();
        assert!(report
            .nodes
            .values()
            .all(|o| matches!(o, NodeOutcome::Blocked { reason: FailureReason::Cancelled })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_marker_names_smallest_failed_ancestor() {
        let dag = Dag::new()
            .with_node(Node::new("a", "slow_fail", CRITERION_SCORE))
            .with_node(Node::new("b", "fast_fail", CRITERION_SCORE))
            .with_node(
                Node::new("c", "fixed", CRITERION_SCORE)
                    .with_input(InputBinding::Node(NodeId::new("a")))
                    .with_input(InputBinding::Node(NodeId::new("b"))),
            )
            .with_node(Node::new("d", "fixed", CRITERION_SCORE).with_input(InputBinding::Node(NodeId::new("c"))));
        let dag = DagValidator::default().approve(dag).unwrap();

        let workers = || {
            let slow: Arc<dyn Worker> = Arc::new(Failing {
                role: "slow_fail",
                delay: Duration::from_millis(30),
            });
            let fast: Arc<dyn Worker> = Arc::new(Failing {
                role: "fast_fail",
                delay: Duration::from_millis(1),
            });
            let fixed: Arc<dyn Worker> = Arc::new(Fixed {
                role: "fixed",
                criterion: "Ops Quality",
                score: 3,
            });
            vec![slow, fast, fixed]
        };

        let mut reports = Vec::new();
        for config in [EngineConfig::sequential(), EngineConfig::parallel(4)] {
            let engine = Engine::new(registry(workers()), config.with_retry(RetryPolicy::no_retry()));
            reports.push(engine.execute(&dag, &Goal::new("g"), &bank()).await.unwrap());
        }

        let expected = NodeOutcome::Blocked {
            reason: FailureReason::AncestorFailed {
                ancestor: NodeId::new("a"),
            },
        };
        for report in &reports {
            assert_eq!(report.nodes[&NodeId::new("c")], expected);
            assert_eq!(report.nodes[&NodeId::new("d")], expected);
        }
        assert_eq!(reports[0], reports[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_dispatch_bounded() {
        let dag = (0..8).fold(Dag::new(), |dag, i| {
            dag.with_node(Node::new(format!("n{i}"), "gauge", CRITERION_SCORE))
        });
        let dag = DagValidator::default().approve(dag).unwrap();

        for (config, bound) in [(EngineConfig::parallel(3), 3), (EngineConfig::sequential(), 1)] {
            let gauge = Arc::new(Gauge::default());
            let worker: Arc<dyn Worker> = gauge.clone();
            let engine = Engine::new(registry(vec![worker]), config);
            let report = engine.execute(&dag, &Goal::new("g"), &bank()).await.unwrap();

            assert_eq!(report.status, RunStatus::Completed);
            assert_eq!(gauge.peak.load(Ordering::SeqCst), bound);
        }
    }
}
