//! Structural validation of plans.

use crate::dag::{ApprovedDag, Dag};
use crate::error::PlanError;
use scoregrid_contract::ContractRegistry;
use scoregrid_core::NodeId;
use std::collections::{BTreeMap, BTreeSet};

type Adjacency = BTreeMap<NodeId, BTreeSet<NodeId>>;

/// Validator for plan structure
#[derive(Debug, Clone)]
pub struct DagValidator {
    contracts: ContractRegistry,
}

impl DagValidator {
    /// Validator resolving contracts against `contracts`
    #[must_use]
    pub fn new(contracts: ContractRegistry) -> Self {
        Self { contracts }
    }

    /// Registry plan contracts are resolved against
    #[must_use]
    pub fn contracts(&self) -> &ContractRegistry {
        &self.contracts
    }

    /// Validate a plan
    ///
    /// # Errors
    ///
    /// Returns the first failed check
    pub fn validate(&self, dag: &Dag) -> Result<(), PlanError> {
        self.check(dag).map(|_| ())
    }

    /// Validate a plan and freeze it
    ///
    /// # Errors
    ///
    /// Returns the first failed check
    pub fn approve(&self, dag: Dag) -> Result<ApprovedDag, PlanError> {
        let Checked {
            dependencies,
            dependents,
            terminals,
            contracts,
        } = self.check(&dag)?;
        tracing::debug!(
            nodes = dag.nodes.len(),
            terminals = terminals.len(),
            "plan approved"
        );
        Ok(ApprovedDag::new(dag, dependencies, dependents, terminals, contracts))
    }

    fn check(&self, dag: &Dag) -> Result<Checked, PlanError> {
        let ids = check_unique(dag)?;
        let (dependencies, dependents) = check_references(dag, &ids)?;
        check_acyclic(&ids, &dependents)?;
        let contracts = self.check_contracts(dag)?;

        let terminals: BTreeSet<NodeId> = ids
            .iter()
            .filter(|id| dependents.get(*id).is_none_or(BTreeSet::is_empty))
            .cloned()
            .collect();
        if terminals.is_empty() {
            return Err(PlanError::NoTerminalNode);
        }

        Ok(Checked {
            dependencies,
            dependents,
            terminals,
            contracts,
        })
    }

    fn check_contracts(&self, dag: &Dag) -> Result<ContractRegistry, PlanError> {
        let mut contracts = self.contracts.clone();
        contracts.extend_declared(dag.contracts.iter().map(|(k, v)| (k.clone(), v.clone())));

        for node in &dag.nodes {
            if !contracts.contains(&node.output) {
                return Err(PlanError::UnknownContract {
                    node: node.id.clone(),
                    contract: node.output.clone(),
                });
            }
        }
        Ok(contracts)
    }
}

impl Default for DagValidator {
    fn default() -> Self {
        Self::new(ContractRegistry::with_builtins())
    }
}

struct Checked {
    dependencies: Adjacency,
    dependents: Adjacency,
    terminals: BTreeSet<NodeId>,
    contracts: ContractRegistry,
}

fn check_unique(dag: &Dag) -> Result<BTreeSet<NodeId>, PlanError> {
    let mut ids = BTreeSet::new();
    for node in &dag.nodes {
        if !ids.insert(node.id.clone()) {
            return Err(PlanError::DuplicateNode {
                id: node.id.clone(),
            });
        }
    }
    Ok(ids)
}

fn check_references(dag: &Dag, ids: &BTreeSet<NodeId>) -> Result<(Adjacency, Adjacency), PlanError> {
    let mut dependencies: Adjacency = ids.iter().map(|id| (id.clone(), BTreeSet::new())).collect();
    let mut dependents = dependencies.clone();

    for (from, to) in dag.dependency_pairs() {
        if !ids.contains(from) || !ids.contains(to) {
            return Err(PlanError::DanglingEdge {
                from: from.clone(),
                to: to.clone(),
            });
        }
        if let Some(set) = dependencies.get_mut(to) {
            set.insert(from.clone());
        }
        if let Some(set) = dependents.get_mut(from) {
            set.insert(to.clone());
        }
    }
    Ok((dependencies, dependents))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

fn check_acyclic(ids: &BTreeSet<NodeId>, dependents: &Adjacency) -> Result<(), PlanError> {
    let mut marks: BTreeMap<&NodeId, Mark> = BTreeMap::new();
    let mut path: Vec<&NodeId> = Vec::new();

    for id in ids {
        if !marks.contains_key(id) {
            if let Some(cycle) = dfs_cycle(id, dependents, &mut marks, &mut path) {
                return Err(PlanError::CyclicPlan { cycle });
            }
        }
    }
    Ok(())
}

/// Depth-first walk along dependents, in ascending id order
fn dfs_cycle<'a>(
    id: &'a NodeId,
    dependents: &'a Adjacency,
    marks: &mut BTreeMap<&'a NodeId, Mark>,
    path: &mut Vec<&'a NodeId>,
) -> Option<Vec<NodeId>> {
    marks.insert(id, Mark::InProgress);
    path.push(id);

    for next in dependents.get(id).into_iter().flatten() {
        match marks.get(next) {
            Some(Mark::InProgress) => {
                let start = path.iter().position(|n| *n == next).unwrap_or(0);
                return Some(path[start..].iter().map(|n| (*n).clone()).collect());
            }
            Some(Mark::Done) => {}
            None => {
                if let Some(cycle) = dfs_cycle(next, dependents, marks, path) {
                    return Some(cycle);
                }
            }
        }
    }

    path.pop();
    marks.insert(id, Mark::Done);
    None
}
