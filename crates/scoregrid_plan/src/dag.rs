//! Plan documents and the approved DAG.
//!
//! A [`Dag`] is exactly what the planner returned, checked only for
//! shape. An [`ApprovedDag`] has passed [`DagValidator`](crate::DagValidator)
//! and is immutable from then on.

use indexmap::IndexMap;
use scoregrid_contract::{Contract, ContractRegistry};
use scoregrid_core::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One input of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawBinding", rename_all = "snake_case")]
pub enum InputBinding {
    /// Output of an upstream node
    Node(NodeId),
    /// Initial feature set with this domain
    Feature(String),
}

/// Accepted JSON spellings of a binding
#[derive(Deserialize)]
#[serde(untagged)]
enum RawBinding {
    Bare(String),
    Node { node: String },
    Feature { feature: String },
}

impl From<RawBinding> for InputBinding {
    fn from(raw: RawBinding) -> Self {
        match raw {
            RawBinding::Bare(id) | RawBinding::Node { node: id } => Self::Node(NodeId::new(id)),
            RawBinding::Feature { feature } => Self::Feature(feature),
        }
    }
}

impl InputBinding {
    /// Upstream node, if this binds one
    #[must_use]
    pub fn node_ref(&self) -> Option<&NodeId> {
        match self {
            Self::Node(id) => Some(id),
            Self::Feature(_) => None,
        }
    }
}

/// A typed unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Unique id
    pub id: NodeId,
    /// Worker role that executes the node
    pub role: String,
    /// Inputs, in the order handed to the worker
    #[serde(default)]
    pub inputs: Vec<InputBinding>,
    /// Output contract name
    #[serde(rename = "outputs")]
    pub output: String,
}

impl Node {
    /// Create a node with no inputs
    #[must_use]
    pub fn new(id: impl Into<NodeId>, role: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            inputs: Vec::new(),
            output: output.into(),
        }
    }

    /// Add an input
    #[must_use]
    pub fn with_input(mut self, input: InputBinding) -> Self {
        self.inputs.push(input);
        self
    }

    /// Upstream nodes referenced as inputs
    pub fn node_refs(&self) -> impl Iterator<Item = &NodeId> {
        self.inputs.iter().filter_map(InputBinding::node_ref)
    }
}

/// Producer-before-consumer dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Producer
    pub from: NodeId,
    /// Consumer
    pub to: NodeId,
}

impl Edge {
    /// Create an edge
    #[must_use]
    pub fn new(from: impl Into<NodeId>, to: impl Into<NodeId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// A plan document as produced by the planner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dag {
    /// Nodes in document order
    pub nodes: Vec<Node>,
    /// Explicit edges
    pub edges: Vec<Edge>,
    /// Contracts declared by the plan
    #[serde(default)]
    pub contracts: IndexMap<String, Contract>,
}

impl Dag {
    /// Create an empty plan
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node
    #[must_use]
    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Add an edge
    #[must_use]
    pub fn with_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Declare a contract
    #[must_use]
    pub fn with_contract(mut self, name: impl Into<String>, contract: Contract) -> Self {
        self.contracts.insert(name.into(), contract);
        self
    }

    /// Every dependency pair, explicit edges first, then input references
    pub(crate) fn dependency_pairs(&self) -> impl Iterator<Item = (&NodeId, &NodeId)> {
        let explicit = self.edges.iter().map(|e| (&e.from, &e.to));
        let implicit = self
            .nodes
            .iter()
            .flat_map(|n| n.node_refs().map(move |r| (r, &n.id)));
        explicit.chain(implicit)
    }
}

/// A validated plan, read-only
#[derive(Debug, Clone)]
pub struct ApprovedDag {
    dag: Dag,
    nodes: BTreeMap<NodeId, usize>,
    dependencies: BTreeMap<NodeId, BTreeSet<NodeId>>,
    dependents: BTreeMap<NodeId, BTreeSet<NodeId>>,
    terminals: BTreeSet<NodeId>,
    contracts: ContractRegistry,
}

impl ApprovedDag {
    /// Assemble from a plan the validator has accepted
    pub(crate) fn new(
        dag: Dag,
        dependencies: BTreeMap<NodeId, BTreeSet<NodeId>>,
        dependents: BTreeMap<NodeId, BTreeSet<NodeId>>,
        terminals: BTreeSet<NodeId>,
        contracts: ContractRegistry,
    ) -> Self {
        let nodes = dag
            .nodes
            .iter()
            .enumerate()
            .map(|(idx, n)| (n.id.clone(), idx))
            .collect();
        Self {
            dag,
            nodes,
            dependencies,
            dependents,
            terminals,
            contracts,
        }
    }

    /// The underlying plan
    #[must_use]
    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    /// Node ids in ascending order
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    /// Look up a node
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id).and_then(|&idx| self.dag.nodes.get(idx))
    }

    /// Nodes in document order
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.dag.nodes
    }

    /// Number of nodes
    #[must_use]
    pub fn len(&self) -> usize {
        self.dag.nodes.len()
    }

    /// Always false for an approved plan
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dag.nodes.is_empty()
    }

    /// Direct upstream nodes
    #[must_use]
    pub fn dependencies(&self, id: &NodeId) -> Option<&BTreeSet<NodeId>> {
        self.dependencies.get(id)
    }

    /// Direct downstream nodes
    #[must_use]
    pub fn dependents(&self, id: &NodeId) -> Option<&BTreeSet<NodeId>> {
        self.dependents.get(id)
    }

    /// Nodes with no dependents
    #[must_use]
    pub fn terminals(&self) -> &BTreeSet<NodeId> {
        &self.terminals
    }

    /// Check if a node is terminal
    #[must_use]
    pub fn is_terminal(&self, id: &NodeId) -> bool {
        self.terminals.contains(id)
    }

    /// Built-in plus plan-declared contracts
    #[must_use]
    pub fn contracts(&self) -> &ContractRegistry {
        &self.contracts
    }

    /// Output contract of a node
    #[must_use]
    pub fn contract_for(&self, id: &NodeId) -> Option<&Contract> {
        self.node(id).and_then(|n| self.contracts.get(&n.output))
    }
}
