//! Contract registry.

use crate::criterion::{CompositeReport, CriterionScore};
use crate::schema::Contract;
use indexmap::IndexMap;

/// Error from registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Contract name already taken
    #[error("Contract already registered: {name}")]
    AlreadyRegistered {
        /// Contract name
        name: String,
    },

    /// Contract has no name
    #[error("Contract name must not be empty")]
    Unnamed,
}

/// Named contracts, in registration order
#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    contracts: IndexMap<String, Contract>,
    builtin: usize,
}

impl ContractRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in contracts
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut contracts = IndexMap::new();
        for contract in [CriterionScore::contract(), CompositeReport::contract()] {
            contracts.insert(contract.name.clone(), contract);
        }
        let builtin = contracts.len();
        Self { contracts, builtin }
    }

    /// Register a contract
    ///
    /// # Errors
    ///
    /// Returns error if the name is empty or already registered
    pub fn register(&mut self, contract: Contract) -> Result<(), RegistryError> {
        if contract.name.trim().is_empty() {
            return Err(RegistryError::Unnamed);
        }
        if self.contracts.contains_key(&contract.name) {
            return Err(RegistryError::AlreadyRegistered {
                name: contract.name,
            });
        }
        self.contracts.insert(contract.name.clone(), contract);
        Ok(())
    }

    /// Add contracts declared by a plan
    ///
    /// Names taken by built-ins are skipped with a warning, a later
    /// declaration of a non-built-in name replaces the earlier one.
    /// Returns the names that were skipped.
    pub fn extend_declared<I>(&mut self, declared: I) -> Vec<String>
    where
        I: IntoIterator<Item = (String, Contract)>,
    {
        let mut ignored = Vec::new();
        for (name, contract) in declared {
            if self.is_builtin(&name) {
                tracing::warn!(contract = %name, "plan contract shadows a built-in, ignoring");
                ignored.push(name);
                continue;
            }
            self.contracts.insert(name.clone(), contract.named(name));
        }
        ignored
    }

    /// Check whether a name belongs to a built-in contract
    #[must_use]
    pub fn is_builtin(&self, name: &str) -> bool {
        self.contracts
            .get_index_of(name)
            .is_some_and(|idx| idx < self.builtin)
    }

    /// Look up a contract
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Contract> {
        self.contracts.get(name)
    }

    /// Check if a contract is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.contracts.contains_key(name)
    }

    /// Registered names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.contracts.keys().map(String::as_str)
    }

    /// Number of contracts
    #[must_use]
    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}
