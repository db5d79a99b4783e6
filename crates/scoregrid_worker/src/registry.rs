//! Worker registry, one worker per role.

use crate::trait_::{InvocationError, Worker};
use indexmap::IndexMap;
use std::sync::Arc;

/// Error from worker registration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    /// Role already bound
    #[error("Role already registered: {role}")]
    AlreadyRegistered {
        /// Role that is taken
        role: String,
    },
}

/// Maps role names to workers
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    workers: IndexMap<String, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker under its own role
    ///
    /// # Errors
    ///
    /// Returns error if the role is already bound
    pub fn register(&mut self, worker: Arc<dyn Worker>) -> Result<(), RegisterError> {
        let role = worker.role().to_string();
        if self.workers.contains_key(&role) {
            return Err(RegisterError::AlreadyRegistered { role });
        }
        tracing::debug!(role = %role, "worker registered");
        self.workers.insert(role, worker);
        Ok(())
    }

    /// Builder form of [`register`](Self::register)
    ///
    /// # Errors
    ///
    /// Returns error if the role is already bound
    pub fn with(mut self, worker: Arc<dyn Worker>) -> Result<Self, RegisterError> {
        self.register(worker)?;
        Ok(self)
    }

    /// Look up the worker for a role
    ///
    /// # Errors
    ///
    /// Returns `UnknownRole` if nothing is registered
    pub fn get(&self, role: &str) -> Result<Arc<dyn Worker>, InvocationError> {
        self.workers
            .get(role)
            .cloned()
            .ok_or_else(|| InvocationError::UnknownRole {
                role: role.to_string(),
            })
    }

    /// Check if a role is registered
    #[must_use]
    pub fn contains(&self, role: &str) -> bool {
        self.workers.contains_key(role)
    }

    /// Registered roles in registration order
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.workers.keys().map(String::as_str)
    }

    /// Number of registered workers
    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("roles", &self.workers.keys().collect::<Vec<_>>())
            .finish()
    }
}
