//! Bounded worker invocation.

use crate::registry::WorkerRegistry;
use crate::retry::RetryPolicy;
use crate::trait_::InvocationError;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Calls workers by role with a per-call timeout
#[derive(Debug, Clone)]
pub struct Invoker {
    registry: Arc<WorkerRegistry>,
    timeout: Duration,
}

impl Invoker {
    /// Create an invoker
    #[must_use]
    pub fn new(registry: Arc<WorkerRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// Registry backing this invoker
    #[must_use]
    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    /// Per-call timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// One invocation, bounded by the timeout
    ///
    /// # Errors
    ///
    /// Returns the worker's error, `Timeout`, or `UnknownRole`
    pub async fn invoke_once(&self, role: &str, input: Value) -> Result<Value, InvocationError> {
        let worker = self.registry.get(role)?;
        debug!(role = %role, "invoking worker");
        match tokio::time::timeout(self.timeout, worker.invoke(input)).await {
            Ok(result) => result,
            Err(_) => Err(InvocationError::Timeout {
                role: role.to_string(),
                after_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Invoke with the same input until success or the budget runs out
    ///
    /// # Errors
    ///
    /// Returns the last error once attempts are exhausted, or immediately
    /// for a non-retryable error
    pub async fn invoke_retrying(
        &self,
        role: &str,
        input: Value,
        policy: &RetryPolicy,
    ) -> Result<Value, InvocationError> {
        let mut attempt = 1;
        loop {
            match self.invoke_once(role, input.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && policy.allows_another(attempt) => {
                    let backoff = policy.backoff(attempt);
                    warn!(
                        role = %role,
                        attempt,
                        max_attempts = policy.max_attempts,
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "retrying invocation"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
