//! Worker trait

use async_trait::async_trait;
use scoregrid_core::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Failure to obtain a response from a worker
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvocationError {
    /// Worker did not answer in time
    #[error("Worker {role} timed out after {after_ms}ms")]
    Timeout {
        /// Worker role
        role: String,
        /// Wait that elapsed, in milliseconds
        after_ms: u64,
    },

    /// Worker could not be reached or answered with an error
    #[error("Transport failure for {role}: {message}")]
    Transport {
        /// Worker role
        role: String,
        /// Transport error text
        message: String,
    },

    /// Worker refused its input
    #[error("Worker {role} rejected its input: {reason}")]
    InvalidInput {
        /// Worker role
        role: String,
        /// What was wrong with the input
        reason: String,
    },

    /// No worker is registered for the role
    #[error("No worker registered for role {role}")]
    UnknownRole {
        /// Worker role
        role: String,
    },
}

impl InvocationError {
    /// Whether another attempt could succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::UnknownRole { .. })
    }

    /// Role the error concerns
    #[must_use]
    pub fn role(&self) -> &str {
        match self {
            Self::Timeout { role, .. }
            | Self::Transport { role, .. }
            | Self::InvalidInput { role, .. }
            | Self::UnknownRole { role } => role,
        }
    }
}

/// An opaque collaborator that answers JSON with JSON
#[async_trait]
pub trait Worker: Send + Sync {
    /// Role this worker serves
    fn role(&self) -> &str;

    /// Produce a response for one input
    async fn invoke(&self, input: Value) -> Result<Value, InvocationError>;
}

/// Input envelope handed to a node's worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInput {
    /// Node being executed
    pub node: NodeId,
    /// Role of the node
    pub role: String,
    /// Bound input values, in declaration order
    pub inputs: Vec<Value>,
    /// Attempt number, starting at 1
    pub attempt: u32,
    /// Defects reported against the previous attempt
    #[serde(default)]
    pub feedback: Vec<Value>,
}

impl NodeInput {
    /// Serialize to the JSON envelope
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "node": self.node,
            "role": self.role,
            "inputs": self.inputs,
            "attempt": self.attempt,
            "feedback": self.feedback,
        })
    }

    /// Parse the JSON envelope on the worker side
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the value is not an envelope
    pub fn from_json(role: &str, value: Value) -> Result<Self, InvocationError> {
        serde_json::from_value(value).map_err(|e| InvocationError::InvalidInput {
            role: role.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Decode a response that arrived as a JSON-encoded string
///
/// A string that does not parse is kept as-is, so contract validation
/// reports it as a non-object.
#[must_use]
pub fn decode_response(response: Value) -> Value {
    match response {
        Value::String(text) => match serde_json::from_str::<Value>(text.trim()) {
            Ok(decoded) => decoded,
            Err(_) => Value::String(text),
        },
        other => other,
    }
}
