//! Engine and orchestrator configuration.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration.

use crate::composer::CompositionPolicy;
use scoregrid_worker::builtin::PLANNER_ROLE;
use scoregrid_worker::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("Failed to read config {path}: {source}")]
    Io {
        /// File that was read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// TOML did not parse into the config shape
    #[error("Invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of its allowed range
    #[error("Invalid config value {field}: {reason}")]
    Invalid {
        /// Dotted field path
        field: String,
        /// Constraint it broke
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// How ready nodes are dispatched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// One node at a time, ascending id among ready nodes
    #[default]
    Sequential,
    /// Ready nodes in flight together, up to `max_concurrency`
    Parallel,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Dispatch mode
    pub dispatch: DispatchMode,
    /// In-flight bound for parallel mode
    pub max_concurrency: usize,
    /// Wait bound for a single worker call
    pub node_timeout_ms: u64,
    /// How long in-flight calls may drain after cancellation
    pub drain_timeout_ms: u64,
    /// Attempt budget per node
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchMode::Sequential,
            max_concurrency: 4,
            node_timeout_ms: 30_000,
            drain_timeout_ms: 1_000,
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Sequential defaults
    #[must_use]
    pub fn sequential() -> Self {
        Self::default()
    }

    /// Parallel dispatch with the given bound
    #[must_use]
    pub fn parallel(max_concurrency: usize) -> Self {
        Self {
            dispatch: DispatchMode::Parallel,
            max_concurrency,
            ..Self::default()
        }
    }

    /// Set the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the per-call timeout
    #[must_use]
    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Per-call timeout
    #[must_use]
    pub const fn node_timeout(&self) -> Duration {
        Duration::from_millis(self.node_timeout_ms)
    }

    /// Drain bound after cancellation
    #[must_use]
    pub const fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Number of nodes allowed in flight at once
    #[must_use]
    pub fn concurrency_limit(&self) -> usize {
        match self.dispatch {
            DispatchMode::Sequential => 1,
            DispatchMode::Parallel => self.max_concurrency.max(1),
        }
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns the first invalid field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::invalid("max_concurrency", "must be at least 1"));
        }
        if self.node_timeout_ms == 0 {
            return Err(ConfigError::invalid("node_timeout_ms", "must be positive"));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::invalid("retry.max_attempts", "must be at least 1"));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ConfigError::invalid(
                "retry.initial_backoff_ms",
                "must not exceed retry.max_backoff_ms",
            ));
        }
        Ok(())
    }
}

/// Full orchestrator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Role asked for plans
    pub planner_role: String,
    /// Engine settings, also used for the planner call
    pub engine: EngineConfig,
    /// Composer weights and confidence handling
    pub composer: CompositionPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            planner_role: PLANNER_ROLE.to_string(),
            engine: EngineConfig::default(),
            composer: CompositionPolicy::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Parse and validate a TOML document
    ///
    /// # Errors
    ///
    /// Returns error on bad syntax or invalid values
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is invalid
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns the first invalid field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.planner_role.trim().is_empty() {
            return Err(ConfigError::invalid("planner_role", "must not be empty"));
        }
        self.engine.validate()?;
        self.composer.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::from_toml_str("").unwrap();
        assert_eq!(config, OrchestratorConfig::default());
        assert_eq!(config.engine.concurrency_limit(), 1);
        assert_eq!(config.engine.node_timeout(), Duration::from_secs(30));
        assert_eq!(config.planner_role, "planner");
    }

    #[test]
    fn test_partial_toml() {
        let config = OrchestratorConfig::from_toml_str(
            r#"
            planner_role = "llm_planner"

            [engine]
            dispatch = "parallel"
            max_concurrency = 8

            [engine.retry]
            max_attempts = 5

            [composer]
            confidence_floor = 0.25
            expected = ["Debt Loading", "Ops Quality"]

            [composer.weights]
            "Ops Quality" = 2.0
            "#,
        )
        .unwrap();
        assert_eq!(config.planner_role, "llm_planner");
        assert_eq!(config.engine.concurrency_limit(), 8);
        assert_eq!(config.engine.retry.max_attempts, 5);
        assert_eq!(config.engine.retry.initial_backoff_ms, 50);
        assert_eq!(config.composer.expected.len(), 2);
        assert!((config.composer.weight_for("Ops Quality") - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = OrchestratorConfig::from_toml_str("[engine]\nmax_concurrency = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field, .. } if field == "max_concurrency"));

        let err = OrchestratorConfig::from_toml_str("[engine.retry]\nmax_attempts = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field, .. } if field == "retry.max_attempts"));

        let err = OrchestratorConfig::from_toml_str("[composer]\nconfidence_floor = 1.5").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field, .. } if field == "composer.confidence_floor"));
    }

    #[test]
    fn test_bad_syntax() {
        let err = OrchestratorConfig::from_toml_str("[engine\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = OrchestratorConfig::from_toml_str("[engine]\ndispatch = \"eager\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine]\nnode_timeout_ms = 500").unwrap();
        let config = OrchestratorConfig::load(file.path()).unwrap();
        assert_eq!(config.engine.node_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = OrchestratorConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
