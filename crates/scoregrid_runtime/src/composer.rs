//! Composition of criterion scores into one composite.
//!
//! Each score is weighted by its criterion weight, discounted by
//! confidence: `w = weight * (floor + (1 - floor) * confidence)`. The
//! composite is the weighted mean, or 0 when nothing was scored.

use crate::config::ConfigError;
use async_trait::async_trait;
use scoregrid_contract::{CompositeReport, CriterionScore, SCORE_MAX};
use scoregrid_worker::{InvocationError, NodeInput, Worker};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Role the composer is registered under
pub const COMPOSER_ROLE: &str = "composer";

/// Policy name recorded in every composite
pub const POLICY_NAME: &str = "weighted_confidence_mean";

/// Weights and confidence handling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositionPolicy {
    /// Per-criterion weights
    pub weights: BTreeMap<String, f64>,
    /// Weight of criteria not listed in `weights`
    pub default_weight: f64,
    /// Share of a weight kept at zero confidence
    pub confidence_floor: f64,
    /// Criteria that should be present
    pub expected: Vec<String>,
}

impl Default for CompositionPolicy {
    fn default() -> Self {
        let weights = [
            ("Debt Loading", 1.3),
            ("Index Exclusion", 1.2),
            ("Equity Incentives", 1.5),
        ]
        .into_iter()
        .map(|(name, w)| (name.to_string(), w))
        .collect();
        Self {
            weights,
            default_weight: 1.0,
            confidence_floor: 0.5,
            expected: Vec::new(),
        }
    }
}

impl CompositionPolicy {
    /// Weight of a criterion before confidence discount
    #[must_use]
    pub fn weight_for(&self, criterion: &str) -> f64 {
        self.weights
            .get(criterion)
            .copied()
            .unwrap_or(self.default_weight)
    }

    /// Weight of a score after confidence discount
    #[must_use]
    pub fn effective_weight(&self, score: &CriterionScore) -> f64 {
        let floor = self.confidence_floor;
        self.weight_for(&score.criterion) * (floor + (1.0 - floor) * score.confidence)
    }

    /// Require these criteria
    #[must_use]
    pub fn expecting(mut self, criteria: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.expected = criteria.into_iter().map(Into::into).collect();
        self
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns error for a floor outside `[0, 1]` or a negative weight
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence_floor) {
            return Err(ConfigError::invalid(
                "composer.confidence_floor",
                "must be within [0, 1]",
            ));
        }
        if !(self.default_weight.is_finite() && self.default_weight >= 0.0) {
            return Err(ConfigError::invalid(
                "composer.default_weight",
                "must be a non-negative number",
            ));
        }
        if let Some((name, _)) = self
            .weights
            .iter()
            .find(|(_, w)| !(w.is_finite() && **w >= 0.0))
        {
            return Err(ConfigError::invalid(
                "composer.weights",
                format!("weight for {name} must be a non-negative number"),
            ));
        }
        Ok(())
    }
}

/// Applies a composition policy
#[derive(Debug, Clone, Default)]
pub struct Composer {
    policy: CompositionPolicy,
}

impl Composer {
    /// Composer with a policy
    #[must_use]
    pub fn new(policy: CompositionPolicy) -> Self {
        Self { policy }
    }

    /// Active policy
    #[must_use]
    pub fn policy(&self) -> &CompositionPolicy {
        &self.policy
    }

    /// Compose scores into a composite report
    #[must_use]
    pub fn compose(&self, scores: &[CriterionScore]) -> CompositeReport {
        let (num, den) = scores.iter().fold((0.0, 0.0), |(num, den), s| {
            let w = self.policy.effective_weight(s);
            (num + w * s.score as f64, den + w)
        });
        let composite_score = if den > 0.0 {
            (num / den).clamp(0.0, SCORE_MAX as f64)
        } else {
            0.0
        };

        let present: BTreeSet<&str> = scores.iter().map(|s| s.criterion.as_str()).collect();
        let missing_criteria = self
            .policy
            .expected
            .iter()
            .filter(|c| !present.contains(c.as_str()))
            .cloned()
            .collect();

        CompositeReport {
            composite_score,
            criteria: scores.to_vec(),
            missing_criteria,
            policy: POLICY_NAME.to_string(),
        }
    }
}

/// The composer as a worker
#[derive(Debug, Clone, Default)]
pub struct ComposerWorker {
    composer: Composer,
}

impl ComposerWorker {
    /// Worker applying a policy
    #[must_use]
    pub fn new(policy: CompositionPolicy) -> Self {
        Self {
            composer: Composer::new(policy),
        }
    }

    fn scores(&self, inputs: &[Value]) -> Result<Vec<CriterionScore>, InvocationError> {
        inputs
            .iter()
            .enumerate()
            .map(|(i, value)| {
                if value.get("domain").is_some() {
                    return Err(self.invalid(format!("input {i} is a feature set")));
                }
                CriterionScore::from_value(value).map_err(|v| self.invalid(format!("input {i}: {v}")))
            })
            .collect()
    }

    fn invalid(&self, reason: String) -> InvocationError {
        InvocationError::InvalidInput {
            role: COMPOSER_ROLE.to_string(),
            reason,
        }
    }
}

#[async_trait]
impl Worker for ComposerWorker {
    fn role(&self) -> &str {
        COMPOSER_ROLE
    }

    async fn invoke(&self, input: Value) -> Result<Value, InvocationError> {
        let envelope = NodeInput::from_json(COMPOSER_ROLE, input)?;
        let scores = self.scores(&envelope.inputs)?;
        Ok(self.composer.compose(&scores).to_json())
    }
}
