//! Built-in contracts and their typed forms.

use crate::schema::{Contract, FieldKind, FieldSpec};
use crate::validate::{DefectKind, FieldDefect, SchemaViolation, check_output};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the leaf scoring contract
pub const CRITERION_SCORE: &str = "CriterionScore";

/// Name of the composer output contract
pub const COMPOSITE_REPORT: &str = "CompositeReport";

/// Lowest valid criterion score
pub const SCORE_MIN: i64 = 1;

/// Highest valid criterion score
pub const SCORE_MAX: i64 = 5;

/// Validated score for one criterion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    /// Criterion name
    pub criterion: String,
    /// Score in `1..=5`
    pub score: i64,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
    /// Free-text justification
    pub rationale: String,
    /// Evidence source identifiers
    #[serde(default)]
    pub evidence_ids: Vec<String>,
}

impl CriterionScore {
    /// Create a score without evidence
    #[must_use]
    pub fn new(
        criterion: impl Into<String>,
        score: i64,
        confidence: f64,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            criterion: criterion.into(),
            score,
            confidence,
            rationale: rationale.into(),
            evidence_ids: Vec::new(),
        }
    }

    /// Attach evidence identifiers
    #[must_use]
    pub fn with_evidence(mut self, evidence_ids: Vec<String>) -> Self {
        self.evidence_ids = evidence_ids;
        self
    }

    /// Contract every criterion score must satisfy
    #[must_use]
    pub fn contract() -> Contract {
        Contract::new(CRITERION_SCORE)
            .with_field("criterion", FieldSpec::required(FieldKind::non_empty_string()))
            .with_field(
                "score",
                FieldSpec::required(FieldKind::integer_range(SCORE_MIN, SCORE_MAX)),
            )
            .with_field("confidence", FieldSpec::required(FieldKind::float_range(0.0, 1.0)))
            .with_field("rationale", FieldSpec::required(FieldKind::string()))
            .with_field("evidence_ids", FieldSpec::required(FieldKind::StringList))
    }

    /// Validate then decode a raw value
    ///
    /// # Errors
    ///
    /// Returns the violation if the value does not satisfy the contract
    pub fn from_value(value: &Value) -> Result<Self, SchemaViolation> {
        check_output(&Self::contract(), value)?;
        decode(CRITERION_SCORE, value)
    }

    /// JSON form
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "criterion": self.criterion,
            "score": self.score,
            "confidence": self.confidence,
            "rationale": self.rationale,
            "evidence_ids": self.evidence_ids,
        })
    }
}

/// Composer output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeReport {
    /// Weighted composite in `[0, 5]`
    pub composite_score: f64,
    /// Retained criterion scores
    pub criteria: Vec<CriterionScore>,
    /// Expected criteria with no score
    pub missing_criteria: Vec<String>,
    /// Composition policy name
    pub policy: String,
}

impl CompositeReport {
    /// Contract the composer output must satisfy
    #[must_use]
    pub fn contract() -> Contract {
        Contract::new(COMPOSITE_REPORT)
            .with_field(
                "composite_score",
                FieldSpec::required(FieldKind::float_range(0.0, SCORE_MAX as f64)),
            )
            .with_field("criteria", FieldSpec::required(FieldKind::Array))
            .with_field("missing_criteria", FieldSpec::required(FieldKind::StringList))
            .with_field("policy", FieldSpec::required(FieldKind::non_empty_string()))
    }

    /// Validate then decode a raw value
    ///
    /// # Errors
    ///
    /// Returns the violation if the value does not satisfy the contract
    pub fn from_value(value: &Value) -> Result<Self, SchemaViolation> {
        check_output(&Self::contract(), value)?;
        decode(COMPOSITE_REPORT, value)
    }

    /// JSON form
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "composite_score": self.composite_score,
            "criteria": self.criteria.iter().map(CriterionScore::to_json).collect::<Vec<_>>(),
            "missing_criteria": self.missing_criteria,
            "policy": self.policy,
        })
    }
}

fn decode<T: serde::de::DeserializeOwned>(contract: &str, value: &Value) -> Result<T, SchemaViolation> {
    T::deserialize(value).map_err(|e| SchemaViolation {
        contract: contract.to_string(),
        defects: vec![FieldDefect::new(
            "$",
            DefectKind::Undecodable {
                reason: e.to_string(),
            },
        )],
    })
}
