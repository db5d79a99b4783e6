//! Deterministic rule scorers for the spinoff grid.
//!
//! Each scorer consumes the one feature set tagged with its domain and
//! emits a `CriterionScore`. Missing numeric features read as 0.

use crate::trait_::{InvocationError, NodeInput, Worker};
use async_trait::async_trait;
use scoregrid_contract::CriterionScore;
use scoregrid_core::FeatureSet;
use serde_json::Value;

/// Rule from a feature set to a score
pub type ScoringRule = fn(&FeatureSet) -> CriterionScore;

/// ADV below which an index-ineligible spinoff faces forced selling
const THIN_ADV_USD: f64 = 15_000_000.0;

/// Score debt loading from the capital structure hub
#[must_use]
pub fn score_debt_loading(features: &FeatureSet) -> CriterionScore {
    let nl = features.number("net_leverage_turns").unwrap_or(0.0);
    let fcf_nd = features.number("fcf_to_net_debt_pct").unwrap_or(0.0);

    let score = if nl <= 1.5 {
        1
    } else if nl <= 3.0 {
        3
    } else if fcf_nd >= 30.0 {
        5
    } else if fcf_nd >= 20.0 {
        4
    } else {
        3
    };

    let rationale =
        format!("Net leverage {nl:.1}x; FCF/NetDebt approx {fcf_nd:.0}% -> deleveraging plausible.");
    CriterionScore::new("Debt Loading", score, 0.75, rationale).with_evidence(
        features.sources_for(&["net_leverage_turns", "fcf_to_net_debt_pct"]),
    )
}

/// Score index exclusion risk from the microstructure hub
#[must_use]
pub fn score_index_exclusion(features: &FeatureSet) -> CriterionScore {
    let eligible = features.flag("russell_eligible").unwrap_or(true);
    let adv = features.number("avg_daily_dollar_volume").unwrap_or(0.0);

    let (score, rationale) = match (eligible, adv < THIN_ADV_USD) {
        (false, true) => (
            5,
            "Likely excluded from major indices at spin; thin ADV increases forced selling risk.",
        ),
        (false, false) => (4, "Likely excluded; liquidity somewhat offsets."),
        (true, _) => (2, "Index eligible; less forced selling."),
    };

    CriterionScore::new("Index Exclusion", score, 0.70, rationale).with_evidence(
        features.sources_for(&["russell_eligible", "avg_daily_dollar_volume"]),
    )
}

/// Score management equity incentives from the ownership hub
#[must_use]
pub fn score_equity_incentives(features: &FeatureSet) -> CriterionScore {
    let pct = features.number("mgmt_ownership_pct").unwrap_or(0.0);
    let perf = features.flag("perf_equity_present").unwrap_or(false);

    let score = match (pct, perf) {
        (p, true) if p >= 3.0 => 5,
        (p, true) if p >= 1.0 => 4,
        (p, _) if p >= 1.0 => 3,
        _ => 2,
    };

    let with = if perf { "with" } else { "without" };
    let rationale = format!("Mgmt owns approx {pct:.1}% {with} performance equity.");
    CriterionScore::new("Equity Incentives", score, 0.80, rationale).with_evidence(
        features.sources_for(&["mgmt_ownership_pct", "perf_equity_present"]),
    )
}

/// Worker wrapping a scoring rule
#[derive(Debug, Clone)]
pub struct RuleScorer {
    role: &'static str,
    domain: &'static str,
    rule: ScoringRule,
}

impl RuleScorer {
    /// Create a scorer for a role reading one domain
    #[must_use]
    pub const fn new(role: &'static str, domain: &'static str, rule: ScoringRule) -> Self {
        Self { role, domain, rule }
    }

    /// `debt_loading_scorer` over `capital_structure`
    #[must_use]
    pub const fn debt_loading() -> Self {
        Self::new("debt_loading_scorer", "capital_structure", score_debt_loading)
    }

    /// `index_exclusion_scorer` over `microstructure`
    #[must_use]
    pub const fn index_exclusion() -> Self {
        Self::new("index_exclusion_scorer", "microstructure", score_index_exclusion)
    }

    /// `equity_incentives_scorer` over `ownership`
    #[must_use]
    pub const fn equity_incentives() -> Self {
        Self::new("equity_incentives_scorer", "ownership", score_equity_incentives)
    }

    /// The three spinoff grid scorers
    #[must_use]
    pub fn spinoff_scorers() -> Vec<Self> {
        vec![
            Self::debt_loading(),
            Self::index_exclusion(),
            Self::equity_incentives(),
        ]
    }

    /// Domain this scorer reads
    #[must_use]
    pub const fn domain(&self) -> &'static str {
        self.domain
    }

    fn find_features(&self, inputs: &[Value]) -> Result<FeatureSet, InvocationError> {
        inputs
            .iter()
            .filter(|v| v.get("domain").and_then(Value::as_str) == Some(self.domain))
            .find_map(|v| FeatureSet::from_json(v).ok())
            .ok_or_else(|| InvocationError::InvalidInput {
                role: self.role.to_string(),
                reason: format!("no feature set for domain {}", self.domain),
            })
    }
}

#[async_trait]
impl Worker for RuleScorer {
    fn role(&self) -> &str {
        self.role
    }

    async fn invoke(&self, input: Value) -> Result<Value, InvocationError> {
        let envelope = NodeInput::from_json(self.role, input)?;
        let features = self.find_features(&envelope.inputs)?;
        Ok((self.rule)(&features).to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scoregrid_core::{NodeId, Provenance};
    use serde_json::json;

    fn ownership(pct: f64, perf: bool) -> FeatureSet {
        FeatureSet::new(
            "ownership",
            [
                ("mgmt_ownership_pct", json!(pct)),
                ("perf_equity_present", json!(perf)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_equity_scenarios() {
        assert_eq!(score_equity_incentives(&ownership(4.0, true)).score, 5);
        assert_eq!(score_equity_incentives(&ownership(1.0, false)).score, 3);
        assert_eq!(score_equity_incentives(&ownership(0.0, false)).score, 2);
        assert_eq!(score_equity_incentives(&ownership(2.1, true)).score, 4);
    }

    #[test]
    fn test_equity_rationale() {
        let score = score_equity_incentives(&ownership(2.1, true));
        assert_eq!(score.rationale, "Mgmt owns approx 2.1% with performance equity.");
        assert_eq!(score.criterion, "Equity Incentives");
        assert!((score.confidence - 0.80).abs() < f64::EPSILON);
    }

    #[test]
    fn test_equity_reads_numeric_flag() {
        let fs = FeatureSet::new(
            "ownership",
            [("mgmt_ownership_pct", json!(3.5)), ("perf_equity_present", json!(1))],
        )
        .unwrap();
        assert_eq!(score_equity_incentives(&fs).score, 5);
    }

    #[test]
    fn test_debt_thresholds() {
        let cap = |nl: f64, fcf: f64| {
            FeatureSet::new(
                "capital_structure",
                [("net_leverage_turns", json!(nl)), ("fcf_to_net_debt_pct", json!(fcf))],
            )
            .unwrap()
        };
        assert_eq!(score_debt_loading(&cap(1.0, 50.0)).score, 1);
        assert_eq!(score_debt_loading(&cap(3.0, 50.0)).score, 3);
        assert_eq!(score_debt_loading(&cap(3.2, 22.0)).score, 4);
        assert_eq!(score_debt_loading(&cap(3.2, 35.0)).score, 5);
        assert_eq!(score_debt_loading(&cap(4.0, 10.0)).score, 3);
        assert_eq!(
            score_debt_loading(&cap(3.2, 22.0)).rationale,
            "Net leverage 3.2x; FCF/NetDebt approx 22% -> deleveraging plausible."
        );
    }

    #[test]
    fn test_debt_missing_features_default_to_zero() {
        let fs = FeatureSet::new("capital_structure", Vec::<(String, Value)>::new()).unwrap();
        assert_eq!(score_debt_loading(&fs).score, 1);
    }

    #[test]
    fn test_index_exclusion() {
        let micro = |eligible: Value, adv: f64| {
            FeatureSet::new(
                "microstructure",
                [("russell_eligible", eligible), ("avg_daily_dollar_volume", json!(adv))],
            )
            .unwrap()
        };
        assert_eq!(score_index_exclusion(&micro(json!(0), 12_000_000.0)).score, 5);
        assert_eq!(score_index_exclusion(&micro(json!(false), 20_000_000.0)).score, 4);
        assert_eq!(score_index_exclusion(&micro(json!(1), 1.0)).score, 2);

        let no_flag = FeatureSet::new("microstructure", [("avg_daily_dollar_volume", json!(1.0))])
            .unwrap();
        assert_eq!(score_index_exclusion(&no_flag).score, 2);
    }

    #[test]
    fn test_evidence_from_provenance() {
        let fs = FeatureSet::new("capital_structure", [("net_leverage_turns", json!(3.2))])
            .unwrap()
            .with_provenance(vec![Provenance::new(
                "net_leverage_turns",
                "https://example.com/press",
            )]);
        let score = score_debt_loading(&fs);
        assert_eq!(score.evidence_ids, vec!["https://example.com/press"]);
    }

    #[tokio::test]
    async fn test_worker_picks_matching_domain() {
        let scorer = RuleScorer::equity_incentives();
        let input = NodeInput {
            node: NodeId::new("score_equity"),
            role: "equity_incentives_scorer".to_string(),
            inputs: vec![
                json!({ "domain": "ops", "ebitda_margin_pct": 14 }),
                ownership(4.0, true).to_json(),
            ],
            attempt: 1,
            feedback: vec![],
        };
        let output = scorer.invoke(input.to_json()).await.unwrap();
        let score = CriterionScore::from_value(&output).unwrap();
        assert_eq!(score.score, 5);
    }

    #[tokio::test]
    async fn test_worker_without_domain_is_invalid_input() {
        let scorer = RuleScorer::debt_loading();
        let input = NodeInput {
            node: NodeId::new("score_debt"),
            role: "debt_loading_scorer".to_string(),
            inputs: vec![ownership(1.0, true).to_json()],
            attempt: 1,
            feedback: vec![],
        };
        let err = scorer.invoke(input.to_json()).await.unwrap_err();
        assert!(matches!(err, InvocationError::InvalidInput { .. }));
    }
}
