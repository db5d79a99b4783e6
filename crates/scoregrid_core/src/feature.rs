//! Domain-tagged feature sets.
//!
//! A feature set is produced upstream of the DAG (the extraction stage) and
//! handed read-only to scorer nodes. Nothing downstream can mutate one.

use crate::error::{CoreError, CoreResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Keys that the flat JSON form reserves for itself
const RESERVED_KEYS: [&str; 2] = ["domain", "provenance"];

/// Where a feature value came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Feature the entry documents
    pub feature: String,
    /// Source identifier (URL, filing id, ...)
    pub source: String,
}

impl Provenance {
    /// Create a provenance entry
    #[must_use]
    pub fn new(feature: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            feature: feature.into(),
            source: source.into(),
        }
    }
}

/// Immutable, domain-tagged mapping of named input fields
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    domain: String,
    features: IndexMap<String, Value>,
    provenance: Vec<Provenance>,
}

impl FeatureSet {
    /// Create a feature set for a domain
    ///
    /// # Errors
    ///
    /// Returns error if the domain is empty or a feature uses a reserved name
    pub fn new<K, I>(domain: impl Into<String>, features: I) -> CoreResult<Self>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let domain = domain.into();
        if domain.trim().is_empty() {
            return Err(CoreError::Validation {
                field: "domain".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        let mut map = IndexMap::new();
        for (name, value) in features {
            let name = name.into();
            if RESERVED_KEYS.contains(&name.as_str()) {
                return Err(CoreError::Validation {
                    field: name,
                    reason: "reserved feature name".to_string(),
                });
            }
            map.insert(name, value);
        }

        Ok(Self {
            domain,
            features: map,
            provenance: Vec::new(),
        })
    }

    /// Attach provenance entries
    #[must_use]
    pub fn with_provenance(mut self, provenance: Vec<Provenance>) -> Self {
        self.provenance = provenance;
        self
    }

    /// Domain tag
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Raw feature value
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.features.get(name)
    }

    /// Feature as a number
    #[must_use]
    pub fn number(&self, name: &str) -> Option<f64> {
        self.features.get(name).and_then(Value::as_f64)
    }

    /// Feature as a flag. Accepts booleans and 0/1 style numbers
    #[must_use]
    pub fn flag(&self, name: &str) -> Option<bool> {
        match self.features.get(name)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_f64().map(|v| v != 0.0),
            _ => None,
        }
    }

    /// Iterate features in insertion order
    pub fn features(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.features.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Provenance entries
    #[must_use]
    pub fn provenance(&self) -> &[Provenance] {
        &self.provenance
    }

    /// Sources documenting any of the given features, in provenance order
    #[must_use]
    pub fn sources_for(&self, features: &[&str]) -> Vec<String> {
        self.provenance()
            .iter()
            .filter(|p| features.contains(&p.feature.as_str()))
            .map(|p| p.source.clone())
            .collect()
    }

    /// Flat JSON form handed to workers
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("domain".to_string(), Value::String(self.domain.clone()));
        for (name, value) in self.features() {
            obj.insert(name.to_string(), value.clone());
        }
        if !self.provenance.is_empty() {
            let entries = self
                .provenance()
                .iter()
                .map(|p| serde_json::json!({ "feature": p.feature, "source": p.source }))
                .collect();
            obj.insert("provenance".to_string(), Value::Array(entries));
        }
        Value::Object(obj)
    }

    /// Parse the flat JSON form
    ///
    /// # Errors
    ///
    /// Returns error if the value is not an object with a string `domain`
    pub fn from_json(value: &Value) -> CoreResult<Self> {
        let obj = value.as_object().ok_or_else(|| CoreError::InvalidEncoding {
            reason: "feature set must be a JSON object".to_string(),
        })?;

        let domain = obj
            .get("domain")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::Validation {
                field: "domain".to_string(),
                reason: "missing or not a string".to_string(),
            })?;

        let provenance = match obj.get("provenance") {
            Some(raw) => serde_json::from_value::<Vec<Provenance>>(raw.clone())?,
            None => Vec::new(),
        };

        let features = obj
            .iter()
            .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()));

        Ok(Self::new(domain, features)?.with_provenance(provenance))
    }
}

/// The initial feature sets of a run, keyed by domain
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureBank {
    sets: BTreeMap<String, FeatureSet>,
}

impl FeatureBank {
    /// Create an empty bank
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a bank from feature sets
    ///
    /// # Errors
    ///
    /// Returns error if two sets share a domain
    pub fn from_sets(sets: impl IntoIterator<Item = FeatureSet>) -> CoreResult<Self> {
        let mut bank = Self::new();
        for set in sets {
            bank.insert(set)?;
        }
        Ok(bank)
    }

    /// Add a feature set
    ///
    /// # Errors
    ///
    /// Returns error if the domain is already present
    pub fn insert(&mut self, set: FeatureSet) -> CoreResult<()> {
        if self.sets.contains_key(set.domain()) {
            return Err(CoreError::AlreadyExists {
                kind: "FeatureSet".to_string(),
                id: set.domain().to_string(),
            });
        }
        self.sets.insert(set.domain().to_string(), set);
        Ok(())
    }

    /// Look up a feature set by domain
    #[must_use]
    pub fn get(&self, domain: &str) -> Option<&FeatureSet> {
        self.sets.get(domain)
    }

    /// Check if a domain is present
    #[must_use]
    pub fn contains(&self, domain: &str) -> bool {
        self.sets.contains_key(domain)
    }

    /// Number of feature sets
    #[must_use]
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Check if bank is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Iterate feature sets in domain order
    pub fn iter(&self) -> impl Iterator<Item = &FeatureSet> {
        self.sets.values()
    }
}
