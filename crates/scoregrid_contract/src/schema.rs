//! Contract schemas for node output validation.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A named schema describing the fields of a node's output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    /// Contract name. Plans carry it as the map key, so it may be empty
    /// until the contract is registered
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Fields in declaration order
    #[serde(default)]
    pub fields: IndexMap<String, FieldSpec>,
}

impl Contract {
    /// Create an empty contract
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
        }
    }

    /// Add a field
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }

    /// Return the same contract under a different name
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Names of required fields
    #[must_use]
    pub fn required_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Constraint on a single field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Type and value constraints
    #[serde(flatten)]
    pub kind: FieldKind,
    /// Whether the field must be present
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl FieldSpec {
    /// A required field
    #[must_use]
    pub fn required(kind: FieldKind) -> Self {
        Self { kind, required: true }
    }

    /// An optional field, checked only when present
    #[must_use]
    pub fn optional(kind: FieldKind) -> Self {
        Self {
            kind,
            required: false,
        }
    }
}

/// Type of a field plus its value constraints. Bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    /// UTF-8 string
    String {
        /// Reject empty or whitespace-only strings
        #[serde(default)]
        non_empty: bool,
    },
    /// Whole number
    Integer {
        /// Lower bound
        #[serde(default)]
        min: Option<i64>,
        /// Upper bound
        #[serde(default)]
        max: Option<i64>,
    },
    /// Any number
    Float {
        /// Lower bound
        #[serde(default)]
        min: Option<f64>,
        /// Upper bound
        #[serde(default)]
        max: Option<f64>,
    },
    /// true / false
    Boolean,
    /// String drawn from a fixed set
    Enum {
        /// Allowed values
        values: Vec<String>,
    },
    /// Array whose elements are all strings
    StringList,
    /// Array of anything
    Array,
    /// JSON object
    Object,
    /// Any value, presence only
    Any,
}

impl FieldKind {
    /// Unconstrained string
    #[must_use]
    pub const fn string() -> Self {
        Self::String { non_empty: false }
    }

    /// String that must carry content
    #[must_use]
    pub const fn non_empty_string() -> Self {
        Self::String { non_empty: true }
    }

    /// Integer in `min..=max`
    #[must_use]
    pub const fn integer_range(min: i64, max: i64) -> Self {
        Self::Integer {
            min: Some(min),
            max: Some(max),
        }
    }

    /// Float in `min..=max`
    #[must_use]
    pub const fn float_range(min: f64, max: f64) -> Self {
        Self::Float {
            min: Some(min),
            max: Some(max),
        }
    }

    /// Human-readable type name used in defect messages
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::String { .. } => "string",
            Self::Integer { .. } => "integer",
            Self::Float { .. } => "float",
            Self::Boolean => "boolean",
            Self::Enum { .. } => "enum",
            Self::StringList => "string_list",
            Self::Array => "array",
            Self::Object => "object",
            Self::Any => "any",
        }
    }
}
