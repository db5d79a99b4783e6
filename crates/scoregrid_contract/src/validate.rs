//! Output validation against contracts.
//!
//! Every defect in a value is collected before returning, so a worker
//! retried with feedback sees the whole list at once.

use crate::schema::{Contract, FieldKind};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// What is wrong with a single field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum DefectKind {
    /// The whole output is not a JSON object
    NotAnObject {
        /// JSON type found
        found: String,
    },
    /// Required field absent
    Missing,
    /// Field has the wrong JSON type
    WrongType {
        /// Expected type
        expected: String,
        /// JSON type found
        found: String,
    },
    /// Number outside its declared bounds
    OutOfRange {
        /// Value found
        found: String,
        /// Inclusive bounds
        bounds: String,
    },
    /// String was empty where content is required
    Empty,
    /// Value not in the enum's allowed set
    NotAllowed {
        /// Value found
        value: String,
        /// Allowed values
        allowed: Vec<String>,
    },
    /// Value passed field checks but could not be decoded
    Undecodable {
        /// Decoder message
        reason: String,
    },
}

impl DefectKind {
    /// Stable short code for the defect
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotAnObject { .. } => "not_an_object",
            Self::Missing => "missing",
            Self::WrongType { .. } => "wrong_type",
            Self::OutOfRange { .. } => "out_of_range",
            Self::Empty => "empty",
            Self::NotAllowed { .. } => "not_allowed",
            Self::Undecodable { .. } => "undecodable",
        }
    }
}

/// A defect located at a field path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefect {
    /// Field path, `$` for the whole value, `name[i]` for list elements
    pub field: String,
    /// The defect
    #[serde(flatten)]
    pub kind: DefectKind,
}

impl FieldDefect {
    /// Create a defect
    #[must_use]
    pub fn new(field: impl Into<String>, kind: DefectKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }

    /// Human-readable description
    #[must_use]
    pub fn message(&self) -> String {
        match &self.kind {
            DefectKind::NotAnObject { found } => {
                format!("{}: expected a JSON object, found {}", self.field, found)
            }
            DefectKind::Missing => format!("{}: required field is missing", self.field),
            DefectKind::WrongType { expected, found } => {
                format!("{}: expected {}, found {}", self.field, expected, found)
            }
            DefectKind::OutOfRange { found, bounds } => {
                format!("{}: {} is outside {}", self.field, found, bounds)
            }
            DefectKind::Empty => format!("{}: must not be empty", self.field),
            DefectKind::NotAllowed { value, allowed } => {
                format!("{}: {:?} is not one of {:?}", self.field, value, allowed)
            }
            DefectKind::Undecodable { reason } => {
                format!("{}: could not decode: {}", self.field, reason)
            }
        }
    }

    /// JSON form fed back to a retried worker
    #[must_use]
    pub fn to_feedback(&self) -> Value {
        json!({
            "field": self.field,
            "problem": self.kind.code(),
            "message": self.message(),
        })
    }
}

/// Output rejected by a contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaViolation {
    /// Contract name
    pub contract: String,
    /// All defects found, in field declaration order
    pub defects: Vec<FieldDefect>,
}

impl SchemaViolation {
    /// Check whether any defect is located on the given field
    #[must_use]
    pub fn names_field(&self, field: &str) -> bool {
        self.defects.iter().any(|d| {
            d.field == field
                || d.field
                    .strip_prefix(field)
                    .is_some_and(|rest| rest.starts_with('['))
        })
    }

    /// Defect list as worker feedback
    #[must_use]
    pub fn feedback(&self) -> Vec<Value> {
        self.defects.iter().map(FieldDefect::to_feedback).collect()
    }
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Output violates contract {} ({} defect(s))",
            self.contract,
            self.defects.len()
        )?;
        for defect in &self.defects {
            write!(f, "; {}", defect.message())?;
        }
        Ok(())
    }
}

impl std::error::Error for SchemaViolation {}

/// Check a value against a contract
///
/// # Errors
///
/// Returns every defect found. Extra fields are ignored.
pub fn check_output(contract: &Contract, value: &Value) -> Result<(), SchemaViolation> {
    let mut defects = Vec::new();

    match value.as_object() {
        None => defects.push(FieldDefect::new(
            "$",
            DefectKind::NotAnObject {
                found: json_type(value).to_string(),
            },
        )),
        Some(obj) => {
            for (name, spec) in &contract.fields {
                match obj.get(name) {
                    None if spec.required => {
                        defects.push(FieldDefect::new(name.as_str(), DefectKind::Missing));
                    }
                    None => {}
                    Some(field_value) => check_field(name, &spec.kind, field_value, &mut defects),
                }
            }
        }
    }

    if defects.is_empty() {
        Ok(())
    } else {
        Err(SchemaViolation {
            contract: contract.name.clone(),
            defects,
        })
    }
}

fn check_field(name: &str, kind: &FieldKind, value: &Value, defects: &mut Vec<FieldDefect>) {
    let wrong_type = |expected: &str| {
        FieldDefect::new(
            name,
            DefectKind::WrongType {
                expected: expected.to_string(),
                found: json_type(value).to_string(),
            },
        )
    };

    match kind {
        FieldKind::Any => {}
        FieldKind::String { non_empty } => match value.as_str() {
            Some(s) if *non_empty && s.trim().is_empty() => {
                defects.push(FieldDefect::new(name, DefectKind::Empty));
            }
            Some(_) => {}
            None => defects.push(wrong_type("string")),
        },
        FieldKind::Integer { min, max } => match value.as_i64() {
            Some(n) => {
                let below = min.is_some_and(|m| n < m);
                let above = max.is_some_and(|m| n > m);
                if below || above {
                    defects.push(FieldDefect::new(
                        name,
                        DefectKind::OutOfRange {
                            found: n.to_string(),
                            bounds: bounds_text(*min, *max),
                        },
                    ));
                }
            }
            // u64 beyond i64::MAX is still an integer, just too large
            None if value.is_u64() => defects.push(FieldDefect::new(
                name,
                DefectKind::OutOfRange {
                    found: value.to_string(),
                    bounds: bounds_text(*min, *max),
                },
            )),
            None => defects.push(wrong_type("integer")),
        },
        FieldKind::Float { min, max } => match value.as_f64() {
            Some(x) => {
                let below = min.is_some_and(|m| x < m);
                let above = max.is_some_and(|m| x > m);
                if below || above {
                    defects.push(FieldDefect::new(
                        name,
                        DefectKind::OutOfRange {
                            found: value.to_string(),
                            bounds: bounds_text(*min, *max),
                        },
                    ));
                }
            }
            None => defects.push(wrong_type("float")),
        },
        FieldKind::Boolean => {
            if !value.is_boolean() {
                defects.push(wrong_type("boolean"));
            }
        }
        FieldKind::Enum { values } => match value.as_str() {
            Some(s) if values.iter().any(|v| v == s) => {}
            Some(s) => defects.push(FieldDefect::new(
                name,
                DefectKind::NotAllowed {
                    value: s.to_string(),
                    allowed: values.clone(),
                },
            )),
            None => defects.push(wrong_type("string")),
        },
        FieldKind::StringList => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    if !item.is_string() {
                        defects.push(FieldDefect::new(
                            format!("{name}[{i}]"),
                            DefectKind::WrongType {
                                expected: "string".to_string(),
                                found: json_type(item).to_string(),
                            },
                        ));
                    }
                }
            }
            None => defects.push(wrong_type("string_list")),
        },
        FieldKind::Array => {
            if !value.is_array() {
                defects.push(wrong_type("array"));
            }
        }
        FieldKind::Object => {
            if !value.is_object() {
                defects.push(wrong_type("object"));
            }
        }
    }
}

fn bounds_text<T: std::fmt::Display>(min: Option<T>, max: Option<T>) -> String {
    match (min, max) {
        (Some(lo), Some(hi)) => format!("[{lo}, {hi}]"),
        (Some(lo), None) => format!(">= {lo}"),
        (None, Some(hi)) => format!("<= {hi}"),
        (None, None) => "unbounded".to_string(),
    }
}

/// JSON type name of a value
#[must_use]
pub fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
