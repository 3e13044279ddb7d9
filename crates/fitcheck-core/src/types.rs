//! Core data model: parameter values, parameter records and presets
//!
//! A preset file always holds the full, unfiltered snapshot taken at save
//! time. Blacklist filtering happens only when a preset is replayed.

use crate::error::{FitCheckError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Address prefix under which the endpoint publishes avatar parameters
pub const AVATAR_PARAMETERS_PREFIX: &str = "/avatar/parameters";

/// Address used to read and request the active avatar
pub const AVATAR_CHANGE_ADDRESS: &str = "/avatar/change";

/// Scalar parameter value
///
/// The endpoint reports values as JSON; containers and `null` are rejected
/// when converting rather than carried around.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl ParameterValue {
    /// Convert a JSON value into a scalar
    ///
    /// The endpoint wraps values in a single-element array (`[true]`); the
    /// first element is unwrapped. `path` is only used for error messages.
    pub fn from_json(value: &Value, path: &str) -> Result<Self> {
        let scalar = match value {
            Value::Array(items) => items.first().ok_or_else(|| FitCheckError::InvalidValue {
                path: path.to_string(),
                reason: "empty value array".to_string(),
            })?,
            other => other,
        };

        match scalar {
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Self::Float(f))
                } else {
                    Err(FitCheckError::InvalidValue {
                        path: path.to_string(),
                        reason: format!("number {} out of range", n),
                    })
                }
            }
            Value::String(s) => Ok(Self::String(s.clone())),
            Value::Null => Err(FitCheckError::InvalidValue {
                path: path.to_string(),
                reason: "null".to_string(),
            }),
            Value::Array(_) | Value::Object(_) => Err(FitCheckError::InvalidValue {
                path: path.to_string(),
                reason: "nested container".to_string(),
            }),
        }
    }

    /// Get as a string slice if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{}", v),
            Self::String(s) => write!(f, "{:?}", s),
        }
    }
}

/// One avatar parameter captured from the tree
///
/// Immutable once constructed. `raw_name` is derived from `path` and is not
/// stored in preset files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredParameter", into = "StoredParameter")]
pub struct ParameterRecord {
    name: String,
    raw_name: String,
    path: String,
    value: ParameterValue,
}

impl ParameterRecord {
    pub fn new(name: impl Into<String>, path: impl Into<String>, value: ParameterValue) -> Self {
        let path = path.into();
        Self {
            name: name.into(),
            raw_name: raw_name_for(&path).to_string(),
            path,
            value,
        }
    }

    /// Leaf identifier (last path segment)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path relative to the avatar parameter prefix, used for prefix matching
    pub fn raw_name(&self) -> &str {
        &self.raw_name
    }

    /// Full tree address
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn value(&self) -> &ParameterValue {
        &self.value
    }
}

/// Strip the avatar parameter prefix from a path
pub fn raw_name_for(path: &str) -> &str {
    path.strip_prefix(AVATAR_PARAMETERS_PREFIX)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(path)
}

/// On-disk shape of a parameter (`{"name", "path", "value"}`)
#[derive(Serialize, Deserialize)]
struct StoredParameter {
    name: String,
    path: String,
    value: Value,
}

impl TryFrom<StoredParameter> for ParameterRecord {
    type Error = FitCheckError;

    fn try_from(stored: StoredParameter) -> Result<Self> {
        let value = ParameterValue::from_json(&stored.value, &stored.path)?;
        Ok(ParameterRecord::new(stored.name, stored.path, value))
    }
}

impl From<ParameterRecord> for StoredParameter {
    fn from(record: ParameterRecord) -> Self {
        let value = serde_json::to_value(&record.value).unwrap_or(Value::Null);
        StoredParameter {
            name: record.name,
            path: record.path,
            value,
        }
    }
}

/// A named snapshot of one avatar's parameter values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarPreset {
    pub name: String,
    pub avatar_id: String,
    /// Reserved; carried through files unchanged
    #[serde(default)]
    pub unique_key: String,
    /// Discovery order of the snapshot
    #[serde(default)]
    pub parameters: Vec<ParameterRecord>,
}

impl AvatarPreset {
    pub fn new(
        name: impl Into<String>,
        avatar_id: impl Into<String>,
        parameters: Vec<ParameterRecord>,
    ) -> Self {
        Self {
            name: name.into(),
            avatar_id: avatar_id.into(),
            unique_key: String::new(),
            parameters,
        }
    }

    /// Serialize to the preset file document
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a preset file document
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
