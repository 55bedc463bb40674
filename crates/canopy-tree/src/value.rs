//! Property values

use serde::{Deserialize, Serialize};

/// A property value stored on a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    String(String),
    Name(String),
    Boolean(bool),
    Long(i64),
    /// Multi-valued name property
    Names(Vec<String>),
    /// Multi-valued string property
    Strings(Vec<String>),
}

impl Value {
    /// Single string content of `String` and `Name` values
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Name(s) => Some(s),
            _ => None,
        }
    }

    /// Content of multi-valued properties; single string values yield one item
    pub fn as_strings(&self) -> Option<Vec<&str>> {
        match self {
            Value::Names(values) | Value::Strings(values) => {
                Some(values.iter().map(String::as_str).collect())
            }
            Value::String(s) | Value::Name(s) => Some(vec![s.as_str()]),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::String(s) | Value::Name(s) => write!(f, "{}", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Long(n) => write!(f, "{}", n),
            Value::Names(values) | Value::Strings(values) => write!(f, "[{}]", values.join(", ")),
        }
    }
}
