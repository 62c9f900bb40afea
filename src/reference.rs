//! Link-field references
//!
//! A link field points at records in another table. Providers deliver it
//! either as bare record ids or as tagged `{id, value}` tuples; both land in
//! [`Reference`] so call sites never inspect the shape themselves.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single link-field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reference {
    /// Bare record identifier
    Direct(String),
    /// Tagged tuple carrying the column it came from and a display value
    Linked {
        #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
        table: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        display: String,
    },
}

impl Reference {
    /// Identifier when `return_id` is set, display value otherwise.
    ///
    /// A bare reference returns itself either way. A tuple without an id
    /// falls back to its display value.
    #[must_use]
    pub fn resolve(&self, return_id: bool) -> &str {
        match self {
            Self::Direct(id) => id,
            Self::Linked { id, display, .. } => {
                if return_id {
                    id.as_deref().unwrap_or(display)
                } else {
                    display
                }
            }
        }
    }

    /// Parse one raw link value.
    ///
    /// Strings and numbers become [`Reference::Direct`]; objects become
    /// [`Reference::Linked`], reading the display text from `display` or
    /// `value`.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::Direct(s.clone())),
            Value::Number(n) => Some(Self::Direct(n.to_string())),
            Value::Object(obj) => {
                let id = obj.get("id").and_then(scalar_to_string);
                let display = obj
                    .get("display")
                    .or_else(|| obj.get("value"))
                    .and_then(scalar_to_string)
                    .or_else(|| id.clone())?;
                let table = obj.get("type").and_then(Value::as_str).map(str::to_string);
                Some(Self::Linked { table, id, display })
            }
            _ => None,
        }
    }

    /// Parse a link field, which may be a sequence or a single value.
    #[must_use]
    pub fn list_from_value(value: &Value) -> Vec<Self> {
        match value {
            Value::Array(items) => items.iter().filter_map(Self::from_value).collect(),
            Value::Null => Vec::new(),
            other => Self::from_value(other).into_iter().collect(),
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
