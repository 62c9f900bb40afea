//! Entity - Normalized records
//!
//! TigerStyle: One record shape regardless of which provider produced it.
//!
//! Every record leaving the data-access layer is an [`Entity`]:
//! `{ id, type, createdAt, ...fields }`. The two normalizers here are pure
//! functions, one per provider wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BackendError, BackendResult};
use crate::reference::Reference;
use crate::table::Table;

/// Field map of a record
pub type Fields = Map<String, Value>;

// =============================================================================
// TigerStyle Constants
// =============================================================================

/// Row-style position column, dropped on normalization
pub const ROW_ORDER_FIELD: &str = "order";

/// Row-style creation timestamp column
pub const ROW_CREATED_FIELD: &str = "CreatedAt";

/// Field used as a record's human-readable label
pub const DISPLAY_FIELD: &str = "Name";

// =============================================================================
// Entity
// =============================================================================

/// A normalized table record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Record id, unique within its table
    pub id: String,
    /// Canonical table the record belongs to
    #[serde(rename = "type")]
    pub table: Table,
    /// Creation time reported by the provider
    #[serde(rename = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
    /// Remaining columns
    #[serde(flatten)]
    pub fields: Fields,
}

impl Entity {
    /// Create an entity with no fields.
    #[must_use]
    pub fn new(table: Table, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            table,
            created_at: None,
            fields: Fields::new(),
        }
    }

    /// Add a field (builder style).
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Get a raw field value.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Get a field as text. Numbers are rendered, other shapes are skipped.
    #[must_use]
    pub fn text(&self, field: &str) -> Option<String> {
        match self.fields.get(field)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Read a link field as references.
    #[must_use]
    pub fn references(&self, field: &str) -> Vec<Reference> {
        self.fields
            .get(field)
            .map(Reference::list_from_value)
            .unwrap_or_default()
    }

    /// Human-readable label, falling back to the id.
    #[must_use]
    pub fn label(&self) -> String {
        self.text(DISPLAY_FIELD).unwrap_or_else(|| self.id.clone())
    }
}

// =============================================================================
// Base-style normalization
// =============================================================================

/// Normalize a base-style wire record `{ id, createdTime, fields }`.
///
/// Returns `None` for anything that is not an object with an id.
#[must_use]
pub fn normalize_base_record(table: Table, raw: &Value) -> Option<Entity> {
    let obj = raw.as_object()?;
    let id = obj.get("id").and_then(id_to_string)?;

    let created_at = obj
        .get("createdTime")
        .and_then(Value::as_str)
        .and_then(parse_timestamp);

    let fields = obj
        .get("fields")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    Some(Entity {
        id,
        table,
        created_at,
        fields,
    })
}

// =============================================================================
// Row-style normalization
// =============================================================================

/// Normalize the raw JSON of a row-style record.
///
/// Drops the `order` column and stamps every nested `{id, value}` tuple with
/// `type` = the name of the field it sits under. Non-objects pass through.
#[must_use]
pub fn normalize_row_value(raw: Value) -> Value {
    let Value::Object(obj) = raw else {
        return raw;
    };

    let normalized = obj
        .into_iter()
        .filter(|(key, _)| key != ROW_ORDER_FIELD)
        .map(|(key, value)| {
            if key == "id" {
                (key, value)
            } else {
                let stamped = stamp_links(value, &key);
                (key, stamped)
            }
        })
        .collect();

    Value::Object(normalized)
}

/// Tag link tuples found under `field`, recursing into nested columns.
fn stamp_links(value: Value, field: &str) -> Value {
    match value {
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| stamp_links(v, field)).collect())
        }
        Value::Object(obj) if obj.contains_key("id") => {
            let mut stamped: Fields = obj
                .into_iter()
                .map(|(key, value)| match key.as_str() {
                    "id" | "value" | "type" => (key, value),
                    _ => {
                        let inner = stamp_links(value, &key);
                        (key, inner)
                    }
                })
                .collect();
            stamped.insert("type".to_string(), Value::String(field.to_string()));
            Value::Object(stamped)
        }
        other => other,
    }
}

/// Build an entity from a row-style record.
pub fn entity_from_row(table: Table, raw: Value) -> BackendResult<Entity> {
    let Value::Object(mut fields) = normalize_row_value(raw) else {
        return Err(BackendError::decode(format!(
            "{table} row is not an object"
        )));
    };

    let id = fields
        .remove("id")
        .as_ref()
        .and_then(id_to_string)
        .ok_or_else(|| BackendError::decode(format!("{table} row has no id")))?;

    let created_at = fields
        .get(ROW_CREATED_FIELD)
        .and_then(Value::as_str)
        .and_then(parse_timestamp);
    if created_at.is_some() {
        fields.remove(ROW_CREATED_FIELD);
    }

    Ok(Entity {
        id,
        table,
        created_at,
        fields,
    })
}

// =============================================================================
// Helpers
// =============================================================================

fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// =============================================================================
// Tests
// =============================================================================
