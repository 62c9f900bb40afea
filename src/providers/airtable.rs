//! AirtableProvider - base-style service
//!
//! Records arrive as `{ id, createdTime, fields }`, tables are addressed by
//! name, and listings page with an opaque `offset` token.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use serde_json::{json, Value};

use super::Provider;
use crate::entity::{normalize_base_record, Entity, Fields};
use crate::error::{BackendError, BackendResult};
use crate::pagination::{collect_pages, Page, PageSource};
use crate::query::{base_params, encode_params, QuerySpec};
use crate::table::Table;
use crate::transport::{Method, Request, Transport};

/// Provider for a base-style service.
pub struct AirtableProvider {
    transport: Arc<dyn Transport>,
    base_id: String,
}

impl AirtableProvider {
    /// Create a provider for one base.
    pub fn new(transport: Arc<dyn Transport>, base_id: impl Into<String>) -> Self {
        let base_id = base_id.into();
        assert!(!base_id.is_empty(), "base_id cannot be empty");
        Self { transport, base_id }
    }

    fn table_path(&self, table: Table) -> String {
        format!("/v0/{}/{}", self.base_id, table)
    }

    fn record_path(&self, table: Table, id: &str) -> String {
        format!("{}/{}", self.table_path(table), id)
    }

    fn to_entity(table: Table, raw: &Value) -> BackendResult<Entity> {
        normalize_base_record(table, raw)
            .ok_or_else(|| BackendError::decode(format!("{table} response is not a record")))
    }
}

// =============================================================================
// Pages
// =============================================================================

struct AirtablePages<'a> {
    transport: &'a dyn Transport,
    path: String,
    params: Vec<(String, String)>,
}

#[async_trait]
impl PageSource for AirtablePages<'_> {
    async fn fetch_page(&self, locator: Option<&str>) -> BackendResult<Page> {
        let mut params = self.params.clone();
        if let Some(offset) = locator {
            params.push(("offset".to_string(), offset.to_string()));
        }
        let path = format!("{}?{}", self.path, encode_params(&params));

        let body = self.transport.call(Request::get(path)).await?;
        let rows = match body.get("records") {
            Some(Value::Array(records)) => records.clone(),
            _ => return Err(BackendError::decode("listing has no records array")),
        };
        let next = body
            .get("offset")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Page {
            rows,
            total: None,
            next,
        })
    }
}

// =============================================================================
// Provider Implementation
// =============================================================================

#[async_trait]
impl Provider for AirtableProvider {
    fn name(&self) -> &'static str {
        "airtable"
    }

    async fn resolve_table(&self, name: &str) -> BackendResult<Table> {
        Table::parse(name).ok_or_else(|| BackendError::UnknownTable(name.to_string()))
    }

    async fn list(&self, table: Table, spec: &QuerySpec) -> BackendResult<Vec<Entity>> {
        let pages = AirtablePages {
            transport: self.transport.as_ref(),
            path: self.table_path(table),
            params: base_params(spec)?,
        };
        let rows = collect_pages(&pages, spec.max_rows).await?;

        let mut entities = rows
            .iter()
            .map(|raw| Self::to_entity(table, raw))
            .collect::<BackendResult<Vec<_>>>()?;

        // The service has no exclusion parameter.
        if let Some(exclude) = &spec.exclude {
            for entity in &mut entities {
                for field in exclude {
                    entity.fields.remove(field);
                }
            }
        }

        tracing::debug!(table = %table, rows = entities.len(), "listed base table");
        Ok(entities)
    }

    async fn create(&self, table: Table, fields: &Fields) -> BackendResult<Entity> {
        let body = json!({ "fields": fields, "typecast": true });
        let raw = self
            .transport
            .call(Request::with_body(Method::Post, self.table_path(table), body))
            .await?;
        Self::to_entity(table, &raw)
    }

    async fn update(&self, table: Table, id: &str, fields: &Fields) -> BackendResult<Entity> {
        let body = json!({ "fields": fields, "typecast": true });
        let raw = self
            .transport
            .call(Request::with_body(
                Method::Patch,
                self.record_path(table, id),
                body,
            ))
            .await?;
        Self::to_entity(table, &raw)
    }

    async fn delete(&self, table: Table, id: &str) -> BackendResult<()> {
        self.transport
            .call(Request::delete(self.record_path(table, id)))
            .await?;
        Ok(())
    }

    fn format_time(&self, value: DateTime<Utc>, with_seconds: bool) -> String {
        let value = value.with_nanosecond(0).unwrap_or(value);
        let value = if with_seconds {
            value
        } else {
            value.with_second(0).unwrap_or(value)
        };
        value.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

// =============================================================================
// Tests
// =============================================================================
