//! BaserowProvider - row-style service
//!
//! Tables are addressed by numeric id, resolved once from the service's
//! table directory. Listings return `{ count, next, results }` pages where
//! `next` is an absolute URL.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;

use super::Provider;
use crate::entity::{entity_from_row, Entity, Fields};
use crate::error::{BackendError, BackendResult};
use crate::pagination::{collect_pages, relative_locator, Page, PageSource};
use crate::query::{encode_params, row_params, QuerySpec};
use crate::table::{resolve_name, Table};
use crate::transport::{Method, Request, Transport};

// =============================================================================
// TigerStyle Constants
// =============================================================================

/// Table directory endpoint
pub const TABLE_DIRECTORY_PATH: &str = "/api/database/tables/all-tables/";

/// Query string appended to row writes so fields use their display names
const USER_FIELD_NAMES: &str = "user_field_names=true";

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct TableInfo {
    id: u64,
    name: String,
    #[serde(default)]
    database_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RowPage {
    count: Option<usize>,
    next: Option<String>,
    results: Vec<Value>,
}

/// Table name (lower-case) to numeric id
type TableIds = HashMap<String, u64>;

/// Provider for a row-style service.
pub struct BaserowProvider {
    transport: Arc<dyn Transport>,
    /// Restrict the table directory to one database
    database_id: Option<u64>,
    /// Loaded on first use, rebuilt by [`Provider::refresh`]
    table_ids: Mutex<Option<TableIds>>,
}

impl BaserowProvider {
    /// Create a provider; the table directory is loaded lazily.
    pub fn new(transport: Arc<dyn Transport>, database_id: Option<u64>) -> Self {
        Self {
            transport,
            database_id,
            table_ids: Mutex::new(None),
        }
    }

    async fn load_table_ids(&self) -> BackendResult<TableIds> {
        let body = self.transport.call(Request::get(TABLE_DIRECTORY_PATH)).await?;
        let tables: Vec<TableInfo> = serde_json::from_value(body)?;

        let ids: TableIds = tables
            .into_iter()
            .filter(|t| match (self.database_id, t.database_id) {
                (Some(wanted), Some(actual)) => wanted == actual,
                _ => true,
            })
            .map(|t| (t.name.to_lowercase(), t.id))
            .collect();

        tracing::info!(tables = ids.len(), database = ?self.database_id, "loaded table directory");
        Ok(ids)
    }

    /// Numeric id for a canonical table name, loading the directory if needed.
    async fn table_id(&self, canonical: &str) -> BackendResult<u64> {
        let mut guard = self.table_ids.lock().await;
        if guard.is_none() {
            *guard = Some(self.load_table_ids().await?);
        }
        guard
            .as_ref()
            .and_then(|ids| ids.get(&canonical.to_lowercase()).copied())
            .ok_or_else(|| BackendError::not_found("table", canonical))
    }

    fn rows_path(table_id: u64) -> String {
        format!("/api/database/rows/table/{table_id}/")
    }

    fn row_path(table_id: u64, row_id: &str) -> String {
        format!("/api/database/rows/table/{table_id}/{row_id}/?{USER_FIELD_NAMES}")
    }
}

// =============================================================================
// Pages
// =============================================================================

struct BaserowPages<'a> {
    transport: &'a dyn Transport,
    first: String,
}

#[async_trait]
impl PageSource for BaserowPages<'_> {
    async fn fetch_page(&self, locator: Option<&str>) -> BackendResult<Page> {
        let path = locator.map_or_else(
            || self.first.clone(),
            |next| relative_locator(next, self.transport.root_path()),
        );
        let body = self.transport.call(Request::get(path)).await?;
        let page: RowPage = serde_json::from_value(body)?;

        Ok(Page {
            rows: page.results,
            total: page.count,
            next: page.next,
        })
    }
}

// =============================================================================
// Provider Implementation
// =============================================================================

#[async_trait]
impl Provider for BaserowProvider {
    fn name(&self) -> &'static str {
        "baserow"
    }

    async fn resolve_table(&self, name: &str) -> BackendResult<Table> {
        let canonical = resolve_name(name);
        self.table_id(&canonical).await?;
        Table::from_canonical(&canonical).ok_or(BackendError::UnknownTable(canonical))
    }

    async fn list(&self, table: Table, spec: &QuerySpec) -> BackendResult<Vec<Entity>> {
        let params = row_params(spec)?;
        let table_id = self.table_id(table.as_str()).await?;
        let pages = BaserowPages {
            transport: self.transport.as_ref(),
            first: format!("{}?{}", Self::rows_path(table_id), encode_params(&params)),
        };
        let rows = collect_pages(&pages, spec.max_rows).await?;

        let entities = rows
            .into_iter()
            .map(|raw| entity_from_row(table, raw))
            .collect::<BackendResult<Vec<_>>>()?;

        tracing::debug!(table = %table, table_id, rows = entities.len(), "listed row table");
        Ok(entities)
    }

    async fn create(&self, table: Table, fields: &Fields) -> BackendResult<Entity> {
        let table_id = self.table_id(table.as_str()).await?;
        let path = format!("{}?{USER_FIELD_NAMES}", Self::rows_path(table_id));
        let raw = self
            .transport
            .call(Request::with_body(
                Method::Post,
                path,
                Value::Object(fields.clone()),
            ))
            .await?;
        entity_from_row(table, raw)
    }

    async fn update(&self, table: Table, id: &str, fields: &Fields) -> BackendResult<Entity> {
        let table_id = self.table_id(table.as_str()).await?;
        let raw = self
            .transport
            .call(Request::with_body(
                Method::Patch,
                Self::row_path(table_id, id),
                Value::Object(fields.clone()),
            ))
            .await?;
        entity_from_row(table, raw)
    }

    async fn delete(&self, table: Table, id: &str) -> BackendResult<()> {
        let table_id = self.table_id(table.as_str()).await?;
        self.transport
            .call(Request::delete(Self::row_path(table_id, id)))
            .await?;
        Ok(())
    }

    async fn refresh(&self) -> BackendResult<()> {
        let ids = self.load_table_ids().await?;
        *self.table_ids.lock().await = Some(ids);
        Ok(())
    }

    fn format_time(&self, value: DateTime<Utc>, with_seconds: bool) -> String {
        if with_seconds {
            value.format("%Y-%m-%d %H:%M:%S").to_string()
        } else {
            value.format("%Y-%m-%d %H:%M").to_string()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
