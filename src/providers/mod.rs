//! Providers - Data Service Trait and Implementations
//!
//! TigerStyle: One interface, two structurally different services.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Provider Trait                         │
//! └─────────────────────────────────────────────────────────────┘
//!          ↑                              ↑
//!          │                              │
//! ┌────────┴────────┐           ┌────────┴────────┐
//! │ AirtableProvider│           │ BaserowProvider │
//! │  (base-style)   │           │  (row-style)    │
//! └─────────────────┘           └─────────────────┘
//! ```
//!
//! Providers only speak their service's dialect. Caching, lookups and error
//! wrapping for writes live in [`crate::backend::Backend`], shared by both.

mod airtable;
mod baserow;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::entity::{Entity, Fields};
use crate::error::BackendResult;
use crate::query::QuerySpec;
use crate::table::Table;

pub use airtable::AirtableProvider;
pub use baserow::BaserowProvider;

/// A remote tabular data service.
///
/// All operations are async and return normalized entities.
#[async_trait]
pub trait Provider: Send + Sync + 'static {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Turn a caller-supplied table reference into a known table.
    ///
    /// Providers differ in when an unknown name is rejected: before any I/O,
    /// or once the service's table directory has been consulted.
    async fn resolve_table(&self, name: &str) -> BackendResult<Table>;

    /// List a table, following pages until exhaustion or `spec.max_rows`.
    async fn list(&self, table: Table, spec: &QuerySpec) -> BackendResult<Vec<Entity>>;

    /// Create a record.
    async fn create(&self, table: Table, fields: &Fields) -> BackendResult<Entity>;

    /// Update a record's fields.
    async fn update(&self, table: Table, id: &str, fields: &Fields) -> BackendResult<Entity>;

    /// Delete a record.
    async fn delete(&self, table: Table, id: &str) -> BackendResult<()>;

    /// Drop and rebuild any directory state (table ids) before a full reload.
    async fn refresh(&self) -> BackendResult<()> {
        Ok(())
    }

    /// Timestamp in the form the service expects on write.
    fn format_time(&self, value: DateTime<Utc>, with_seconds: bool) -> String;

    /// Date in the form the service expects on write.
    fn format_date(&self, value: NaiveDate) -> String {
        value.format("%Y-%m-%d").to_string()
    }
}
