//! Backend - the data-access facade
//!
//! TigerStyle: One contract for every consumer, whichever provider is behind it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Backend                             │
//! │  table / tables / session / member / create / update / ...   │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │  TableCache (per instance)   │  Arc<dyn Provider>            │
//! │  cached listings + pending   │  query translation, paging,   │
//! │  fetches, write projections  │  normalization                │
//! └──────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! A listing without a query spec is cacheable: it is served from the cache
//! when allowed, and at most one fetch per table runs at a time. Listings
//! with a spec always go to the provider and never touch the cache.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use futures::future::{try_join_all, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::TableCache;
use crate::entity::{Entity, Fields};
use crate::error::{BackendError, BackendResult};
use crate::providers::Provider;
use crate::query::QuerySpec;
use crate::table::Table;

// =============================================================================
// TigerStyle Constants
// =============================================================================

/// Session returned when no index is given
pub const SESSION_INDEX_DEFAULT: &str = "-1";

/// Tables fetched by a reload with no explicit names
pub const RELOAD_TABLES: &[Table] = &[
    Table::Members,
    Table::Sessions,
    Table::Drinks,
    Table::DrinkTypes,
    Table::Quotes,
];

/// Member column holding the chat platform's user id
pub const MEMBER_EXTERNAL_ID_FIELD: &str = "TelegramId";

/// Member columns searched for a text lookup, in priority order
pub const MEMBER_IDENTITY_FIELDS: &[&str] = &["Username", "Name", "Nickname", "Email"];

/// Session column receiving a place identifier
pub const SESSION_PLACE_ID_FIELD: &str = "PlaceId";

/// Session column receiving a formatted address
pub const SESSION_ADDRESS_FIELD: &str = "Address";

// =============================================================================
// Types
// =============================================================================

/// A chat user as seen by the command layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// Platform user id
    pub id: i64,
    /// Platform handle, if set
    pub username: Option<String>,
    /// Display name
    pub display_name: String,
}

/// What to look a member up by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberQuery {
    /// Free text matched against identity fields
    Text(String),
    /// A chat user, matched by platform id first
    User(UserRef),
}

impl From<&str> for MemberQuery {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for MemberQuery {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<UserRef> for MemberQuery {
    fn from(user: UserRef) -> Self {
        Self::User(user)
    }
}

/// Result of a place lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Place {
    pub place_id: String,
    pub formatted_address: String,
}

/// Acknowledgement of a delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deleted {
    pub id: String,
}

// =============================================================================
// Backend
// =============================================================================

/// Data-access facade over one provider.
///
/// Clones share the provider and the cache.
#[derive(Clone)]
pub struct Backend {
    provider: Arc<dyn Provider>,
    cache: TableCache,
}

impl Backend {
    /// Create a backend with an empty cache.
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self::with_cache(provider, TableCache::new())
    }

    /// Create a backend around an existing cache.
    pub fn with_cache(provider: Arc<dyn Provider>, cache: TableCache) -> Self {
        Self { provider, cache }
    }

    /// Name of the provider behind this backend.
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// The listing cache.
    #[must_use]
    pub fn cache(&self) -> &TableCache {
        &self.cache
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// List a table.
    ///
    /// Without `spec` the listing is cacheable; `use_cache = false` forces a
    /// fetch (joining one already running). With `spec` the provider is
    /// always queried and the cache is left alone.
    pub async fn table(
        &self,
        name: &str,
        spec: Option<&QuerySpec>,
        use_cache: bool,
    ) -> BackendResult<Vec<Entity>> {
        let table = self.provider.resolve_table(name).await?;
        self.listing(table, spec, use_cache).await
    }

    async fn listing(
        &self,
        table: Table,
        spec: Option<&QuerySpec>,
        use_cache: bool,
    ) -> BackendResult<Vec<Entity>> {
        if let Some(spec) = spec {
            return self.provider.list(table, spec).await;
        }

        let provider = Arc::clone(&self.provider);
        self.cache
            .get_or_fetch(table, use_cache, move || {
                async move { provider.list(table, &QuerySpec::default()).await }.boxed()
            })
            .await
    }

    /// List several tables concurrently, in the order given.
    ///
    /// With no names the [`RELOAD_TABLES`] are listed; if the cache is also
    /// bypassed, the provider's directory state is rebuilt first.
    pub async fn tables(&self, use_cache: bool, names: &[&str]) -> BackendResult<Vec<Vec<Entity>>> {
        if names.is_empty() {
            if !use_cache {
                tracing::info!(provider = self.provider.name(), "reloading all tables");
                self.provider.refresh().await?;
            }
            let listings = RELOAD_TABLES
                .iter()
                .map(|&table| self.listing(table, None, use_cache));
            return try_join_all(listings).await;
        }

        let listings = names
            .iter()
            .map(|&name| async move { self.table(name, None, use_cache).await });
        try_join_all(listings).await
    }

    /// Session by position; negative positions count from the end.
    pub async fn session(&self, index: &str) -> BackendResult<Entity> {
        let position: i64 = index
            .trim()
            .parse()
            .map_err(|_| BackendError::Invalid(format!("session index '{index}'")))?;

        let sessions = self.listing(Table::Sessions, None, true).await?;
        let len = i64::try_from(sessions.len()).unwrap_or(i64::MAX);
        let wrapped = if position < 0 { position + len } else { position };

        usize::try_from(wrapped)
            .ok()
            .and_then(|i| sessions.into_iter().nth(i))
            .ok_or_else(|| BackendError::not_found("session", index))
    }

    /// Look up exactly one member.
    pub async fn member(&self, query: impl Into<MemberQuery>) -> BackendResult<Entity> {
        let members = self.listing(Table::Members, None, true).await?;

        let text = match query.into() {
            MemberQuery::Text(text) => text,
            MemberQuery::User(user) => {
                let external_id = user.id.to_string();
                if let Some(member) = members
                    .iter()
                    .find(|m| m.text(MEMBER_EXTERNAL_ID_FIELD).as_deref() == Some(external_id.as_str()))
                {
                    return Ok(member.clone());
                }
                tracing::debug!(user_id = user.id, "no member linked to user, searching by name");
                user.username.unwrap_or(user.display_name)
            }
        };

        find_member(&members, &text)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Create a record.
    pub async fn create(&self, table: &str, data: Fields) -> BackendResult<Entity> {
        let table = self.provider.resolve_table(table).await?;
        let result = self.provider.create(table, &data).await;
        let entity = result
            .map_err(|e| BackendError::mutation("create", table.as_str(), Value::Object(data), e))?;

        self.cache.project_create(&entity);
        tracing::info!(table = %table, id = %entity.id, "created record");
        Ok(entity)
    }

    /// Update a record's fields.
    pub async fn update(&self, table: &str, id: &str, data: Fields) -> BackendResult<Entity> {
        let table = self.provider.resolve_table(table).await?;
        self.update_in(table, id, data).await
    }

    async fn update_in(&self, table: Table, id: &str, data: Fields) -> BackendResult<Entity> {
        ensure_record_id(id)?;

        let result = self.provider.update(table, id, &data).await;
        let entity = result
            .map_err(|e| BackendError::mutation("update", table.as_str(), Value::Object(data), e))?;

        self.cache.project_update(&entity);
        tracing::info!(table = %table, id = %entity.id, "updated record");
        Ok(entity)
    }

    /// Delete a record.
    pub async fn delete(&self, table: &str, id: &str) -> BackendResult<Deleted> {
        let table = self.provider.resolve_table(table).await?;
        self.delete_in(table, id).await
    }

    async fn delete_in(&self, table: Table, id: &str) -> BackendResult<Deleted> {
        ensure_record_id(id)?;

        self.provider.delete(table, id).await.map_err(|e| {
            BackendError::mutation("delete", table.as_str(), serde_json::json!({ "id": id }), e)
        })?;

        self.cache.project_delete(table, id);
        tracing::info!(table = %table, id, "deleted record");
        Ok(Deleted { id: id.to_string() })
    }

    /// Write an entity's fields back to its own table and id.
    pub async fn update_record(&self, entity: &Entity) -> BackendResult<Entity> {
        self.update_in(entity.table, &entity.id, entity.fields.clone())
            .await
    }

    /// Delete an entity from its own table.
    pub async fn delete_record(&self, entity: &Entity) -> BackendResult<Deleted> {
        self.delete_in(entity.table, &entity.id).await
    }

    // =========================================================================
    // Formatting helpers
    // =========================================================================

    /// Timestamp formatted for write-back.
    #[must_use]
    pub fn time(&self, value: DateTime<Utc>, with_seconds: bool) -> String {
        self.provider.format_time(value, with_seconds)
    }

    /// Date formatted for write-back.
    #[must_use]
    pub fn date(&self, value: NaiveDate) -> String {
        self.provider.format_date(value)
    }

    /// Copy a place lookup into a session draft. `None` leaves it untouched.
    #[must_use]
    pub fn place_to_session(&self, place: Option<&Place>, mut draft: Fields) -> Fields {
        if let Some(place) = place {
            draft.insert(
                SESSION_PLACE_ID_FIELD.to_string(),
                Value::String(place.place_id.clone()),
            );
            draft.insert(
                SESSION_ADDRESS_FIELD.to_string(),
                Value::String(place.formatted_address.clone()),
            );
        }
        draft
    }
}

fn ensure_record_id(id: &str) -> BackendResult<()> {
    if id.trim().is_empty() {
        return Err(BackendError::Invalid("empty record id".to_string()));
    }
    Ok(())
}

// =============================================================================
// Member matching
// =============================================================================

/// Find the single member matching `query`.
///
/// Identity fields are tried in [`MEMBER_IDENTITY_FIELDS`] order with a
/// case-insensitive substring match; the first field with exactly one hit
/// wins and a field with several hits is ambiguous.
pub fn find_member(members: &[Entity], query: &str) -> BackendResult<Entity> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Err(BackendError::Invalid("empty member query".to_string()));
    }

    for field in MEMBER_IDENTITY_FIELDS {
        let matches: Vec<&Entity> = members
            .iter()
            .filter(|m| {
                m.text(field)
                    .is_some_and(|value| value.to_lowercase().contains(&needle))
            })
            .collect();

        match matches.as_slice() {
            [] => continue,
            [only] => return Ok((*only).clone()),
            many => {
                return Err(BackendError::Ambiguous {
                    what: "member",
                    query: query.to_string(),
                    matches: many.iter().map(|m| m.label()).collect(),
                })
            }
        }
    }

    Err(BackendError::not_found("member", query))
}

// =============================================================================
// Tests
// =============================================================================
