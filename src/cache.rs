//! Table Cache - per-backend listing cache with fetch coalescing
//!
//! TigerStyle: Explicit state owned by one backend instance.
//!
//! Holds the last completed whole-table listing per table, plus the fetch
//! currently running for each table. Callers asking for a table while its
//! fetch is running join that fetch instead of starting another one.
//!
//! Fetches run on their own task, so a fetch completes and populates the
//! cache even if every caller that asked for it has gone away.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::entity::Entity;
use crate::error::{BackendError, BackendResult};
use crate::table::Table;

/// Outcome of one whole-table fetch
pub type FetchOutcome = BackendResult<Vec<Entity>>;

type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

// =============================================================================
// State
// =============================================================================

#[derive(Default)]
struct CacheState {
    /// Last completed listing per table
    tables: HashMap<Table, Vec<Entity>>,
    /// Fetch in flight per table
    pending: HashMap<Table, SharedFetch>,
}

/// Listing cache shared by clones of one backend.
#[derive(Clone, Default)]
pub struct TableCache {
    state: Arc<Mutex<CacheState>>,
}

impl TableCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached listing for a table, if any.
    #[must_use]
    pub fn cached(&self, table: Table) -> Option<Vec<Entity>> {
        self.lock().tables.get(&table).cloned()
    }

    /// Whether a fetch for this table is running.
    #[must_use]
    pub fn is_pending(&self, table: Table) -> bool {
        self.lock().pending.contains_key(&table)
    }

    /// Return the cached listing or run (or join) the fetch for it.
    ///
    /// With `use_cache` set, a cached listing is returned without I/O.
    /// Otherwise, or on a miss, the running fetch for `table` is joined, or
    /// `fetch` is started when nothing is running. Success replaces the
    /// cached listing; failure leaves the cache as it was.
    pub async fn get_or_fetch<F>(&self, table: Table, use_cache: bool, fetch: F) -> FetchOutcome
    where
        F: FnOnce() -> BoxFuture<'static, FetchOutcome>,
    {
        let shared = {
            let mut state = self.lock();

            if use_cache {
                if let Some(rows) = state.tables.get(&table) {
                    tracing::trace!(table = %table, rows = rows.len(), "cache hit");
                    return Ok(rows.clone());
                }
            }

            if let Some(pending) = state.pending.get(&table) {
                tracing::debug!(table = %table, "joining pending fetch");
                pending.clone()
            } else {
                tracing::debug!(table = %table, "starting fetch");
                let shared = self.spawn_fetch(table, fetch());
                state.pending.insert(table, shared.clone());
                shared
            }
        };

        shared.await
    }

    /// Run `fetch` on its own task, settling the cache when it completes.
    fn spawn_fetch(&self, table: Table, fetch: BoxFuture<'static, FetchOutcome>) -> SharedFetch {
        let cache = self.clone();
        let handle = tokio::spawn(async move {
            let outcome = fetch.await;

            let mut state = cache.lock();
            state.pending.remove(&table);
            match &outcome {
                Ok(rows) => {
                    tracing::debug!(table = %table, rows = rows.len(), "cached listing");
                    state.tables.insert(table, rows.clone());
                }
                Err(e) => {
                    tracing::warn!(table = %table, error = %e, "fetch failed, nothing cached");
                }
            }
            outcome
        });

        async move {
            handle.await.unwrap_or_else(|e| {
                Err(BackendError::connection(format!("fetch task failed: {e}")))
            })
        }
        .boxed()
        .shared()
    }

    // =========================================================================
    // Write projections
    // =========================================================================

    /// Append a created record to its table's cached listing, if cached.
    pub fn project_create(&self, entity: &Entity) {
        if let Some(rows) = self.lock().tables.get_mut(&entity.table) {
            rows.push(entity.clone());
        }
    }

    /// Replace a record in its table's cached listing, if present.
    pub fn project_update(&self, entity: &Entity) {
        if let Some(rows) = self.lock().tables.get_mut(&entity.table) {
            if let Some(slot) = rows.iter_mut().find(|r| r.id == entity.id) {
                *slot = entity.clone();
            }
        }
    }

    /// Remove a record from its table's cached listing, if present.
    pub fn project_delete(&self, table: Table, id: &str) {
        if let Some(rows) = self.lock().tables.get_mut(&table) {
            rows.retain(|r| r.id != id);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
