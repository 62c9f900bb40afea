//! Club Ledger - data access for a chat-driven social club ledger
//!
//! Sessions, members, drinks and quotes live in a remote tabular service,
//! either a base-style one (Airtable) or a row-style one (Baserow). This
//! crate presents both through one [`Backend`] with an in-process listing
//! cache, and ships a thin Telegram front end on top.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  telegram (commands)                        │
//! ├─────────────────────────────────────────────┤
//! │  Backend facade        │ TableCache         │
//! ├─────────────────────────────────────────────┤
//! │  Provider: Airtable | Baserow               │
//! │  query · pagination · entity normalization  │
//! ├─────────────────────────────────────────────┤
//! │  Transport (reqwest)                        │
//! └─────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod entity;
pub mod error;
pub mod pagination;
pub mod providers;
pub mod query;
pub mod reference;
pub mod table;
pub mod telegram;
pub mod transport;

pub use backend::{Backend, Deleted, MemberQuery, Place, UserRef};
pub use cache::TableCache;
pub use config::{BackendConfig, ConfigError, ProviderKind};
pub use entity::{Entity, Fields};
pub use error::{BackendError, BackendResult, ErrorKind};
pub use providers::{AirtableProvider, BaserowProvider, Provider};
pub use query::{QuerySpec, SortDirection};
pub use reference::Reference;
pub use table::{resolve_name, Table};
pub use transport::{HttpTransport, Method, Request, Response, Transport};

// =============================================================================
// TigerStyle Constants
// =============================================================================

/// Application name
pub const APP_NAME: &str = "clubledger";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
