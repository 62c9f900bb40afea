//! Backend Errors
//!
//! TigerStyle: One error enum for the data-access layer, classified by kind.
//!
//! Errors are `Clone` because a coalesced table fetch hands the same outcome
//! to every caller that joined it.

use serde_json::Value;

/// Result alias used throughout the data-access layer
pub type BackendResult<T> = Result<T, BackendError>;

// =============================================================================
// Classification
// =============================================================================

/// Broad category of a backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller supplied something unusable (table name, filter, index)
    Validation,
    /// Nothing matched the lookup
    NotFound,
    /// More than one record matched a lookup that needs exactly one
    Ambiguity,
    /// The remote service failed or answered with something unusable
    Transport,
    /// A create/update/delete request failed
    Mutation,
}

// =============================================================================
// Errors
// =============================================================================

/// Data-access errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("unsupported filter expression: {0}")]
    InvalidFilter(String),

    #[error("invalid argument: {0}")]
    Invalid(String),

    #[error("{what} not found: {key}")]
    NotFound { what: &'static str, key: String },

    #[error("{what} '{query}' is ambiguous, matches: {}", matches.join(", "))]
    Ambiguous {
        what: &'static str,
        query: String,
        matches: Vec<String>,
    },

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("failed to {action} {table} record: {source}")]
    Mutation {
        action: &'static str,
        table: String,
        /// Payload that was sent, kept for diagnostics
        payload: Value,
        #[source]
        source: Box<BackendError>,
    },
}

impl BackendError {
    /// Create a not-found error.
    pub fn not_found(what: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            key: key.into(),
        }
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Wrap a failed write, attaching the payload that was attempted.
    pub fn mutation(
        action: &'static str,
        table: impl Into<String>,
        payload: Value,
        source: BackendError,
    ) -> Self {
        Self::Mutation {
            action,
            table: table.into(),
            payload,
            source: Box::new(source),
        }
    }

    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownTable(_) | Self::InvalidFilter(_) | Self::Invalid(_) => {
                ErrorKind::Validation
            }
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Ambiguous { .. } => ErrorKind::Ambiguity,
            Self::Status { .. } | Self::Connection(_) | Self::Decode(_) => ErrorKind::Transport,
            Self::Mutation { .. } => ErrorKind::Mutation,
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

// =============================================================================
// Tests
// =============================================================================
