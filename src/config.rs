//! Configuration
//!
//! TigerStyle: Everything comes from the environment (optionally a `.env`
//! file loaded by the binary), validated once at startup.

use std::sync::Arc;
use std::time::Duration;

use crate::backend::Backend;
use crate::error::BackendError;
use crate::providers::{AirtableProvider, BaserowProvider, Provider};
use crate::transport::{HttpTransport, HTTP_TIMEOUT_SECS_DEFAULT};

// =============================================================================
// TigerStyle Constants
// =============================================================================

/// Default base-style API root
pub const AIRTABLE_ENDPOINT_DEFAULT: &str = "https://api.airtable.com";

/// Default row-style API root
pub const BASEROW_URL_DEFAULT: &str = "https://api.baserow.io";

// =============================================================================
// Types
// =============================================================================

/// Which service holds the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ProviderKind {
    Airtable,
    Baserow,
}

impl std::str::FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "airtable" => Ok(Self::Airtable),
            "baserow" => Ok(Self::Baserow),
            other => Err(ConfigError::Invalid {
                var: "CLUB_PROVIDER",
                value: other.to_string(),
            }),
        }
    }
}

/// Connection settings for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    Airtable {
        api_key: String,
        base_id: String,
        endpoint: String,
        timeout: Duration,
    },
    Baserow {
        url: String,
        token: String,
        database_id: Option<u64>,
        timeout: Duration,
    },
}

impl BackendConfig {
    /// Read settings from the process environment.
    ///
    /// `provider` overrides `CLUB_PROVIDER` when given.
    pub fn from_env(provider: Option<ProviderKind>) -> Result<Self, ConfigError> {
        Self::from_lookup(provider, |var| std::env::var(var).ok())
    }

    /// Read settings through `lookup`, treating blank values as unset.
    pub fn from_lookup<F>(provider: Option<ProviderKind>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let require = |var: &'static str| get(var).ok_or(ConfigError::Missing(var));

        let provider = match provider {
            Some(kind) => kind,
            None => require("CLUB_PROVIDER")?.parse()?,
        };

        let timeout_secs = match get("CLUB_HTTP_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                var: "CLUB_HTTP_TIMEOUT_SECS",
                value: raw,
            })?,
            None => HTTP_TIMEOUT_SECS_DEFAULT,
        };
        let timeout = Duration::from_secs(timeout_secs);

        Ok(match provider {
            ProviderKind::Airtable => Self::Airtable {
                api_key: require("AIRTABLE_API_KEY")?,
                base_id: require("AIRTABLE_BASE_ID")?,
                endpoint: get("AIRTABLE_ENDPOINT")
                    .unwrap_or_else(|| AIRTABLE_ENDPOINT_DEFAULT.to_string()),
                timeout,
            },
            ProviderKind::Baserow => Self::Baserow {
                url: get("BASEROW_URL").unwrap_or_else(|| BASEROW_URL_DEFAULT.to_string()),
                token: require("BASEROW_TOKEN")?,
                database_id: match get("BASEROW_DATABASE_ID") {
                    Some(raw) => Some(raw.trim().parse().map_err(|_| ConfigError::Invalid {
                        var: "BASEROW_DATABASE_ID",
                        value: raw,
                    })?),
                    None => None,
                },
                timeout,
            },
        })
    }

    /// Provider kind these settings are for.
    #[must_use]
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Airtable { .. } => ProviderKind::Airtable,
            Self::Baserow { .. } => ProviderKind::Baserow,
        }
    }

    /// Build the provider over an HTTP transport.
    pub fn provider(&self) -> Result<Arc<dyn Provider>, BackendError> {
        Ok(match self {
            Self::Airtable {
                api_key,
                base_id,
                endpoint,
                timeout,
            } => {
                let transport =
                    HttpTransport::new(endpoint, format!("Bearer {api_key}"), *timeout)?;
                Arc::new(AirtableProvider::new(Arc::new(transport), base_id.clone()))
            }
            Self::Baserow {
                url,
                token,
                database_id,
                timeout,
            } => {
                let transport = HttpTransport::new(url, format!("Token {token}"), *timeout)?;
                Arc::new(BaserowProvider::new(Arc::new(transport), *database_id))
            }
        })
    }

    /// Build a backend with a fresh cache.
    pub fn backend(&self) -> Result<Backend, BackendError> {
        Ok(Backend::new(self.provider()?))
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

// =============================================================================
// Tests
// =============================================================================
