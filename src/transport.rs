//! Transport - request/response boundary to a data service
//!
//! Providers build [`Request`]s with a path relative to the service root and
//! hand them to a [`Transport`]. [`HttpTransport`] sends them with reqwest;
//! tests substitute in-memory emulators.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::error::{BackendError, BackendResult};

// =============================================================================
// TigerStyle Constants
// =============================================================================

/// Default HTTP timeout
pub const HTTP_TIMEOUT_SECS_DEFAULT: u64 = 30;

/// Non-JSON bodies below this status count as an empty success
pub const EMPTY_SUCCESS_STATUS_MAX: u16 = 400;

/// Maximum response body echoed into an error
pub const ERROR_BODY_BYTES_MAX: usize = 2_000;

// =============================================================================
// Types
// =============================================================================

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    /// Upper-case method name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

/// A request relative to the service root.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    /// Path plus query string, starting with `/`
    pub path: String,
    pub body: Option<Value>,
}

impl Request {
    /// GET request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    /// Request with a JSON body.
    #[must_use]
    pub fn with_body(method: Method, path: impl Into<String>, body: Value) -> Self {
        Self {
            method,
            path: path.into(),
            body: Some(body),
        }
    }

    /// DELETE request.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            path: path.into(),
            body: None,
        }
    }
}

/// Raw response: status plus body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    /// Response with a JSON body.
    #[must_use]
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    /// Decode the body, applying the status rules.
    ///
    /// - JSON with a success status → the value
    /// - JSON with a failure status → [`BackendError::Status`]
    /// - non-JSON below [`EMPTY_SUCCESS_STATUS_MAX`] → `Value::Null`
    /// - non-JSON otherwise → [`BackendError::Status`] with the raw body
    pub fn decode(self) -> BackendResult<Value> {
        let success = (200..300).contains(&self.status);
        match serde_json::from_str::<Value>(&self.body) {
            Ok(value) if success => Ok(value),
            Ok(_) => Err(self.into_error()),
            Err(_) if self.status < EMPTY_SUCCESS_STATUS_MAX => Ok(Value::Null),
            Err(_) => Err(self.into_error()),
        }
    }

    fn into_error(self) -> BackendError {
        let mut body = self.body;
        if body.len() > ERROR_BODY_BYTES_MAX {
            let mut end = ERROR_BODY_BYTES_MAX;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            body.truncate(end);
        }
        BackendError::Status {
            status: self.status,
            body,
        }
    }
}

/// Sends requests to one data service.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and return the raw response.
    ///
    /// Only failures to get any response at all are errors here; status
    /// handling belongs to [`Response::decode`].
    async fn send(&self, request: Request) -> BackendResult<Response>;

    /// Path the service root is mounted under, without a trailing slash.
    ///
    /// Empty when the service sits at the host root.
    fn root_path(&self) -> &str {
        ""
    }

    /// Send and decode in one step.
    async fn call(&self, request: Request) -> BackendResult<Value> {
        self.send(request).await?.decode()
    }
}

// =============================================================================
// HTTP Transport
// =============================================================================

/// reqwest-backed transport with a fixed authorization header.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    /// Path component of `base_url`
    root_path: String,
    authorization: String,
}

impl HttpTransport {
    /// Create a transport rooted at `base_url`.
    ///
    /// `authorization` is sent verbatim as the `Authorization` header.
    pub fn new(
        base_url: &str,
        authorization: String,
        timeout: Duration,
    ) -> BackendResult<Self> {
        // Preconditions
        assert!(!base_url.is_empty(), "base_url cannot be empty");

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::connection(format!("failed to create HTTP client: {e}")))?;

        let base_url = base_url.trim_end_matches('/').to_string();
        let root_path = Url::parse(&base_url)
            .map(|url| url.path().trim_end_matches('/').to_string())
            .map_err(|e| BackendError::connection(format!("invalid base URL {base_url}: {e}")))?;

        Ok(Self {
            client,
            base_url,
            root_path,
            authorization,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn root_path(&self) -> &str {
        &self.root_path
    }

    async fn send(&self, request: Request) -> BackendResult<Response> {
        assert!(request.path.starts_with('/'), "request path must be absolute");

        let url = format!("{}{}", self.base_url, request.path);
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };

        tracing::debug!(method = request.method.as_str(), url = %url, "sending request");

        let mut builder = self
            .client
            .request(method, &url)
            .header(reqwest::header::AUTHORIZATION, &self.authorization);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| BackendError::connection(format!("request to {url} failed: {e}")))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::connection(format!("failed to read body from {url}: {e}")))?;

        if status >= EMPTY_SUCCESS_STATUS_MAX {
            tracing::warn!(status, url = %url, "request failed");
        }

        Ok(Response { status, body })
    }
}

// =============================================================================
// Tests
// =============================================================================
