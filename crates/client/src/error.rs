//! Error types for the client.
//!
//! The taxonomy distinguishes three classes the transport treats
//! differently:
//!
//! - transient failures (network errors, 5xx, rate limiting) are retried
//!   with backoff and only surfaced after retries are exhausted
//! - authentication expiry is resolved internally via refresh + replay and
//!   surfaced only when the refresh itself fails
//! - semantic errors (`FORBIDDEN`, `BAD_USER_INPUT`) are surfaced
//!   immediately, never retried

use thiserror::Error;

/// GraphQL error codes that must never be retried.
///
/// These indicate a semantic problem with the request itself; reissuing the
/// identical operation cannot succeed.
pub const NON_RETRYABLE_CODES: &[&str] = &["FORBIDDEN", "UNAUTHENTICATED", "BAD_USER_INPUT"];

/// The `extensions.code` value signalling an expired access token.
pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";

/// Errors that can occur when talking to the Clementine API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed before a response was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("server error (HTTP {status}): {body}")]
    Server { status: u16, body: String },

    /// Rate limited by the API.
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// GraphQL query returned errors.
    #[error("GraphQL errors: {}", format_graphql_errors(.0))]
    GraphQL(Vec<GraphQLError>),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// No valid credentials; the session was ended after a failed refresh.
    #[error("unauthenticated: credentials expired and refresh failed")]
    Unauthenticated,

    /// A mutation response could not be folded into the cache.
    #[error("cache write error: {0}")]
    Cache(#[from] crate::cache::CacheError),
}

impl ClientError {
    /// Whether the failure is transient and the operation may be reissued.
    ///
    /// Network-level failures, 5xx responses, and rate limiting are
    /// retryable. GraphQL errors are retryable unless any of them carries a
    /// code from [`NON_RETRYABLE_CODES`].
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::RateLimited(_) => true,
            Self::Server { status, .. } => *status >= 500,
            Self::GraphQL(errors) => !errors.iter().any(|e| {
                e.code
                    .as_deref()
                    .is_some_and(|code| NON_RETRYABLE_CODES.contains(&code))
            }),
            _ => false,
        }
    }

    /// Whether the failure signals an expired access token.
    #[must_use]
    pub fn is_auth_expired(&self) -> bool {
        match self {
            Self::GraphQL(errors) => errors
                .iter()
                .any(|e| e.code.as_deref() == Some(UNAUTHENTICATED)),
            Self::Server { status, .. } => *status == 401,
            _ => false,
        }
    }
}

/// A GraphQL error returned by the API.
#[derive(Debug, Clone)]
pub struct GraphQLError {
    /// Error message.
    pub message: String,
    /// Machine-readable code from `extensions.code`, when present.
    pub code: Option<String>,
    /// Path to the error in the response.
    pub path: Vec<serde_json::Value>,
}

impl GraphQLError {
    /// Build from the raw error object in a GraphQL response.
    #[must_use]
    pub fn from_value(value: &serde_json::Value) -> Self {
        Self {
            message: value
                .get("message")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            code: value
                .pointer("/extensions/code")
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned),
            path: value
                .get("path")
                .and_then(serde_json::Value::as_array)
                .cloned()
                .unwrap_or_default(),
        }
    }
}

fn format_graphql_errors(errors: &[GraphQLError]) -> String {
    if errors.is_empty() {
        return "(no error details provided)".to_owned();
    }

    errors
        .iter()
        .map(|e| {
            let mut parts = Vec::new();
            if !e.message.is_empty() {
                parts.push(e.message.clone());
            }
            if let Some(code) = &e.code {
                parts.push(format!("[{code}]"));
            }
            if !e.path.is_empty() {
                let path_str = e
                    .path
                    .iter()
                    .map(|p| match p {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(".");
                parts.push(format!("path: {path_str}"));
            }
            if parts.is_empty() {
                "(no details)".to_owned()
            } else {
                parts.join(" ")
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}
