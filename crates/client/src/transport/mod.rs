//! The authenticated GraphQL request pipeline.
//!
//! Every operation flows through the same fixed chain:
//!
//! 1. **Retry stage** - transient failures (network errors, 5xx, rate
//!    limiting, uncoded GraphQL errors) are reissued up to the configured
//!    attempt budget with exponential backoff and jitter. Semantic codes
//!    (`FORBIDDEN`, `UNAUTHENTICATED`, `BAD_USER_INPUT`) are never retried.
//! 2. **Error interception stage** - an `UNAUTHENTICATED` response triggers
//!    a credential refresh and replays the operation exactly once with the
//!    new header. Concurrent operations that expire together coalesce onto
//!    a single refresh call; a failed refresh clears the credential (forced
//!    logout) and surfaces [`ClientError::Unauthenticated`].
//! 3. **Auth header stage** - attaches `Authorization: Bearer <token>` when
//!    a credential exists. An already-expired credential refreshes before
//!    the operation is first sent.
//! 4. **Terminal stage** - one HTTP POST of `{query, variables}` to the
//!    GraphQL endpoint, cookies included.

mod retry;

pub use retry::RetryPolicy;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::auth::{Credential, TokenStore};
use crate::config::ClientConfig;
use crate::error::{ClientError, GraphQLError};

/// What a dispatched operation is, for logging and retry accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
}

/// Book-keeping for one dispatched operation while it is in flight.
///
/// Created at dispatch, destroyed when the operation reaches a terminal
/// state. The retry count is bounded by the configured attempt budget, and
/// an operation that failed authentication is replayed at most once after a
/// successful refresh - never retried.
#[derive(Debug)]
struct PendingOperation {
    id: Uuid,
    kind: OperationKind,
    retries: u32,
    auth_replayed: bool,
}

impl PendingOperation {
    fn dispatch(document: &str) -> Self {
        let kind = if document.trim_start().starts_with("mutation") {
            OperationKind::Mutation
        } else {
            OperationKind::Query
        };
        Self {
            id: Uuid::new_v4(),
            kind,
            retries: 0,
            auth_replayed: false,
        }
    }
}

/// Serializes token refreshes so concurrent expiring operations share one
/// refresh network call.
///
/// The generation counter advances on every completed refresh attempt. An
/// operation records the generation it observed before failing; by the time
/// it acquires the refresh lock, a changed generation means another
/// operation already refreshed on its behalf. Uncoalesced concurrent
/// refreshes can race and invalidate each other's refresh tokens, so this
/// is a correctness requirement, not an optimization.
struct RefreshGate {
    generation: AtomicU64,
    lock: Mutex<()>,
}

struct TransportInner {
    http: reqwest::Client,
    api_url: Url,
    refresh_url: Url,
    tokens: Arc<TokenStore>,
    retry: RetryPolicy,
    refresh: RefreshGate,
}

/// The shared request pipeline. Cheap to clone.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<TransportInner>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl Transport {
    /// Build the pipeline from configuration and the shared token store.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(config: &ClientConfig, tokens: Arc<TokenStore>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().cookie_store(true).build()?;

        Ok(Self {
            inner: Arc::new(TransportInner {
                http,
                api_url: config.api_url.clone(),
                refresh_url: config.refresh_url.clone(),
                tokens,
                retry: RetryPolicy::new(config.retry.clone()),
                refresh: RefreshGate {
                    generation: AtomicU64::new(0),
                    lock: Mutex::new(()),
                },
            }),
        })
    }

    /// Execute a GraphQL operation through the full chain and return its
    /// `data` payload.
    ///
    /// # Errors
    ///
    /// Returns the terminal error after retries and the single post-refresh
    /// replay are exhausted.
    #[instrument(skip_all, fields(operation = operation_name(document)))]
    pub async fn execute(&self, document: &str, variables: Value) -> Result<Value, ClientError> {
        let mut op = PendingOperation::dispatch(document);

        // Auth header stage reads the credential; an expired one refreshes
        // before the operation is first sent.
        if let Some(credential) = self.inner.tokens.get()
            && credential.is_expired(Utc::now())
        {
            debug!(operation_id = %op.id, "credential expired, refreshing before dispatch");
            let observed = self.generation();
            self.refresh_credentials(observed).await?;
        }

        loop {
            let observed = self.generation();
            match self.send_once(document, &variables).await {
                Ok(data) => return Ok(data),
                Err(err) if err.is_auth_expired() && !op.auth_replayed => {
                    op.auth_replayed = true;
                    debug!(operation_id = %op.id, "auth expired mid-flight, refreshing and replaying");
                    self.refresh_credentials(observed).await?;
                }
                Err(err)
                    if err.is_retryable() && op.retries + 1 < self.inner.retry.max_attempts() =>
                {
                    let delay = self.inner.retry.backoff_delay(op.retries);
                    op.retries += 1;
                    debug!(
                        operation_id = %op.id,
                        kind = ?op.kind,
                        retry = op.retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One pass through the auth-header and terminal stages.
    async fn send_once(&self, document: &str, variables: &Value) -> Result<Value, ClientError> {
        let mut request = self
            .inner
            .http
            .post(self.inner.api_url.clone())
            .json(&json!({ "query": document, "variables": variables }));

        // Attach nothing when absent; the server decides whether the
        // operation is permitted anonymously.
        if let Some(credential) = self.inner.tokens.get() {
            request = request.bearer_auth(credential.access_token());
        }

        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(ClientError::RateLimited(retry_after));
        }

        let text = response.text().await?;

        if !status.is_success() {
            warn!(
                status = %status,
                body = %text.chars().take(200).collect::<String>(),
                "API returned non-success status"
            );
            return Err(ClientError::Server {
                status: status.as_u16(),
                body: text.chars().take(200).collect(),
            });
        }

        let body: Value = serde_json::from_str(&text)?;

        if let Some(errors) = body.get("errors").and_then(Value::as_array)
            && !errors.is_empty()
        {
            return Err(ClientError::GraphQL(
                errors.iter().map(GraphQLError::from_value).collect(),
            ));
        }

        match body.get("data") {
            Some(data) if !data.is_null() => Ok(data.clone()),
            _ => Err(ClientError::GraphQL(vec![GraphQLError {
                message: "no data in response".to_owned(),
                code: None,
                path: vec![],
            }])),
        }
    }

    fn generation(&self) -> u64 {
        self.inner.refresh.generation.load(Ordering::Acquire)
    }

    /// Refresh the credential, coalescing concurrent callers.
    ///
    /// `observed` is the generation the caller saw before its operation
    /// failed. If the generation has moved on by the time the lock is
    /// acquired, another operation already completed a refresh attempt and
    /// this caller only inspects the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Unauthenticated`] after clearing the stored
    /// credential when the refresh call fails; the caller is logged out.
    pub async fn refresh_credentials(&self, observed: u64) -> Result<(), ClientError> {
        let _guard = self.inner.refresh.lock.lock().await;

        if self.generation() != observed {
            // Coalesced onto a refresh that ran while we waited for the lock.
            return if self.inner.tokens.get().is_some() {
                Ok(())
            } else {
                Err(ClientError::Unauthenticated)
            };
        }

        let previous = self.inner.tokens.get();
        let result = self.call_refresh_endpoint(previous.as_ref()).await;
        self.inner.refresh.generation.fetch_add(1, Ordering::Release);

        match result {
            Ok(response) => {
                // Servers that do not rotate refresh tokens return only the
                // access token; keep the old refresh token in that case.
                let refresh_token = response.refresh_token.or_else(|| {
                    previous
                        .as_ref()
                        .and_then(Credential::refresh_token)
                        .map(str::to_owned)
                });
                self.inner
                    .tokens
                    .set(Credential::new(response.access_token, refresh_token));
                debug!("credential refresh succeeded");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "credential refresh failed, logging out");
                self.inner.tokens.clear();
                Err(ClientError::Unauthenticated)
            }
        }
    }

    async fn call_refresh_endpoint(
        &self,
        credential: Option<&Credential>,
    ) -> Result<RefreshResponse, ClientError> {
        let body = credential
            .and_then(Credential::refresh_token)
            .map_or_else(|| json!({}), |token| json!({ "refreshToken": token }));

        let response = self
            .inner
            .http
            .post(self.inner.refresh_url.clone())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ClientError::Server {
                status: status.as_u16(),
                body: text.chars().take(200).collect(),
            });
        }

        Ok(response.json().await?)
    }
}

/// Extract the operation name from a GraphQL document for tracing.
fn operation_name(document: &str) -> &str {
    let rest = document
        .trim_start()
        .trim_start_matches("mutation")
        .trim_start_matches("query")
        .trim_start();
    let end = rest
        .find(|c: char| !c.is_alphanumeric() && c != '_')
        .unwrap_or(rest.len());
    rest.get(..end).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_name_extraction() {
        assert_eq!(operation_name("query GetOrders { orders { _id } }"), "GetOrders");
        assert_eq!(
            operation_name("mutation UpdateOrderStatus($id: ID!) { ... }"),
            "UpdateOrderStatus"
        );
        assert_eq!(operation_name("{ orders }"), "");
    }

    #[test]
    fn test_pending_operation_kind_detection() {
        let op = PendingOperation::dispatch("mutation Login { ... }");
        assert_eq!(op.kind, OperationKind::Mutation);
        assert!(!op.auth_replayed);

        let op = PendingOperation::dispatch("query GetCart { ... }");
        assert_eq!(op.kind, OperationKind::Query);
        assert_eq!(op.retries, 0);
    }
}
