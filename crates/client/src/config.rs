//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `CLEMENTINE_ENV` - Deployment environment: `development` (default),
//!   `production`, or `test`
//! - `CLEMENTINE_API_URL` - GraphQL endpoint (default per environment)
//! - `CLEMENTINE_WS_URL` - Realtime endpoint (default per environment)
//! - `CLEMENTINE_TOKEN_PATH` - Path for persisted credentials (default:
//!   `$HOME/.local/state/clementine/credentials.json`)
//!
//! Every deployment environment carries a hardcoded fallback for the API and
//! realtime URLs, so a bare `ClientConfig::from_env()` always succeeds in
//! development and test.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Invalid URL in {0}: {1}")]
    InvalidUrl(String, url::ParseError),
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    /// Resolve from `CLEMENTINE_ENV`, defaulting to development.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable is set to an unknown value.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var("CLEMENTINE_ENV") {
            Ok(value) => match value.as_str() {
                "development" => Ok(Self::Development),
                "production" => Ok(Self::Production),
                "test" => Ok(Self::Test),
                other => Err(ConfigError::InvalidEnvVar(
                    "CLEMENTINE_ENV".to_owned(),
                    format!("unknown environment: {other}"),
                )),
            },
            Err(_) => Ok(Self::Development),
        }
    }

    /// Fallback GraphQL endpoint for this environment.
    #[must_use]
    pub const fn default_api_url(self) -> &'static str {
        match self {
            Self::Development | Self::Test => "http://localhost:3000/graphql",
            Self::Production => "https://api.clementine.shop/graphql",
        }
    }

    /// Fallback realtime endpoint for this environment.
    #[must_use]
    pub const fn default_ws_url(self) -> &'static str {
        match self {
            Self::Development | Self::Test => "ws://localhost:3000/ws",
            Self::Production => "wss://api.clementine.shop/ws",
        }
    }
}

/// Retry policy for the transport link chain.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of network attempts per operation.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Ceiling on the inter-attempt delay.
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(300),
            max_backoff: Duration::from_millis(3000),
        }
    }
}

/// Reconnect policy for the realtime channel.
///
/// The reconnect interval is fixed, not exponential: a dropped socket is
/// expected to come back on the next attempt, and the channel degrades to
/// `GIVEN_UP` after a bounded number of consecutive failures instead of
/// backing off forever.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Fixed delay between reconnect attempts.
    pub reconnect_interval: Duration,
    /// Consecutive failed reconnects (without an intervening open) before
    /// the channel gives up.
    pub max_reconnect_attempts: u32,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_millis(3000),
            max_reconnect_attempts: 5,
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Deployment environment.
    pub environment: Environment,
    /// GraphQL endpoint.
    pub api_url: Url,
    /// Realtime endpoint; per-store channels append `/store/{store_id}`.
    pub ws_url: Url,
    /// Token refresh endpoint, derived from the API origin.
    pub refresh_url: Url,
    /// Where credentials are persisted; `None` keeps them in memory only.
    pub token_path: Option<PathBuf>,
    /// Transport retry policy.
    pub retry: RetryConfig,
    /// Realtime reconnect policy.
    pub realtime: RealtimeConfig,
}

impl ClientConfig {
    /// Load configuration from environment variables with per-environment
    /// fallbacks.
    ///
    /// # Errors
    ///
    /// Returns an error if `CLEMENTINE_ENV` names an unknown environment or
    /// a URL variable fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = Environment::from_env()?;

        let api_url = env_url("CLEMENTINE_API_URL", environment.default_api_url())?;
        let ws_url = env_url("CLEMENTINE_WS_URL", environment.default_ws_url())?;

        let token_path = std::env::var_os("CLEMENTINE_TOKEN_PATH").map_or_else(
            || default_token_path(environment),
            |p| Some(PathBuf::from(p)),
        );

        Self::new(environment, api_url, ws_url, token_path)
    }

    /// Build a configuration from explicit endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh URL cannot be derived from the API
    /// origin.
    pub fn new(
        environment: Environment,
        api_url: Url,
        ws_url: Url,
        token_path: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let refresh_url = derive_refresh_url(&api_url)?;

        Ok(Self {
            environment,
            api_url,
            ws_url,
            refresh_url,
            token_path,
            retry: RetryConfig::default(),
            realtime: RealtimeConfig::default(),
        })
    }

    /// The realtime endpoint for a store scope.
    #[must_use]
    pub fn store_ws_url(&self, store_id: &str) -> Url {
        let mut url = self.ws_url.clone();
        let path = format!("{}/store/{store_id}", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url
    }
}

fn env_url(name: &str, fallback: &str) -> Result<Url, ConfigError> {
    let raw = std::env::var(name).unwrap_or_else(|_| fallback.to_owned());
    Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl(name.to_owned(), e))
}

/// Refresh route lives at the API origin, next to the GraphQL path.
fn derive_refresh_url(api_url: &Url) -> Result<Url, ConfigError> {
    api_url
        .join("/auth/refresh")
        .map_err(|e| ConfigError::InvalidUrl("CLEMENTINE_API_URL".to_owned(), e))
}

/// Test runs keep credentials in memory; everything else persists under the
/// user state directory.
fn default_token_path(environment: Environment) -> Option<PathBuf> {
    if environment == Environment::Test {
        return None;
    }
    std::env::var_os("HOME").map(|home| {
        PathBuf::from(home)
            .join(".local/state/clementine")
            .join("credentials.json")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_fallback_urls() {
        assert_eq!(
            Environment::Development.default_api_url(),
            "http://localhost:3000/graphql"
        );
        assert_eq!(
            Environment::Production.default_ws_url(),
            "wss://api.clementine.shop/ws"
        );
    }

    #[test]
    fn test_refresh_url_derived_from_api_origin() {
        let api = Url::parse("https://api.clementine.shop/graphql").unwrap();
        let refresh = derive_refresh_url(&api).unwrap();
        assert_eq!(refresh.as_str(), "https://api.clementine.shop/auth/refresh");
    }

    #[test]
    fn test_store_ws_url_appends_scope() {
        let config = ClientConfig::new(
            Environment::Test,
            Url::parse("http://localhost:3000/graphql").unwrap(),
            Url::parse("ws://localhost:3000/ws").unwrap(),
            None,
        )
        .unwrap();
        assert_eq!(
            config.store_ws_url("store-1").as_str(),
            "ws://localhost:3000/ws/store/store-1"
        );
    }

    #[test]
    fn test_default_retry_bounds() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.initial_backoff, Duration::from_millis(300));
        assert_eq!(retry.max_backoff, Duration::from_millis(3000));
    }

    #[test]
    fn test_default_realtime_policy() {
        let realtime = RealtimeConfig::default();
        assert_eq!(realtime.reconnect_interval, Duration::from_millis(3000));
        assert_eq!(realtime.max_reconnect_attempts, 5);
    }
}
