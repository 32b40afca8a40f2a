//! Persisted access/refresh credential storage.

use std::path::PathBuf;
use std::sync::RwLock;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// An access/refresh token pair with its decoded expiry.
///
/// Implements `Debug` manually to redact token material.
#[derive(Clone)]
pub struct Credential {
    access_token: SecretString,
    refresh_token: Option<SecretString>,
    expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Create a credential, decoding the access token's `exp` claim when the
    /// token is a signed JWT payload.
    #[must_use]
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        let access_token: String = access_token.into();
        let expires_at = decode_expiry(&access_token);
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.map(SecretString::from),
            expires_at,
        }
    }

    /// The bearer token to attach to outgoing operations.
    #[must_use]
    pub fn access_token(&self) -> &str {
        self.access_token.expose_secret()
    }

    /// The refresh token, when the server issued one.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_ref().map(ExposeSecret::expose_secret)
    }

    /// When the access token expires, if its claims could be decoded.
    #[must_use]
    pub const fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Whether the access token is expired at `now`.
    ///
    /// A token whose expiry could not be decoded is treated as expired, so
    /// the next operation refreshes before use instead of failing mid-flight.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires_at| now >= expires_at)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Decode the `exp` claim from a JWT access token.
///
/// Returns `None` for opaque or malformed tokens.
#[must_use]
pub fn decode_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?.as_i64()?;
    DateTime::from_timestamp(exp, 0)
}

/// On-disk credential format. Fixed keys; survives process restart.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedCredential {
    access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

/// Durable holder of the current credential.
///
/// `open` with a path persists across restarts; `open(None)` keeps the
/// credential in memory only (used by tests and ephemeral environments).
pub struct TokenStore {
    path: Option<PathBuf>,
    current: RwLock<Option<Credential>>,
}

impl TokenStore {
    /// Open the store, loading any persisted credential.
    ///
    /// A missing, unreadable, or malformed state file is treated as "no
    /// credential" (the user re-authenticates), never as a fatal error.
    #[must_use]
    pub fn open(path: Option<PathBuf>) -> Self {
        let current = path.as_deref().and_then(load_persisted);
        Self {
            path,
            current: RwLock::new(current),
        }
    }

    /// The current credential, if any.
    #[must_use]
    pub fn get(&self) -> Option<Credential> {
        self.current.read().ok().and_then(|guard| guard.clone())
    }

    /// Replace the current credential and persist it.
    pub fn set(&self, credential: Credential) {
        if let Some(path) = self.path.as_deref() {
            persist(path, &credential);
        }
        if let Ok(mut guard) = self.current.write() {
            *guard = Some(credential);
        }
    }

    /// Destroy the credential in memory and on disk.
    pub fn clear(&self) {
        if let Some(path) = self.path.as_deref()
            && path.exists()
            && let Err(e) = std::fs::remove_file(path)
        {
            warn!(error = %e, "failed to remove persisted credentials");
        }
        if let Ok(mut guard) = self.current.write() {
            *guard = None;
        }
    }
}

fn load_persisted(path: &std::path::Path) -> Option<Credential> {
    let raw = std::fs::read_to_string(path).ok()?;
    let persisted: PersistedCredential = match serde_json::from_str(&raw) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "malformed persisted credentials, discarding");
            return None;
        }
    };

    let credential = Credential::new(persisted.access_token, persisted.refresh_token);
    if credential.expires_at().is_none() {
        warn!("persisted access token has no decodable expiry, discarding");
        return None;
    }

    debug!(expires_at = ?credential.expires_at(), "loaded persisted credentials");
    Some(credential)
}

fn persist(path: &std::path::Path, credential: &Credential) {
    let persisted = PersistedCredential {
        access_token: credential.access_token().to_owned(),
        refresh_token: credential.refresh_token().map(str::to_owned),
    };

    let write = || -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string_pretty(&persisted)?;
        std::fs::write(path, body)
    };

    if let Err(e) = write() {
        warn!(error = %e, path = %path.display(), "failed to persist credentials");
    }
}
