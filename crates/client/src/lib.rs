//! Clementine client - the data-synchronization layer for the Clementine
//! storefront and store-owner console.
//!
//! # Architecture
//!
//! The client keeps one normalized entity cache consistent across three
//! sources of truth:
//!
//! - query results fetched through the authenticated [`transport`] chain
//! - mutation responses folded in by the [`mutation::MutationExecutor`]
//!   under an explicit merge rule per call site
//! - asynchronous push events from the [`realtime`] channel, reconciled by
//!   [`reconcile::ReconciliationEngine`]
//!
//! All three paths converge on [`cache::NormalizedCache`], keyed by
//! `(typename, id)`, which UI state observes reactively. The transport
//! retries transient failures with bounded backoff, refreshes expired
//! credentials exactly once per expiry (coalescing concurrent refreshes),
//! and never retries semantic errors.
//!
//! # Example
//!
//! ```rust,ignore
//! use clementine_client::{ClientConfig, StorefrontClient};
//!
//! let config = ClientConfig::from_env()?;
//! let client = StorefrontClient::init(config)?;
//!
//! client.login("ada@example.com", "hunter2").await?;
//! let orders = client.orders().await?;
//!
//! // Store console: live order feed
//! let realtime = client.connect_store_realtime(&store_id);
//! let mut updates = client.subscribe();
//! while let Ok(update) = updates.recv().await {
//!     // re-read affected queries from the cache
//! }
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod cache;
pub mod catalog_cache;
pub mod client;
pub mod config;
pub mod error;
pub mod mutation;
pub mod operations;
pub mod realtime;
pub mod reconcile;
pub mod transport;

pub use auth::{Credential, TokenStore};
pub use cache::{CacheError, CacheUpdate, EntityKey, MergePolicy, NormalizedCache};
pub use client::StorefrontClient;
pub use config::{ClientConfig, ConfigError, Environment, RealtimeConfig, RetryConfig};
pub use error::{ClientError, GraphQLError};
pub use mutation::{CacheWriter, MutationExecutor};
pub use realtime::{ChannelState, RealtimeHandle};
pub use reconcile::ReconciliationEngine;
pub use transport::Transport;
