//! Clementine Core - Shared types library.
//!
//! This crate provides common types used across all Clementine components:
//! - `client` - GraphQL transport, normalized cache, and realtime sync engine
//! - `integration-tests` - End-to-end tests against a mock API server
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no sockets.
//! This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, statuses, and domain entities (orders, carts,
//!   products, customers) plus the realtime event union

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
