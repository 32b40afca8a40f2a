//! Credential handling: token expiry inspection and the persisted store.
//!
//! At most one valid credential is live at a time. It is created by login
//! or refresh, read by the transport's auth-header stage, and destroyed on
//! logout or an unrecoverable refresh failure. The store itself performs no
//! network calls; the refresh flow lives in [`crate::transport`].

mod token_store;

pub use token_store::{Credential, TokenStore, decode_expiry};
