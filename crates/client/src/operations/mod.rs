//! The typed GraphQL operation surface.
//!
//! Hand-written operation documents with local response structs, one module
//! per feature area. Every query folds its result into the normalized
//! cache before returning, and every mutation declares its cache-merge
//! intent through the [`crate::mutation::MutationExecutor`], so UI layers
//! reading reactively and callers reading return values always agree.

pub mod addresses;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod orders;
pub mod reviews;
pub mod store;
pub mod wishlist;

pub use addresses::AddressInput;
pub use auth::RegisterInput;
pub use orders::PlaceOrderInput;

use serde_json::Value;

use crate::cache::CacheError;
use crate::error::ClientError;

/// Extract a non-null root field from a GraphQL `data` payload.
pub(crate) fn root_field<'a>(data: &'a Value, field: &str) -> Result<&'a Value, ClientError> {
    data.get(field)
        .filter(|value| !value.is_null())
        .ok_or_else(|| ClientError::Cache(CacheError::MissingField(field.to_owned())))
}

/// Extract a root field that must be a list.
pub(crate) fn root_list<'a>(data: &'a Value, field: &str) -> Result<&'a [Value], ClientError> {
    root_field(data, field)?
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| ClientError::Cache(CacheError::NotAList(field.to_owned())))
}
