//! Mutation dispatch with explicit cache-merge intent.
//!
//! Every mutation site declares, at the call, exactly how its response
//! folds into the normalized cache - "replace the cart root with the
//! returned cart", "upsert the order entity" - instead of scattering ad hoc
//! cache writes per feature. The executor guarantees the merge runs at most
//! once per successful response and never on failure; there is no optimistic
//! write to roll back, so a failed mutation leaves the cache exactly as it
//! was.

use serde_json::Value;

use crate::cache::{CacheError, EntityKey, MergePolicy, NormalizedCache};
use crate::error::ClientError;
use crate::transport::Transport;

/// Write handle passed to a mutation's merge function.
///
/// Exposes only write operations, each of which validates its input before
/// touching cached state, so a malformed response skips the write instead
/// of corrupting it.
pub struct CacheWriter<'a> {
    cache: &'a NormalizedCache,
}

impl CacheWriter<'_> {
    /// Upsert an entity from a response object; see
    /// [`NormalizedCache::upsert_entity`].
    ///
    /// # Errors
    ///
    /// Returns the validation error without modifying cached state.
    pub fn upsert_entity(
        &self,
        typename: &str,
        value: &Value,
        id_field: &str,
    ) -> Result<EntityKey, CacheError> {
        self.cache.upsert_entity(typename, value, id_field)
    }

    /// Rewrite a query root under an explicit policy.
    pub fn write_root(&self, field: &str, value: Value, policy: MergePolicy) {
        self.cache.write_root(field, value, policy);
    }

    /// Replace a list root with normalized entities; see
    /// [`NormalizedCache::write_entity_list_root`].
    ///
    /// # Errors
    ///
    /// Returns the validation error without applying any partial state.
    pub fn write_entity_list_root(
        &self,
        field: &str,
        typename: &str,
        items: &[Value],
        id_field: &str,
    ) -> Result<(), CacheError> {
        self.cache.write_entity_list_root(field, typename, items, id_field)
    }

    /// Prepend an entity reference to a cached list root.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NotAList`] if the root holds a non-list value.
    pub fn prepend_entity_ref(&self, field: &str, key: &EntityKey) -> Result<(), CacheError> {
        self.cache.prepend_entity_ref(field, key)
    }

    /// Remove an entity reference from a cached list root.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NotAList`] if the root holds a non-list value.
    pub fn remove_entity_ref(&self, field: &str, key: &EntityKey) -> Result<(), CacheError> {
        self.cache.remove_entity_ref(field, key)
    }

    /// Append a value to a list field on a cached entity.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NotAList`] if the field holds a non-list value.
    pub fn append_entity_field_list(
        &self,
        key: &EntityKey,
        field: &str,
        value: Value,
    ) -> Result<(), CacheError> {
        self.cache.append_entity_field_list(key, field, value)
    }
}

/// Dispatches mutations and applies their declared cache merges.
#[derive(Clone)]
pub struct MutationExecutor {
    transport: Transport,
    cache: NormalizedCache,
}

impl MutationExecutor {
    #[must_use]
    pub const fn new(transport: Transport, cache: NormalizedCache) -> Self {
        Self { transport, cache }
    }

    /// Dispatch a mutation and fold its result into the cache.
    ///
    /// The merge function runs at most once, only on success. On transport
    /// failure the cache is untouched and the error is returned for the
    /// caller to display; on merge failure the (validated-first) write is
    /// skipped and the error surfaces the same way.
    ///
    /// # Errors
    ///
    /// Returns transport errors verbatim and merge failures as
    /// [`ClientError::Cache`].
    pub async fn execute<F>(
        &self,
        document: &str,
        variables: Value,
        merge: F,
    ) -> Result<Value, ClientError>
    where
        F: FnOnce(&CacheWriter<'_>, &Value) -> Result<(), CacheError>,
    {
        let data = self.transport.execute(document, variables).await?;

        let writer = CacheWriter { cache: &self.cache };
        merge(&writer, &data)?;

        Ok(data)
    }
}
