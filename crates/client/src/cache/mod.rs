//! Normalized entity cache.
//!
//! Server entities live in one in-memory store keyed by `(typename, id)`.
//! Query roots (`"orders"`, `"storeOrders:store-1"`, ...) hold either plain
//! values or lists of entity references, so a change applied through any
//! path - a query result, a mutation merge, or a realtime push - is visible
//! to every read that resolves the same entity.
//!
//! Writes follow a declared merge policy. The default deep-merges embedded
//! objects and overwrites scalars; list-valued query roots use
//! [`MergePolicy::Replace`], which discards the previous value wholesale on
//! each write. List identity changes on every re-fetch, and partial merging
//! would interleave stale rows with fresh ones.
//!
//! Reads are reactive: [`NormalizedCache::subscribe`] yields a stream of
//! [`CacheUpdate`] keys, and a subscriber re-reads whatever it displays when
//! a relevant key arrives. A lagged subscriber receives a `Lagged` error
//! from the broadcast channel and refetches; it never observes a torn write
//! because every logical write happens under one lock.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

/// Maximum reference-resolution depth when assembling a read.
const MAX_RESOLVE_DEPTH: usize = 8;

/// Identity of a cached entity: the `(typename, id)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub typename: String,
    pub id: String,
}

impl EntityKey {
    /// Create a key from a typename and id.
    #[must_use]
    pub fn new(typename: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            typename: typename.into(),
            id: id.into(),
        }
    }

    /// The JSON reference form stored inside query roots.
    #[must_use]
    pub fn reference(&self) -> Value {
        serde_json::json!({ "__ref": format!("{}:{}", self.typename, self.id) })
    }

    /// Parse a reference value back into a key.
    #[must_use]
    pub fn from_reference(value: &Value) -> Option<Self> {
        let reference = value.as_object()?.get("__ref")?.as_str()?;
        let (typename, id) = reference.split_once(':')?;
        Some(Self::new(typename, id))
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.typename, self.id)
    }
}

/// How a write folds into an existing cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// Deep-merge embedded objects, overwrite scalars and lists.
    #[default]
    Merge,
    /// Discard the previous value entirely. Required for list-valued query
    /// roots (order lists, customer lists) that must never accumulate
    /// stale rows across re-fetches.
    Replace,
}

/// Notification that part of the cache changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheUpdate {
    /// An entity's fields changed.
    Entity(EntityKey),
    /// A query root was rewritten (or a list root gained an entry).
    Root(String),
    /// The whole cache was cleared (logout).
    Cleared,
}

/// Errors from folding a response into the cache.
///
/// A failed write is skipped; previously cached state is never corrupted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("response missing expected field `{0}`")]
    MissingField(String),
    #[error("expected an object at `{0}`")]
    NotAnObject(String),
    #[error("root field `{0}` is not a list")]
    NotAList(String),
    #[error("failed to encode entity: {0}")]
    Encode(String),
}

#[derive(Default)]
struct CacheState {
    entities: HashMap<EntityKey, Map<String, Value>>,
    roots: HashMap<String, Value>,
}

struct CacheInner {
    state: RwLock<CacheState>,
    updates: broadcast::Sender<CacheUpdate>,
}

/// The normalized in-memory store shared by queries, mutations, and the
/// realtime reconciliation engine.
#[derive(Clone)]
pub struct NormalizedCache {
    inner: Arc<CacheInner>,
}

impl Default for NormalizedCache {
    fn default() -> Self {
        Self::new()
    }
}

impl NormalizedCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(CacheInner {
                state: RwLock::new(CacheState::default()),
                updates,
            }),
        }
    }

    /// Subscribe to change notifications.
    ///
    /// Live read subscriptions re-read on every relevant key; dropping the
    /// receiver simply stops observing.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CacheUpdate> {
        self.inner.updates.subscribe()
    }

    /// Write fields into an entity, creating it when absent.
    ///
    /// Only the fields present in `fields` are touched; existing fields not
    /// named by the write are preserved. Embedded objects deep-merge,
    /// scalars and lists overwrite.
    pub fn write_entity(&self, key: EntityKey, fields: Map<String, Value>) {
        {
            let mut state = self.write_state();
            let entity = state.entities.entry(key.clone()).or_default();
            for (name, value) in fields {
                match entity.get_mut(&name) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        entity.insert(name, value);
                    }
                }
            }
        }
        self.notify(CacheUpdate::Entity(key));
    }

    /// Upsert an entity from a raw response object, extracting its id from
    /// `id_field`.
    ///
    /// Validates before writing: a response that is not an object or lacks
    /// the id field leaves the cache untouched.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NotAnObject`] or [`CacheError::MissingField`]
    /// without modifying any cached state.
    pub fn upsert_entity(
        &self,
        typename: &str,
        value: &Value,
        id_field: &str,
    ) -> Result<EntityKey, CacheError> {
        let fields = value
            .as_object()
            .ok_or_else(|| CacheError::NotAnObject(typename.to_owned()))?;
        let id = fields
            .get(id_field)
            .and_then(Value::as_str)
            .ok_or_else(|| CacheError::MissingField(id_field.to_owned()))?;

        let key = EntityKey::new(typename, id);
        self.write_entity(key.clone(), fields.clone());
        Ok(key)
    }

    /// Read an entity's raw fields (references unresolved).
    #[must_use]
    pub fn read_entity(&self, key: &EntityKey) -> Option<Value> {
        let state = self.read_state();
        state.entities.get(key).cloned().map(Value::Object)
    }

    /// Write a query root under an explicit merge policy.
    pub fn write_root(&self, field: &str, value: Value, policy: MergePolicy) {
        {
            let mut state = self.write_state();
            match (policy, state.roots.get_mut(field)) {
                (MergePolicy::Merge, Some(existing)) => deep_merge(existing, value),
                _ => {
                    state.roots.insert(field.to_owned(), value);
                }
            }
        }
        self.notify(CacheUpdate::Root(field.to_owned()));
    }

    /// Normalize a list of entity objects under a replace-policy root.
    ///
    /// Each element is upserted as an entity and the root becomes a list of
    /// references in the given order, discarding whatever the root held
    /// before. The whole write is validated first: one malformed element
    /// skips the entire write.
    ///
    /// # Errors
    ///
    /// Returns the first element's validation error; no partial state is
    /// applied.
    pub fn write_entity_list_root(
        &self,
        field: &str,
        typename: &str,
        items: &[Value],
        id_field: &str,
    ) -> Result<(), CacheError> {
        // Validate every element before touching state.
        let mut keys = Vec::with_capacity(items.len());
        for item in items {
            let fields = item
                .as_object()
                .ok_or_else(|| CacheError::NotAnObject(typename.to_owned()))?;
            let id = fields
                .get(id_field)
                .and_then(Value::as_str)
                .ok_or_else(|| CacheError::MissingField(id_field.to_owned()))?;
            keys.push(EntityKey::new(typename, id));
        }

        let refs: Vec<Value> = keys.iter().map(EntityKey::reference).collect();
        {
            let mut state = self.write_state();
            for (key, item) in keys.iter().zip(items) {
                let entity = state.entities.entry(key.clone()).or_default();
                if let Some(fields) = item.as_object() {
                    for (name, value) in fields {
                        match entity.get_mut(name) {
                            Some(existing) => deep_merge(existing, value.clone()),
                            None => {
                                entity.insert(name.clone(), value.clone());
                            }
                        }
                    }
                }
            }
            state.roots.insert(field.to_owned(), Value::Array(refs));
        }

        for key in keys {
            self.notify(CacheUpdate::Entity(key));
        }
        self.notify(CacheUpdate::Root(field.to_owned()));
        Ok(())
    }

    /// Prepend an entity reference to a cached list root.
    ///
    /// No-op when the root is not cached yet (the next fetch will include
    /// the entity) or when the reference is already present (an event
    /// delivered twice must not duplicate the row).
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NotAList`] if the root holds a non-list value.
    pub fn prepend_entity_ref(&self, field: &str, key: &EntityKey) -> Result<(), CacheError> {
        let changed = {
            let mut state = self.write_state();
            match state.roots.get_mut(field) {
                None => false,
                Some(Value::Array(refs)) => {
                    let reference = key.reference();
                    if refs.contains(&reference) {
                        false
                    } else {
                        refs.insert(0, reference);
                        true
                    }
                }
                Some(_) => return Err(CacheError::NotAList(field.to_owned())),
            }
        };

        if changed {
            self.notify(CacheUpdate::Root(field.to_owned()));
        }
        Ok(())
    }

    /// Append a value to a list field on an existing entity, creating the
    /// list when the field is absent.
    ///
    /// No-op when the entity itself is not cached; the next full fetch will
    /// include the value anyway.
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
        let changed = {
            let mut state = self.write_state();
            match state.entities.get_mut(key) {
                None => false,
                Some(entity) => match entity.get_mut(field) {
                    None => {
                        entity.insert(field.to_owned(), Value::Array(vec![value]));
                        true
                    }
                    Some(Value::Array(items)) => {
                        items.push(value);
                        true
                    }
                    Some(_) => return Err(CacheError::NotAList(field.to_owned())),
                },
            }
        };

        if changed {
            self.notify(CacheUpdate::Entity(key.clone()));
        }
        Ok(())
    }

    /// Remove an entity reference from a cached list root.
    ///
    /// No-op when the root is not cached or the reference is absent.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NotAList`] if the root holds a non-list value.
    pub fn remove_entity_ref(&self, field: &str, key: &EntityKey) -> Result<(), CacheError> {
        let changed = {
            let mut state = self.write_state();
            match state.roots.get_mut(field) {
                None => false,
                Some(Value::Array(refs)) => {
                    let reference = key.reference();
                    let before = refs.len();
                    refs.retain(|r| *r != reference);
                    refs.len() != before
                }
                Some(_) => return Err(CacheError::NotAList(field.to_owned())),
            }
        };

        if changed {
            self.notify(CacheUpdate::Root(field.to_owned()));
        }
        Ok(())
    }

    /// Read a query root, resolving entity references against the store.
    ///
    /// Returns `None` on a miss. A dangling reference (entity evicted)
    /// resolves to `null` rather than failing the whole read.
    #[must_use]
    pub fn read_root(&self, field: &str) -> Option<Value> {
        let state = self.read_state();
        let value = state.roots.get(field)?.clone();
        Some(resolve_references(value, &state.entities, MAX_RESOLVE_DEPTH))
    }

    /// Drop everything (logout).
    pub fn clear(&self) {
        {
            let mut state = self.write_state();
            state.entities.clear();
            state.roots.clear();
        }
        self.notify(CacheUpdate::Cleared);
    }

    fn notify(&self, update: CacheUpdate) {
        debug!(?update, "cache update");
        // Send fails only when no subscriber is listening, which is fine.
        let _ = self.inner.updates.send(update);
    }

    #[allow(clippy::unwrap_used)]
    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, CacheState> {
        // Writers never panic while holding the lock; poisoning is unreachable.
        self.inner.state.read().unwrap()
    }

    #[allow(clippy::unwrap_used)]
    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, CacheState> {
        self.inner.state.write().unwrap()
    }
}

/// Default merge: objects merge field-by-field, everything else overwrites.
fn deep_merge(target: &mut Value, incoming: Value) {
    match (target, incoming) {
        (Value::Object(existing), Value::Object(fields)) => {
            for (name, value) in fields {
                match existing.get_mut(&name) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        existing.insert(name, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

fn resolve_references(
    value: Value,
    entities: &HashMap<EntityKey, Map<String, Value>>,
    depth: usize,
) -> Value {
    if depth == 0 {
        return value;
    }

    if let Some(key) = EntityKey::from_reference(&value) {
        return entities.get(&key).map_or(Value::Null, |fields| {
            resolve_references(Value::Object(fields.clone()), entities, depth - 1)
        });
    }

    match value {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| resolve_references(item, entities, depth))
                .collect(),
        ),
        Value::Object(fields) => Value::Object(
            fields
                .into_iter()
                .map(|(name, item)| (name, resolve_references(item, entities, depth)))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order_value(id: &str, status: &str) -> Value {
        json!({
            "_id": id,
            "orderNumber": format!("ORD-{id}"),
            "status": status,
            "items": [{"productId": "p1", "quantity": 1}]
        })
    }

    #[test]
    fn test_write_then_read_entity() {
        let cache = NormalizedCache::new();
        cache
            .upsert_entity("Order", &order_value("o1", "PENDING"), "_id")
            .unwrap();

        let key = EntityKey::new("Order", "o1");
        let entity = cache.read_entity(&key).unwrap();
        assert_eq!(entity["status"], "PENDING");
    }

    #[test]
    fn test_partial_write_preserves_other_fields() {
        let cache = NormalizedCache::new();
        cache
            .upsert_entity("Order", &order_value("o1", "PENDING"), "_id")
            .unwrap();

        // Mutation result carrying only id + status, as updateOrderStatus returns.
        cache
            .upsert_entity("Order", &json!({"_id": "o1", "status": "SHIPPED"}), "_id")
            .unwrap();

        let entity = cache.read_entity(&EntityKey::new("Order", "o1")).unwrap();
        assert_eq!(entity["status"], "SHIPPED");
        assert_eq!(entity["items"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_missing_id_leaves_cache_untouched() {
        let cache = NormalizedCache::new();
        cache
            .upsert_entity("Order", &order_value("o1", "PENDING"), "_id")
            .unwrap();

        let err = cache
            .upsert_entity("Order", &json!({"status": "SHIPPED"}), "_id")
            .unwrap_err();
        assert_eq!(err, CacheError::MissingField("_id".to_owned()));

        let entity = cache.read_entity(&EntityKey::new("Order", "o1")).unwrap();
        assert_eq!(entity["status"], "PENDING");
    }

    #[test]
    fn test_replace_root_drops_stale_entries() {
        let cache = NormalizedCache::new();
        let long = vec![
            order_value("o1", "PENDING"),
            order_value("o2", "PENDING"),
            order_value("o3", "PENDING"),
        ];
        cache
            .write_entity_list_root("storeOrders:s1", "Order", &long, "_id")
            .unwrap();

        let short = vec![order_value("o2", "SHIPPED")];
        cache
            .write_entity_list_root("storeOrders:s1", "Order", &short, "_id")
            .unwrap();

        let list = cache.read_root("storeOrders:s1").unwrap();
        let rows = list.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["_id"], "o2");
    }

    #[test]
    fn test_list_root_resolves_entity_updates() {
        let cache = NormalizedCache::new();
        cache
            .write_entity_list_root("orders", "Order", &[order_value("o1", "PENDING")], "_id")
            .unwrap();

        // Entity updated through a different path than the list write.
        cache
            .upsert_entity("Order", &json!({"_id": "o1", "status": "DELIVERED"}), "_id")
            .unwrap();

        let list = cache.read_root("orders").unwrap();
        assert_eq!(list[0]["status"], "DELIVERED");
    }

    #[test]
    fn test_prepend_is_idempotent() {
        let cache = NormalizedCache::new();
        cache
            .write_entity_list_root("orders", "Order", &[order_value("o1", "PENDING")], "_id")
            .unwrap();
        cache
            .upsert_entity("Order", &order_value("o9", "PENDING"), "_id")
            .unwrap();

        let key = EntityKey::new("Order", "o9");
        cache.prepend_entity_ref("orders", &key).unwrap();
        cache.prepend_entity_ref("orders", &key).unwrap();

        let list = cache.read_root("orders").unwrap();
        let rows = list.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["_id"], "o9");
    }

    #[test]
    fn test_prepend_without_cached_root_is_noop() {
        let cache = NormalizedCache::new();
        let key = EntityKey::new("Order", "o1");
        cache.prepend_entity_ref("orders", &key).unwrap();
        assert!(cache.read_root("orders").is_none());
    }

    #[test]
    fn test_deep_merge_embedded_objects() {
        let cache = NormalizedCache::new();
        cache
            .upsert_entity(
                "Customer",
                &json!({"_id": "c1", "profile": {"email": "a@b.c", "phone": "123"}}),
                "_id",
            )
            .unwrap();
        cache
            .upsert_entity("Customer", &json!({"_id": "c1", "profile": {"phone": "456"}}), "_id")
            .unwrap();

        let entity = cache.read_entity(&EntityKey::new("Customer", "c1")).unwrap();
        assert_eq!(entity["profile"]["phone"], "456");
        assert_eq!(entity["profile"]["email"], "a@b.c");
    }

    #[test]
    fn test_scalar_root_merge_policy() {
        let cache = NormalizedCache::new();
        cache.write_root("cartBadge", json!({"count": 1}), MergePolicy::Merge);
        cache.write_root("cartBadge", json!({"count": 2}), MergePolicy::Merge);
        assert_eq!(cache.read_root("cartBadge").unwrap()["count"], 2);
    }

    #[test]
    fn test_clear_notifies_and_empties() {
        let cache = NormalizedCache::new();
        let mut updates = cache.subscribe();
        cache
            .upsert_entity("Order", &order_value("o1", "PENDING"), "_id")
            .unwrap();
        cache.clear();

        assert!(cache.read_entity(&EntityKey::new("Order", "o1")).is_none());
        // Drain: entity write then clear.
        assert_eq!(
            updates.try_recv().unwrap(),
            CacheUpdate::Entity(EntityKey::new("Order", "o1"))
        );
        assert_eq!(updates.try_recv().unwrap(), CacheUpdate::Cleared);
    }

    #[test]
    fn test_subscriber_sees_entity_updates() {
        let cache = NormalizedCache::new();
        let mut updates = cache.subscribe();
        cache.write_entity(
            EntityKey::new("Order", "o5"),
            json!({"status": "PAID"}).as_object().unwrap().clone(),
        );
        assert_eq!(
            updates.try_recv().unwrap(),
            CacheUpdate::Entity(EntityKey::new("Order", "o5"))
        );
    }

    #[test]
    fn test_append_entity_field_list() {
        let cache = NormalizedCache::new();
        cache
            .upsert_entity("Product", &json!({"id": "p1", "reviews": [{"id": "r1"}]}), "id")
            .unwrap();

        let key = EntityKey::new("Product", "p1");
        cache
            .append_entity_field_list(&key, "reviews", json!({"id": "r2"}))
            .unwrap();

        let entity = cache.read_entity(&key).unwrap();
        assert_eq!(entity["reviews"].as_array().unwrap().len(), 2);

        // Absent entity: nothing to append to, nothing breaks.
        cache
            .append_entity_field_list(&EntityKey::new("Product", "p9"), "reviews", json!({}))
            .unwrap();

        let err = cache
            .append_entity_field_list(&key, "id", json!({}))
            .unwrap_err();
        assert_eq!(err, CacheError::NotAList("id".to_owned()));
    }

    #[test]
    fn test_remove_entity_ref() {
        let cache = NormalizedCache::new();
        cache
            .write_entity_list_root(
                "addresses",
                "Address",
                &[json!({"_id": "a1"}), json!({"_id": "a2"})],
                "_id",
            )
            .unwrap();

        cache
            .remove_entity_ref("addresses", &EntityKey::new("Address", "a1"))
            .unwrap();

        let list = cache.read_root("addresses").unwrap();
        let rows = list.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["_id"], "a2");

        // Removing again is a no-op.
        cache
            .remove_entity_ref("addresses", &EntityKey::new("Address", "a1"))
            .unwrap();
        assert_eq!(cache.read_root("addresses").unwrap().as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_reference_roundtrip() {
        let key = EntityKey::new("Order", "o1");
        let reference = key.reference();
        assert_eq!(EntityKey::from_reference(&reference).unwrap(), key);
        assert!(EntityKey::from_reference(&json!({"id": "o1"})).is_none());
    }
}
