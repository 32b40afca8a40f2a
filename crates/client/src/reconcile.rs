//! Reconciliation of realtime push events into the normalized cache.
//!
//! Push events and GraphQL responses use the same entity identity
//! (`Order`, keyed by id), so a change delivered over the socket and a
//! change delivered by a later refetch can never diverge: both paths write
//! the same cache entry, and any UI holding a subscription observes the
//! update through the cache, not through a side channel.
//!
//! Each event carries the full current field values of the order (not a
//! delta), so upsert-by-id makes reapplying a duplicate event a no-op and
//! makes either arrival order of a push and a concurrent query response
//! safe: last write observed wins. Events for the same order arriving out
//! of order are not re-sequenced; the channel is a single ordered stream
//! and the engine applies in delivery order.

use clementine_core::{RealtimeEvent, StoreId};
use tracing::{debug, instrument};

use crate::cache::{CacheError, EntityKey, NormalizedCache};

/// Cache typename for orders.
pub const ORDER_TYPENAME: &str = "Order";

/// The replace-policy root holding a store's order list.
#[must_use]
pub fn store_orders_root(store_id: &StoreId) -> String {
    format!("storeOrders:{store_id}")
}

/// Folds push events into the cache for one store scope.
#[derive(Clone)]
pub struct ReconciliationEngine {
    cache: NormalizedCache,
    orders_root: String,
}

impl ReconciliationEngine {
    #[must_use]
    pub fn new(cache: NormalizedCache, store_id: &StoreId) -> Self {
        Self {
            cache,
            orders_root: store_orders_root(store_id),
        }
    }

    /// Apply one event.
    ///
    /// - `NEW_ORDER` inserts the order entity and prepends it to the cached
    ///   store order list when one is present, so an open list view updates
    ///   without waiting for a refetch.
    /// - `ORDER_STATUS_UPDATED` / `ORDER_PAYMENT_UPDATED` upsert by id,
    ///   overwriting the fields present in the payload. An order not yet in
    ///   cache is inserted fresh (the push can arrive before any query has
    ///   populated it).
    ///
    /// # Errors
    ///
    /// Returns a [`CacheError`] when the payload cannot be folded in; the
    /// cache is left as it was.
    #[instrument(skip_all, fields(order_id = %event.order().id))]
    pub fn apply(&self, event: &RealtimeEvent) -> Result<(), CacheError> {
        let key = self.upsert_order(event)?;

        if let RealtimeEvent::NewOrder(order) = event {
            debug!(order_number = %order.order_number, "new order pushed");
            self.cache.prepend_entity_ref(&self.orders_root, &key)?;
        }

        Ok(())
    }

    fn upsert_order(&self, event: &RealtimeEvent) -> Result<EntityKey, CacheError> {
        let value = serde_json::to_value(event.order())
            .map_err(|e| CacheError::Encode(e.to_string()))?;
        self.cache.upsert_entity(ORDER_TYPENAME, &value, "_id")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clementine_core::{Order, OrderStatus, PaymentStatus};
    use serde_json::json;

    fn order(id: &str, status: &str, payment: &str) -> Order {
        serde_json::from_value(json!({
            "_id": id,
            "orderNumber": format!("ORD-{id}"),
            "customerId": "c1",
            "items": [{"productId": "p1", "productName": "Mug", "quantity": 1, "price": "12.00"}],
            "total": "12.00",
            "status": status,
            "paymentStatus": payment,
            "createdAt": "2025-11-02T09:30:00Z",
            "updatedAt": "2025-11-02T09:30:00Z"
        }))
        .unwrap()
    }

    fn engine() -> (NormalizedCache, ReconciliationEngine) {
        let cache = NormalizedCache::new();
        let engine = ReconciliationEngine::new(cache.clone(), &StoreId::new("s1"));
        (cache, engine)
    }

    #[test]
    fn test_status_update_is_idempotent() {
        let (cache, engine) = engine();
        let event = RealtimeEvent::OrderStatusUpdated(order("o1", "SHIPPED", "PAID"));

        engine.apply(&event).unwrap();
        let first = cache.read_entity(&EntityKey::new("Order", "o1")).unwrap();

        engine.apply(&event).unwrap();
        let second = cache.read_entity(&EntityKey::new("Order", "o1")).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_upsert_before_query_creates_entity() {
        let (cache, engine) = engine();
        let event = RealtimeEvent::OrderStatusUpdated(order("o3", "PROCESSING", "PENDING"));

        engine.apply(&event).unwrap();

        let entity = cache.read_entity(&EntityKey::new("Order", "o3")).unwrap();
        assert_eq!(entity["status"], "PROCESSING");
        assert_eq!(entity["orderNumber"], "ORD-o3");
        // Exactly the payload's fields: nothing optional was invented.
        assert!(entity.get("shippingAddress").is_none());
    }

    #[test]
    fn test_new_order_prepends_to_cached_list() {
        let (cache, engine) = engine();
        let existing = serde_json::to_value(order("o1", "PENDING", "PENDING")).unwrap();
        cache
            .write_entity_list_root(&store_orders_root(&StoreId::new("s1")), "Order", &[existing], "_id")
            .unwrap();

        let event = RealtimeEvent::NewOrder(order("ORD-2001", "PENDING", "PENDING"));
        engine.apply(&event).unwrap();

        let list = cache.read_root(&store_orders_root(&StoreId::new("s1"))).unwrap();
        let rows = list.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["_id"], "ORD-2001");
    }

    #[test]
    fn test_duplicate_new_order_does_not_duplicate_row() {
        let (cache, engine) = engine();
        cache
            .write_entity_list_root(&store_orders_root(&StoreId::new("s1")), "Order", &[], "_id")
            .unwrap();

        let event = RealtimeEvent::NewOrder(order("o9", "PENDING", "PENDING"));
        engine.apply(&event).unwrap();
        engine.apply(&event).unwrap();

        let list = cache.read_root(&store_orders_root(&StoreId::new("s1"))).unwrap();
        assert_eq!(list.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_new_order_without_cached_list_still_upserts() {
        let (cache, engine) = engine();
        let event = RealtimeEvent::NewOrder(order("o4", "PENDING", "PENDING"));
        engine.apply(&event).unwrap();

        assert!(cache.read_entity(&EntityKey::new("Order", "o4")).is_some());
        assert!(cache.read_root(&store_orders_root(&StoreId::new("s1"))).is_none());
    }

    #[test]
    fn test_last_applied_wins_for_same_order() {
        let (cache, engine) = engine();
        engine
            .apply(&RealtimeEvent::OrderStatusUpdated(order("o1", "SHIPPED", "PAID")))
            .unwrap();
        engine
            .apply(&RealtimeEvent::OrderStatusUpdated(order("o1", "PROCESSING", "PAID")))
            .unwrap();

        let entity = cache.read_entity(&EntityKey::new("Order", "o1")).unwrap();
        assert_eq!(entity["status"], "PROCESSING");
    }

    #[test]
    fn test_payment_update_preserves_items() {
        let (cache, engine) = engine();
        engine
            .apply(&RealtimeEvent::NewOrder(order("o1", "PENDING", "PENDING")))
            .unwrap();
        engine
            .apply(&RealtimeEvent::OrderPaymentUpdated(order("o1", "PENDING", "PAID")))
            .unwrap();

        let entity = cache.read_entity(&EntityKey::new("Order", "o1")).unwrap();
        let parsed: Order = serde_json::from_value(entity).unwrap();
        assert_eq!(parsed.payment_status, PaymentStatus::Paid);
        assert_eq!(parsed.status, OrderStatus::Pending);
        assert_eq!(parsed.items.len(), 1);
    }
}
