//! Realtime push event types.
//!
//! Inbound frames on the store WebSocket are JSON objects of the shape
//! `{"type": ..., "payload": ...}`. The tagged union below is the validated
//! form: frames that do not parse into it are dropped at the channel
//! boundary and never reach the reconciliation engine.

use serde::{Deserialize, Serialize};

use super::order::Order;

/// A push event delivered over the store's realtime channel.
///
/// Each event instance carries the full current field values of the order,
/// not a delta, which is what makes applying the same event twice a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum RealtimeEvent {
    /// A new order was placed against the store.
    #[serde(rename = "NEW_ORDER")]
    NewOrder(Order),
    /// An existing order's fulfillment status changed.
    #[serde(rename = "ORDER_STATUS_UPDATED")]
    OrderStatusUpdated(Order),
    /// An existing order's payment status changed.
    #[serde(rename = "ORDER_PAYMENT_UPDATED")]
    OrderPaymentUpdated(Order),
}

impl RealtimeEvent {
    /// The order payload carried by the event.
    #[must_use]
    pub const fn order(&self) -> &Order {
        match self {
            Self::NewOrder(order) | Self::OrderStatusUpdated(order) | Self::OrderPaymentUpdated(order) => order,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::status::{OrderStatus, PaymentStatus};

    fn order_frame(kind: &str) -> String {
        serde_json::json!({
            "type": kind,
            "payload": {
                "_id": "o7",
                "orderNumber": "ORD-2001",
                "customerId": "c1",
                "items": [],
                "total": "10.00",
                "status": "PROCESSING",
                "paymentStatus": "PENDING",
                "createdAt": "2025-11-02T09:30:00Z",
                "updatedAt": "2025-11-02T10:00:00Z"
            }
        })
        .to_string()
    }

    #[test]
    fn test_event_parses_tagged_frame() {
        let event: RealtimeEvent = serde_json::from_str(&order_frame("ORDER_STATUS_UPDATED")).unwrap();
        let RealtimeEvent::OrderStatusUpdated(order) = event else {
            panic!("wrong variant");
        };
        assert_eq!(order.order_number, "ORD-2001");
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
    }

    #[test]
    fn test_event_order_accessor() {
        let event: RealtimeEvent = serde_json::from_str(&order_frame("NEW_ORDER")).unwrap();
        assert_eq!(event.order().id.as_str(), "o7");
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let frame = r#"{"type": "CUSTOMER_UPDATED", "payload": {}}"#;
        assert!(serde_json::from_str::<RealtimeEvent>(frame).is_err());
    }
}
