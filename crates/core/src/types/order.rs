//! Order domain types.
//!
//! Orders are the entity reconciled between GraphQL responses and realtime
//! push events, so their field names match the API wire format exactly
//! (camelCase, with `_id` as the identity field).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{AddressId, CustomerId, OrderId, ProductId, VariantId};
use super::status::{OrderStatus, PaymentStatus};

/// A single line item on an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<VariantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Shipping destination captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
}

/// An order as delivered by queries, mutations, and realtime push events.
///
/// Created by a checkout mutation or a `NEW_ORDER` push. Status moves
/// forward through server-defined transitions; the client caches whatever
/// the server reports and never rejects a transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: OrderId,
    pub order_number: String,
    pub customer_id: CustomerId,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub customer_email: String,
    pub items: Vec<OrderItem>,
    pub total: Decimal,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<ShippingAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_id: Option<AddressId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order_json() -> serde_json::Value {
        serde_json::json!({
            "_id": "o1",
            "orderNumber": "ORD-1001",
            "customerId": "c1",
            "customerName": "Ada Lovelace",
            "customerEmail": "ada@example.com",
            "items": [{
                "productId": "p1",
                "productName": "Walnut Desk Organizer",
                "quantity": 2,
                "price": "24.50",
                "imageUrl": "https://cdn.example.com/p1.jpg"
            }],
            "total": "49.00",
            "status": "PENDING",
            "paymentStatus": "PAID",
            "createdAt": "2025-11-02T09:30:00Z",
            "updatedAt": "2025-11-02T09:30:00Z"
        })
    }

    #[test]
    fn test_order_deserializes_wire_format() {
        let order: Order = serde_json::from_value(sample_order_json()).unwrap();
        assert_eq!(order.id.as_str(), "o1");
        assert_eq!(order.order_number, "ORD-1001");
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].quantity, 2);
    }

    #[test]
    fn test_order_id_round_trips_as_underscore_id() {
        let order: Order = serde_json::from_value(sample_order_json()).unwrap();
        let value = serde_json::to_value(&order).unwrap();
        assert_eq!(value["_id"], "o1");
        assert!(value.get("id").is_none());
    }

    #[test]
    fn test_order_tolerates_missing_optional_fields() {
        let mut json = sample_order_json();
        json.as_object_mut().unwrap().remove("customerName");
        json.as_object_mut().unwrap().remove("customerEmail");
        let order: Order = serde_json::from_value(json).unwrap();
        assert!(order.customer_name.is_empty());
        assert!(order.shipping_address.is_none());
    }
}
