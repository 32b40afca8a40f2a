//! User, customer, address, and wishlist types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{AddressId, CustomerId, ProductId, UserId, WishlistId};
use super::status::{CustomerStatus, Role};

/// The authenticated user's own profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub role: Role,
}

/// A saved shipping address on the user's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(rename = "_id")]
    pub id: AddressId,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apartment: Option<String>,
    pub user_id: UserId,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Store-owner view of a customer, with aggregate purchase history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[serde(rename = "_id")]
    pub id: CustomerId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub total_orders: u32,
    #[serde(default)]
    pub total_spent: Decimal,
    #[serde(default)]
    pub last_order_date: Option<DateTime<Utc>>,
    pub status: CustomerStatus,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// The user's wishlist: one entity holding the saved product ids.
///
/// Every wishlist mutation returns the full updated wishlist, which
/// replaces the cached one wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wishlist {
    #[serde(rename = "_id")]
    pub id: WishlistId,
    pub user_id: UserId,
    pub product_ids: Vec<ProductId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Wishlist {
    /// Whether a product is saved.
    #[must_use]
    pub fn contains(&self, product_id: &ProductId) -> bool {
        self.product_ids.contains(product_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_customer_wire_format() {
        let json = serde_json::json!({
            "_id": "c9",
            "firstName": "Grace",
            "lastName": "Hopper",
            "email": "grace@example.com",
            "totalOrders": 12,
            "totalSpent": "420.00",
            "status": "ACTIVE",
            "tags": ["vip"]
        });
        let customer: Customer = serde_json::from_value(json).unwrap();
        assert_eq!(customer.id.as_str(), "c9");
        assert_eq!(customer.status, CustomerStatus::Active);
        assert_eq!(customer.tags, vec!["vip"]);
    }

    #[test]
    fn test_user_defaults_to_user_role() {
        let json = serde_json::json!({"id": "u1", "email": "a@b.c"});
        let user: User = serde_json::from_value(json).unwrap();
        assert_eq!(user.role, Role::User);
    }

    #[test]
    fn test_address_wire_format() {
        let json = serde_json::json!({
            "_id": "a1",
            "street": "12 Main St",
            "city": "Portland",
            "state": "OR",
            "zipCode": "97201",
            "userId": "u1",
            "isDefault": true
        });
        let address: Address = serde_json::from_value(json).unwrap();
        assert!(address.is_default);
        assert!(address.apartment.is_none());
    }

    #[test]
    fn test_wishlist_contains() {
        let json = serde_json::json!({
            "_id": "w1",
            "userId": "u1",
            "productIds": ["p1", "p2"]
        });
        let wishlist: Wishlist = serde_json::from_value(json).unwrap();
        assert!(wishlist.contains(&ProductId::new("p1")));
        assert!(!wishlist.contains(&ProductId::new("p9")));
    }
}
