//! Cart types.
//!
//! The cart is mutable server state: every cart mutation returns the full
//! updated cart, and the client replaces its cached cart wholesale rather
//! than patching line items locally.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{CartId, CartItemId, ProductId};

/// The product summary embedded in a cart line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartProduct {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// A line item in the cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub quantity: u32,
    pub product: CartProduct,
}

/// The customer's cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub id: CartId,
    pub items: Vec<CartItem>,
    pub total_items: u32,
    pub total_amount: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_wire_format() {
        let json = serde_json::json!({
            "id": "cart-1",
            "items": [{
                "id": "line-1",
                "quantity": 3,
                "product": {"id": "p1", "name": "Ceramic Mug", "price": "12.00"}
            }],
            "totalItems": 3,
            "totalAmount": "36.00"
        });
        let cart: Cart = serde_json::from_value(json).unwrap();
        assert_eq!(cart.total_items, 3);
        assert_eq!(cart.items[0].product.name, "Ceramic Mug");
    }
}
