//! Product catalog types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{ProductId, ReviewId, UserId, VariantId};

/// Free-form attribute on a product (e.g. "Material" / "Walnut").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductAttribute {
    pub name: String,
    pub value: String,
}

/// A purchasable variant of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: VariantId,
    pub name: String,
    pub price: Decimal,
}

/// The author of a review, as embedded in product queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewAuthor {
    pub id: UserId,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// A customer review embedded in a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: ReviewId,
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub user: Option<ReviewAuthor>,
    pub created_at: DateTime<Utc>,
}

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub in_stock: bool,
    #[serde(default)]
    pub attributes: Vec<ProductAttribute>,
    #[serde(default)]
    pub variants: Vec<ProductVariant>,
    #[serde(default)]
    pub reviews: Vec<Review>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_minimal_payload() {
        let json = serde_json::json!({
            "id": "p1",
            "name": "Ceramic Mug",
            "price": "12.00",
            "inStock": true
        });
        let product: Product = serde_json::from_value(json).unwrap();
        assert_eq!(product.id.as_str(), "p1");
        assert!(product.reviews.is_empty());
        assert!(product.variants.is_empty());
    }

    #[test]
    fn test_product_with_reviews() {
        let json = serde_json::json!({
            "id": "p2",
            "name": "Oak Shelf",
            "price": "89.99",
            "inStock": false,
            "reviews": [{
                "id": "r1",
                "rating": 5,
                "comment": "Sturdy.",
                "user": {"id": "u1", "firstName": "Ada"},
                "createdAt": "2025-10-01T12:00:00Z"
            }]
        });
        let product: Product = serde_json::from_value(json).unwrap();
        assert_eq!(product.reviews.len(), 1);
        assert_eq!(product.reviews[0].rating, 5);
    }
}
