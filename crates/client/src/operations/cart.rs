//! Cart operations.
//!
//! Every cart mutation returns the full updated cart, and every merge here
//! replaces the cart root entirely. Patching line items locally would have
//! to reimplement the server's totals logic; replacing cannot drift.

use serde_json::{Value, json};
use tracing::instrument;

use clementine_core::Cart;

use crate::cache::MergePolicy;
use crate::client::StorefrontClient;
use crate::error::ClientError;

use super::root_field;

/// Cache root for the customer's cart.
pub const CART_ROOT: &str = "cart";

const CART_FIELDS: &str = r"
            id
            items {
                id
                quantity
                product {
                    id
                    name
                    price
                    imageUrl
                }
            }
            totalItems
            totalAmount
";

fn cart_document(header: &str, field: &str) -> String {
    format!("{header} {{ {field} {{ {CART_FIELDS} }} }}")
}

impl StorefrontClient {
    /// Get the current cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn cart(&self) -> Result<Cart, ClientError> {
        let document = cart_document("query GetCart", "cart");
        let data = self.transport().execute(&document, json!({})).await?;
        let payload = root_field(&data, "cart")?;

        self.cache()
            .write_root(CART_ROOT, payload.clone(), MergePolicy::Replace);
        Ok(serde_json::from_value(payload.clone())?)
    }

    /// Add a product to the cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutation fails; the cached cart is untouched.
    #[instrument(skip(self), fields(product_id = %product_id, quantity))]
    pub async fn add_to_cart(&self, product_id: &str, quantity: u32) -> Result<Cart, ClientError> {
        let document =
            cart_document("mutation AddToCart($input: AddToCartInput!)", "addToCart(input: $input)");
        let variables = json!({ "input": { "productId": product_id, "quantity": quantity } });
        self.cart_mutation(&document, variables, "addToCart").await
    }

    /// Change a cart line's quantity.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutation fails; the cached cart is untouched.
    #[instrument(skip(self), fields(item_id = %item_id, quantity))]
    pub async fn update_cart_item(&self, item_id: &str, quantity: u32) -> Result<Cart, ClientError> {
        let document = cart_document(
            "mutation UpdateCartItem($itemId: ID!, $quantity: Int!)",
            "updateCartItem(itemId: $itemId, quantity: $quantity)",
        );
        let variables = json!({ "itemId": item_id, "quantity": quantity });
        self.cart_mutation(&document, variables, "updateCartItem").await
    }

    /// Remove a line from the cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutation fails; the cached cart is untouched.
    #[instrument(skip(self), fields(item_id = %item_id))]
    pub async fn remove_from_cart(&self, item_id: &str) -> Result<Cart, ClientError> {
        let document = cart_document(
            "mutation RemoveFromCart($itemId: ID!)",
            "removeFromCart(itemId: $itemId)",
        );
        self.cart_mutation(&document, json!({ "itemId": item_id }), "removeFromCart")
            .await
    }

    async fn cart_mutation(
        &self,
        document: &str,
        variables: Value,
        field: &'static str,
    ) -> Result<Cart, ClientError> {
        let data = self
            .executor()
            .execute(document, variables, |cache, data| {
                let payload = data
                    .get(field)
                    .filter(|v| !v.is_null())
                    .ok_or_else(|| crate::cache::CacheError::MissingField(field.to_owned()))?;
                cache.write_root(CART_ROOT, payload.clone(), MergePolicy::Replace);
                Ok(())
            })
            .await?;

        Ok(serde_json::from_value(
            root_field(&data, field)?.clone(),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_document_shape() {
        let document = cart_document("query GetCart", "cart");
        assert!(document.starts_with("query GetCart {"));
        assert!(document.contains("totalAmount"));

        let document = cart_document(
            "mutation RemoveFromCart($itemId: ID!)",
            "removeFromCart(itemId: $itemId)",
        );
        assert!(document.contains("removeFromCart(itemId: $itemId) {"));
    }
}
