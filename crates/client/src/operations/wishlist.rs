//! Wishlist operations.
//!
//! The wishlist is one entity holding the saved product ids; every
//! mutation returns the full updated wishlist and replaces the root.

use serde_json::{Value, json};
use tracing::instrument;

use clementine_core::Wishlist;

use crate::cache::MergePolicy;
use crate::client::StorefrontClient;
use crate::error::ClientError;

use super::root_field;

/// Cache root for the wishlist.
pub const WISHLIST_ROOT: &str = "wishlist";

const WISHLIST_FIELDS: &str = r"
            _id
            userId
            productIds
            createdAt
            updatedAt
";

fn wishlist_document(header: &str, field: &str) -> String {
    format!("{header} {{ {field} {{ {WISHLIST_FIELDS} }} }}")
}

impl StorefrontClient {
    /// Get the wishlist.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn wishlist(&self) -> Result<Wishlist, ClientError> {
        let document = wishlist_document("query GetWishlist", "wishlist");
        let data = self.transport().execute(&document, json!({})).await?;
        let payload = root_field(&data, "wishlist")?;

        self.cache()
            .write_root(WISHLIST_ROOT, payload.clone(), MergePolicy::Replace);
        Ok(serde_json::from_value(payload.clone())?)
    }

    /// Save a product to the wishlist.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutation fails; the cached wishlist is
    /// untouched.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add_to_wishlist(&self, product_id: &str) -> Result<Wishlist, ClientError> {
        let document = wishlist_document(
            "mutation AddToWishlist($productId: ID!)",
            "addToWishlist(productId: $productId)",
        );
        self.wishlist_mutation(&document, json!({ "productId": product_id }), "addToWishlist")
            .await
    }

    /// Remove a product from the wishlist.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutation fails; the cached wishlist is
    /// untouched.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove_from_wishlist(&self, product_id: &str) -> Result<Wishlist, ClientError> {
        let document = wishlist_document(
            "mutation RemoveFromWishlist($productId: ID!)",
            "removeFromWishlist(productId: $productId)",
        );
        self.wishlist_mutation(
            &document,
            json!({ "productId": product_id }),
            "removeFromWishlist",
        )
        .await
    }

    /// Empty the wishlist.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutation fails; the cached wishlist is
    /// untouched.
    #[instrument(skip(self))]
    pub async fn clear_wishlist(&self) -> Result<Wishlist, ClientError> {
        let document = wishlist_document("mutation ClearWishlist", "clearWishlist");
        self.wishlist_mutation(&document, json!({}), "clearWishlist")
            .await
    }

    async fn wishlist_mutation(
        &self,
        document: &str,
        variables: Value,
        field: &'static str,
    ) -> Result<Wishlist, ClientError> {
        let data = self
            .executor()
            .execute(document, variables, |cache, data| {
                let payload = data
                    .get(field)
                    .filter(|v| !v.is_null())
                    .ok_or_else(|| crate::cache::CacheError::MissingField(field.to_owned()))?;
                cache.write_root(WISHLIST_ROOT, payload.clone(), MergePolicy::Replace);
                Ok(())
            })
            .await?;

        Ok(serde_json::from_value(
            root_field(&data, field)?.clone(),
        )?)
    }
}
