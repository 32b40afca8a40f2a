//! Review operations.

use serde_json::json;
use tracing::instrument;

use clementine_core::Review;

use crate::cache::EntityKey;
use crate::client::StorefrontClient;
use crate::error::ClientError;
use crate::operations::catalog::PRODUCT_TYPENAME;

use super::root_field;

const ADD_REVIEW: &str = r"
    mutation AddReview($productId: ID!, $rating: Int!, $comment: String) {
        addReview(productId: $productId, rating: $rating, comment: $comment) {
            id
            rating
            comment
            user {
                id
                firstName
                lastName
            }
            createdAt
        }
    }
";

impl StorefrontClient {
    /// Add a review to a product.
    ///
    /// The new review is appended to the normalized product's review list,
    /// and the TTL-cached product detail is invalidated so the next
    /// detail read refetches.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutation fails; the cache is untouched.
    #[instrument(skip(self, comment), fields(product_id = %product_id, rating))]
    pub async fn add_review(
        &self,
        product_id: &str,
        rating: u8,
        comment: Option<&str>,
    ) -> Result<Review, ClientError> {
        let variables = json!({
            "productId": product_id,
            "rating": rating,
            "comment": comment,
        });

        let product_key = EntityKey::new(PRODUCT_TYPENAME, product_id);
        let data = self
            .executor()
            .execute(ADD_REVIEW, variables, |cache, data| {
                let payload = data
                    .get("addReview")
                    .filter(|v| !v.is_null())
                    .ok_or_else(|| crate::cache::CacheError::MissingField("addReview".to_owned()))?;
                cache.append_entity_field_list(&product_key, "reviews", payload.clone())
            })
            .await?;

        self.catalog().invalidate_product(product_id).await;

        Ok(serde_json::from_value(
            root_field(&data, "addReview")?.clone(),
        )?)
    }
}
