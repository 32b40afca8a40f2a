//! Catalog operations: product lists and product detail.
//!
//! Catalog reads sit behind the TTL cache; search results are not cached
//! (the key space is unbounded and hit rates are poor). Product detail is
//! additionally normalized so review mutations can merge into it.

use serde_json::json;
use tracing::{debug, instrument};

use clementine_core::Product;

use crate::catalog_cache::{CatalogValue, product_key, products_key};
use crate::client::StorefrontClient;
use crate::error::ClientError;

use super::{root_field, root_list};

/// Cache typename for products.
pub const PRODUCT_TYPENAME: &str = "Product";

const GET_PRODUCTS: &str = r"
    query GetProducts($input: ProductsInput) {
        products(input: $input) {
            id
            name
            description
            price
            imageUrl
            category
            inStock
            attributes {
                name
                value
            }
            variants {
                id
                name
                price
            }
            createdAt
        }
    }
";

const GET_PRODUCT: &str = r"
    query GetProduct($id: ID!) {
        product(id: $id) {
            id
            name
            description
            price
            imageUrl
            category
            inStock
            attributes {
                name
                value
            }
            variants {
                id
                name
                price
            }
            reviews {
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
    }
";

impl StorefrontClient {
    /// Get the product list, optionally filtered.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn products(
        &self,
        category: Option<&str>,
        search: Option<&str>,
    ) -> Result<Vec<Product>, ClientError> {
        let cache_key = products_key(category, search);

        // Check cache (only for non-search queries)
        if search.is_none()
            && let Some(CatalogValue::Products(products)) = self.catalog().get(&cache_key).await
        {
            debug!("cache hit for products");
            return Ok(products);
        }

        let variables = json!({ "input": { "category": category, "search": search } });
        let data = self.transport().execute(GET_PRODUCTS, variables).await?;
        let products: Vec<Product> = serde_json::from_value(
            serde_json::Value::Array(root_list(&data, "products")?.to_vec()),
        )?;

        if search.is_none() {
            self.catalog()
                .insert(cache_key, CatalogValue::Products(products.clone()))
                .await;
        }

        Ok(products)
    }

    /// Get a product by id, with its embedded reviews.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] when the product does not exist,
    /// or the request error.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn product(&self, product_id: &str) -> Result<Product, ClientError> {
        let cache_key = product_key(product_id);

        if let Some(CatalogValue::Product(product)) = self.catalog().get(&cache_key).await {
            debug!("cache hit for product");
            return Ok(*product);
        }

        let data = self
            .transport()
            .execute(GET_PRODUCT, json!({ "id": product_id }))
            .await?;

        let payload = root_field(&data, "product")
            .map_err(|_| ClientError::NotFound(format!("product not found: {product_id}")))?;

        self.cache().upsert_entity(PRODUCT_TYPENAME, payload, "id")?;

        let product: Product = serde_json::from_value(payload.clone())?;
        self.catalog()
            .insert(cache_key, CatalogValue::Product(Box::new(product.clone())))
            .await;

        Ok(product)
    }
}
