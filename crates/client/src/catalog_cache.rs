//! TTL read-through cache for catalog responses.
//!
//! Catalog data (products, product detail) changes rarely and is read
//! constantly, so it sits behind a 5-minute TTL cache in front of the
//! network. Mutable state - carts, orders, anything the realtime channel
//! can touch - is never cached here; it lives in the normalized cache
//! only.

use std::time::Duration;

use clementine_core::Product;
use moka::future::Cache;

/// Cached catalog value types.
#[derive(Debug, Clone)]
pub enum CatalogValue {
    Product(Box<Product>),
    Products(Vec<Product>),
}

/// In-memory catalog cache (5-minute TTL, 1000 entries).
#[derive(Clone)]
pub struct CatalogCache {
    cache: Cache<String, CatalogValue>,
}

impl Default for CatalogCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogCache {
    #[must_use]
    pub fn new() -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();
        Self { cache }
    }

    pub async fn get(&self, key: &str) -> Option<CatalogValue> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: String, value: CatalogValue) {
        self.cache.insert(key, value).await;
    }

    /// Invalidate a cached product detail.
    pub async fn invalidate_product(&self, product_id: &str) {
        self.cache.invalidate(&format!("product:{product_id}")).await;
    }

    /// Invalidate all cached catalog data.
    pub async fn invalidate_all(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }
}

/// Cache key for a product detail read.
#[must_use]
pub fn product_key(product_id: &str) -> String {
    format!("product:{product_id}")
}

/// Cache key for a product list read.
#[must_use]
pub fn products_key(category: Option<&str>, search: Option<&str>) -> String {
    format!(
        "products:{}:{}",
        category.unwrap_or_default(),
        search.unwrap_or_default()
    )
}
