//! Store-owner console operations.
//!
//! The console's list roots are scoped per store and replace-policy: the
//! realtime reconciliation engine writes into the same `storeOrders:{id}`
//! root these queries populate, which is what keeps a live list view and a
//! manual refetch from ever diverging.

use serde_json::json;
use tracing::instrument;

use clementine_core::{Customer, CustomerStatus, Order, OrderStatus, StoreId};

use crate::client::StorefrontClient;
use crate::error::ClientError;
use crate::operations::orders::ORDER_FIELDS;
use crate::reconcile::{ORDER_TYPENAME, store_orders_root};

use super::root_list;

/// Cache typename for customers.
pub const CUSTOMER_TYPENAME: &str = "Customer";

/// The replace-policy root holding a store's customer list.
#[must_use]
pub fn store_customers_root(store_id: &StoreId) -> String {
    format!("storeCustomers:{store_id}")
}

const GET_STORE_CUSTOMERS: &str = r"
    query GetStoreCustomers($storeId: ID!) {
        storeCustomers(storeId: $storeId) {
            _id
            firstName
            lastName
            email
            phoneNumber
            totalOrders
            totalSpent
            lastOrderDate
            status
            tags
            notes
            createdAt
        }
    }
";

const UPDATE_ORDER_STATUS: &str = r"
    mutation UpdateOrderStatus($orderId: ID!, $status: OrderStatus!) {
        updateOrderStatus(orderId: $orderId, status: $status) {
            _id
            orderNumber
            status
            updatedAt
        }
    }
";

const UPDATE_CUSTOMER_STATUS: &str = r"
    mutation UpdateCustomerStatus($customerId: ID!, $status: CustomerStatus!) {
        updateCustomerStatus(customerId: $customerId, status: $status) {
            _id
            status
        }
    }
";

const UPDATE_CUSTOMER_NOTES: &str = r"
    mutation UpdateCustomerNotes($customerId: ID!, $notes: String!) {
        updateCustomerNotes(customerId: $customerId, notes: $notes) {
            _id
            notes
        }
    }
";

impl StorefrontClient {
    /// Get a store's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(store_id = %store_id))]
    pub async fn store_orders(&self, store_id: &StoreId) -> Result<Vec<Order>, ClientError> {
        let document = format!(
            "query GetStoreOrders($storeId: ID!) {{ storeOrders(storeId: $storeId) {{ {ORDER_FIELDS} }} }}"
        );
        let data = self
            .transport()
            .execute(&document, json!({ "storeId": store_id }))
            .await?;
        let items = root_list(&data, "storeOrders")?;

        self.cache()
            .write_entity_list_root(&store_orders_root(store_id), ORDER_TYPENAME, items, "_id")?;

        Ok(serde_json::from_value(serde_json::Value::Array(
            items.to_vec(),
        ))?)
    }

    /// Get a store's customers.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(store_id = %store_id))]
    pub async fn store_customers(&self, store_id: &StoreId) -> Result<Vec<Customer>, ClientError> {
        let data = self
            .transport()
            .execute(GET_STORE_CUSTOMERS, json!({ "storeId": store_id }))
            .await?;
        let items = root_list(&data, "storeCustomers")?;

        self.cache().write_entity_list_root(
            &store_customers_root(store_id),
            CUSTOMER_TYPENAME,
            items,
            "_id",
        )?;

        Ok(serde_json::from_value(serde_json::Value::Array(
            items.to_vec(),
        ))?)
    }

    /// Move an order to a new fulfillment status.
    ///
    /// The response carries only the changed fields; the upsert overwrites
    /// those and leaves the rest of the cached order (items, totals)
    /// untouched. The UI observes the change through its cache
    /// subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutation fails; the cache is untouched.
    #[instrument(skip(self), fields(order_id = %order_id, status = ?status))]
    pub async fn update_order_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<(), ClientError> {
        let variables = json!({ "orderId": order_id, "status": status });
        self.executor()
            .execute(UPDATE_ORDER_STATUS, variables, |cache, data| {
                let payload = data
                    .get("updateOrderStatus")
                    .filter(|v| !v.is_null())
                    .ok_or_else(|| {
                        crate::cache::CacheError::MissingField("updateOrderStatus".to_owned())
                    })?;
                cache.upsert_entity(ORDER_TYPENAME, payload, "_id").map(drop)
            })
            .await
            .map(drop)
    }

    /// Change a customer's account standing.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutation fails; the cache is untouched.
    #[instrument(skip(self), fields(customer_id = %customer_id, status = ?status))]
    pub async fn update_customer_status(
        &self,
        customer_id: &str,
        status: CustomerStatus,
    ) -> Result<(), ClientError> {
        let variables = json!({ "customerId": customer_id, "status": status });
        self.executor()
            .execute(UPDATE_CUSTOMER_STATUS, variables, |cache, data| {
                let payload = data
                    .get("updateCustomerStatus")
                    .filter(|v| !v.is_null())
                    .ok_or_else(|| {
                        crate::cache::CacheError::MissingField("updateCustomerStatus".to_owned())
                    })?;
                cache.upsert_entity(CUSTOMER_TYPENAME, payload, "_id").map(drop)
            })
            .await
            .map(drop)
    }

    /// Replace the store-owner's notes on a customer.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutation fails; the cache is untouched.
    #[instrument(skip(self, notes), fields(customer_id = %customer_id))]
    pub async fn update_customer_notes(
        &self,
        customer_id: &str,
        notes: &str,
    ) -> Result<(), ClientError> {
        let variables = json!({ "customerId": customer_id, "notes": notes });
        self.executor()
            .execute(UPDATE_CUSTOMER_NOTES, variables, |cache, data| {
                let payload = data
                    .get("updateCustomerNotes")
                    .filter(|v| !v.is_null())
                    .ok_or_else(|| {
                        crate::cache::CacheError::MissingField("updateCustomerNotes".to_owned())
                    })?;
                cache.upsert_entity(CUSTOMER_TYPENAME, payload, "_id").map(drop)
            })
            .await
            .map(drop)
    }
}
