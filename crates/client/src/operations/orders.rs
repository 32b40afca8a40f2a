//! Customer order operations: history, detail, checkout.

use serde::Serialize;
use serde_json::json;
use tracing::instrument;

use clementine_core::Order;

use crate::client::StorefrontClient;
use crate::error::ClientError;
use crate::reconcile::ORDER_TYPENAME;

use super::{root_field, root_list};

/// Cache root for the customer's order history.
pub const ORDERS_ROOT: &str = "orders";

pub(crate) const ORDER_FIELDS: &str = r"
            _id
            orderNumber
            customerId
            customerName
            customerEmail
            items {
                productId
                productName
                quantity
                price
                variantId
                variantName
                imageUrl
            }
            total
            status
            paymentStatus
            shippingAddress {
                street
                city
                state
                zipCode
                country
            }
            addressId
            createdAt
            updatedAt
";

fn order_document(header: &str, field: &str) -> String {
    format!("{header} {{ {field} {{ {ORDER_FIELDS} }} }}")
}

/// Checkout input.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderInput {
    pub address_id: String,
    pub payment_method: String,
}

impl StorefrontClient {
    /// Get the customer's order history, newest first.
    ///
    /// The list root is replace-policy: each fetch discards the previous
    /// list wholesale.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn orders(&self) -> Result<Vec<Order>, ClientError> {
        let document = order_document("query GetOrders", "orders");
        let data = self.transport().execute(&document, json!({})).await?;
        let items = root_list(&data, "orders")?;

        self.cache()
            .write_entity_list_root(ORDERS_ROOT, ORDER_TYPENAME, items, "_id")?;

        Ok(serde_json::from_value(serde_json::Value::Array(
            items.to_vec(),
        ))?)
    }

    /// Get one order by id.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] when the order does not exist, or
    /// the request error.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn order(&self, order_id: &str) -> Result<Order, ClientError> {
        let document = order_document("query GetOrder($id: ID!)", "order(id: $id)");
        let data = self
            .transport()
            .execute(&document, json!({ "id": order_id }))
            .await?;

        let payload = root_field(&data, "order")
            .map_err(|_| ClientError::NotFound(format!("order not found: {order_id}")))?;

        self.cache().upsert_entity(ORDER_TYPENAME, payload, "_id")?;
        Ok(serde_json::from_value(payload.clone())?)
    }

    /// Place an order from the current cart.
    ///
    /// The returned order is upserted and prepended to the cached order
    /// history, so an open history view shows it without a refetch.
    ///
    /// # Errors
    ///
    /// Returns an error if checkout fails; the cache is untouched.
    #[instrument(skip_all)]
    pub async fn place_order(&self, input: PlaceOrderInput) -> Result<Order, ClientError> {
        let document = order_document(
            "mutation PlaceOrder($input: PlaceOrderInput!)",
            "placeOrder(input: $input)",
        );

        let data = self
            .executor()
            .execute(&document, json!({ "input": input }), |cache, data| {
                let payload = data
                    .get("placeOrder")
                    .filter(|v| !v.is_null())
                    .ok_or_else(|| crate::cache::CacheError::MissingField("placeOrder".to_owned()))?;
                let key = cache.upsert_entity(ORDER_TYPENAME, payload, "_id")?;
                cache.prepend_entity_ref(ORDERS_ROOT, &key)
            })
            .await?;

        Ok(serde_json::from_value(
            root_field(&data, "placeOrder")?.clone(),
        )?)
    }
}
