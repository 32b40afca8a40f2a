//! Saved-address operations.

use serde::Serialize;
use serde_json::json;
use tracing::instrument;

use clementine_core::Address;

use crate::cache::EntityKey;
use crate::client::StorefrontClient;
use crate::error::ClientError;

use super::{root_field, root_list};

/// Cache typename for addresses.
pub const ADDRESS_TYPENAME: &str = "Address";

/// Cache root for the user's saved addresses.
pub const ADDRESSES_ROOT: &str = "addresses";

const ADDRESS_FIELDS: &str = r"
            _id
            street
            city
            state
            zipCode
            apartment
            userId
            isDefault
            label
";

fn address_document(header: &str, field: &str) -> String {
    format!("{header} {{ {field} {{ {ADDRESS_FIELDS} }} }}")
}

const DELETE_ADDRESS: &str = r"
    mutation DeleteAddress($id: ID!) {
        deleteAddress(id: $id) {
            _id
            success
        }
    }
";

/// Input for creating or updating an address.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressInput {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apartment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub is_default: bool,
}

impl StorefrontClient {
    /// Get the user's saved addresses.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn addresses(&self) -> Result<Vec<Address>, ClientError> {
        let document = address_document(
            "query GetAddresses($filter: AddressFilterInput)",
            "addresses(filter: $filter)",
        );
        let data = self.transport().execute(&document, json!({})).await?;
        let items = root_list(&data, "addresses")?;

        self.cache()
            .write_entity_list_root(ADDRESSES_ROOT, ADDRESS_TYPENAME, items, "_id")?;

        Ok(serde_json::from_value(serde_json::Value::Array(
            items.to_vec(),
        ))?)
    }

    /// Save a new address.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutation fails; the cache is untouched.
    #[instrument(skip_all)]
    pub async fn create_address(&self, input: AddressInput) -> Result<Address, ClientError> {
        let document = address_document(
            "mutation CreateAddress($input: CreateAddressInput!)",
            "createAddress(input: $input)",
        );

        let data = self
            .executor()
            .execute(&document, json!({ "input": input }), |cache, data| {
                let payload = data
                    .get("createAddress")
                    .filter(|v| !v.is_null())
                    .ok_or_else(|| {
                        crate::cache::CacheError::MissingField("createAddress".to_owned())
                    })?;
                let key = cache.upsert_entity(ADDRESS_TYPENAME, payload, "_id")?;
                cache.prepend_entity_ref(ADDRESSES_ROOT, &key)
            })
            .await?;

        Ok(serde_json::from_value(
            root_field(&data, "createAddress")?.clone(),
        )?)
    }

    /// Update an existing address.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutation fails; the cache is untouched.
    #[instrument(skip(self, input), fields(address_id = %address_id))]
    pub async fn update_address(
        &self,
        address_id: &str,
        input: AddressInput,
    ) -> Result<Address, ClientError> {
        let document = address_document(
            "mutation UpdateAddress($id: ID!, $input: UpdateAddressInput!)",
            "updateAddress(id: $id, input: $input)",
        );

        let data = self
            .executor()
            .execute(
                &document,
                json!({ "id": address_id, "input": input }),
                |cache, data| {
                    let payload = data
                        .get("updateAddress")
                        .filter(|v| !v.is_null())
                        .ok_or_else(|| {
                            crate::cache::CacheError::MissingField("updateAddress".to_owned())
                        })?;
                    cache.upsert_entity(ADDRESS_TYPENAME, payload, "_id").map(drop)
                },
            )
            .await?;

        Ok(serde_json::from_value(
            root_field(&data, "updateAddress")?.clone(),
        )?)
    }

    /// Delete a saved address.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutation fails; the cache is untouched.
    #[instrument(skip(self), fields(address_id = %address_id))]
    pub async fn delete_address(&self, address_id: &str) -> Result<(), ClientError> {
        let key = EntityKey::new(ADDRESS_TYPENAME, address_id);

        self.executor()
            .execute(DELETE_ADDRESS, json!({ "id": address_id }), |cache, data| {
                let deleted = data
                    .pointer("/deleteAddress/success")
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(false);
                if deleted {
                    cache.remove_entity_ref(ADDRESSES_ROOT, &key)?;
                }
                Ok(())
            })
            .await
            .map(drop)
    }
}
