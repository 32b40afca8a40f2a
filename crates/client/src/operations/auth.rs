//! Authentication operations: login, register, logout, profile.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use clementine_core::User;

use crate::auth::Credential;
use crate::cache::MergePolicy;
use crate::client::StorefrontClient;
use crate::error::ClientError;

use super::root_field;

const LOGIN: &str = r"
    mutation Login($input: LoginInput!) {
        login(input: $input) {
            token
            refreshToken
            user {
                id
                email
                firstName
                lastName
                role
            }
        }
    }
";

const REGISTER: &str = r"
    mutation Register($input: RegisterInput!) {
        register(input: $input) {
            token
            refreshToken
            user {
                id
                email
                firstName
                lastName
                role
            }
        }
    }
";

const LOGOUT: &str = r"
    mutation Logout {
        logout {
            success
        }
    }
";

const GET_PROFILE: &str = r"
    query GetProfile {
        me {
            id
            email
            firstName
            lastName
            role
        }
    }
";

/// Input for account registration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthPayload {
    token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    user: User,
}

impl StorefrontClient {
    /// Authenticate and store the returned credential.
    ///
    /// # Errors
    ///
    /// Returns the server's error verbatim; invalid credentials arrive as a
    /// `BAD_USER_INPUT` GraphQL error and are never retried.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn login(&self, email: &str, password: &str) -> Result<User, ClientError> {
        let data = self
            .transport()
            .execute(LOGIN, json!({ "input": { "email": email, "password": password } }))
            .await?;

        self.store_session(root_field(&data, "login")?)
    }

    /// Create an account and store the returned credential.
    ///
    /// # Errors
    ///
    /// Returns an error if registration fails.
    #[instrument(skip_all, fields(email = %input.email))]
    pub async fn register(&self, input: RegisterInput) -> Result<User, ClientError> {
        let data = self
            .transport()
            .execute(REGISTER, json!({ "input": input }))
            .await?;

        self.store_session(root_field(&data, "register")?)
    }

    /// End the session.
    ///
    /// Local credentials and cached state are destroyed even when the
    /// server call fails; the server error is still reported so the UI can
    /// surface it.
    ///
    /// # Errors
    ///
    /// Returns the logout mutation's error, after local state is cleared.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), ClientError> {
        let result = self.transport().execute(LOGOUT, json!({})).await;

        self.tokens().clear();
        self.cache().clear();
        self.catalog().invalidate_all().await;

        result.map(drop)
    }

    /// Fetch the authenticated user's profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn me(&self) -> Result<User, ClientError> {
        let data = self.transport().execute(GET_PROFILE, json!({})).await?;
        let payload = root_field(&data, "me")?;

        self.cache().write_root("me", payload.clone(), MergePolicy::Replace);
        Ok(serde_json::from_value(payload.clone())?)
    }

    fn store_session(&self, payload: &serde_json::Value) -> Result<User, ClientError> {
        let auth: AuthPayload = serde_json::from_value(payload.clone())?;

        self.tokens()
            .set(Credential::new(auth.token, auth.refresh_token));
        self.cache()
            .write_root("me", serde_json::to_value(&auth.user)?, MergePolicy::Replace);

        Ok(auth.user)
    }
}
