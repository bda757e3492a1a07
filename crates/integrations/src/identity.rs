//! Client for the users service.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::warn;

use billing_core::ports::{IdentityError, IdentityProvider, User};
use billing_shared::config::IdentityConfig;

/// Identity provider that calls `GET {base_url}/users/{id}`.
#[derive(Debug, Clone)]
pub struct HttpIdentityClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: String,
}

impl HttpIdentityClient {
    /// Creates a client for the given service base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self, IdentityError> {
        let client =
            crate::http_client().map_err(|e| IdentityError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Creates a client from configuration.
    pub fn from_config(config: &IdentityConfig) -> Result<Self, IdentityError> {
        Self::new(config.base_url.clone())
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityClient {
    async fn get_user_by_id(&self, user_id: &str) -> Result<User, IdentityError> {
        let url = format!("{}/users/{user_id}", self.base_url);
        let response = self.client.get(&url).send().await.map_err(|e| {
            warn!(error = %e, user_id, "Identity service request failed");
            IdentityError::Unavailable(e.to_string())
        })?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(IdentityError::NotFound(user_id.to_string())),
            status if status.is_success() => {
                let user: UserResponse = response
                    .json()
                    .await
                    .map_err(|e| IdentityError::Unavailable(e.to_string()))?;
                Ok(User {
                    id: user.id,
                    email: user.email,
                })
            }
            status => {
                warn!(%status, user_id, "Identity service error");
                Err(IdentityError::Unavailable(format!("HTTP {status}")))
            }
        }
    }
}
