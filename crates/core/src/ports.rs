//! Traits for the external collaborators of the ledger.
//!
//! The identity service and the payment provider are only reached through
//! these traits; HTTP implementations live in `billing-integrations`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use billing_shared::types::Currency;

use crate::ledger::types::PaymentIntentStatus;

/// A user as known to the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
}

/// Errors from the identity service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    /// No such user.
    #[error("User not found: {0}")]
    NotFound(String),

    /// The service could not be reached or answered badly.
    #[error("Identity service unavailable: {0}")]
    Unavailable(String),
}

/// Looks up users by their external id.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Fetches the user with the given id.
    async fn get_user_by_id(&self, user_id: &str) -> Result<User, IdentityError>;
}

/// A payment intent created at the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
    pub status: PaymentIntentStatus,
}

/// Errors from the payment provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider refused the request.
    #[error("Payment provider rejected request: {0}")]
    Rejected(String),

    /// Transport failure or unexpected response.
    #[error("Payment provider unavailable: {0}")]
    Unavailable(String),
}

/// Payment-gateway operations used by the ledger.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Creates a customer and returns its reference.
    async fn create_customer(&self, email: &str) -> Result<String, ProviderError>;

    /// Creates a payment intent for `amount` minor units.
    async fn create_intent(
        &self,
        amount: i64,
        currency: Currency,
        customer_ref: &str,
    ) -> Result<PaymentIntent, ProviderError>;

    /// Returns the current status of an intent.
    async fn get_intent_status(&self, intent_id: &str)
    -> Result<PaymentIntentStatus, ProviderError>;
}

impl From<IdentityError> for crate::ledger::LedgerError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::NotFound(user_id) => Self::NotFound {
                entity: "user",
                key: user_id,
            },
            IdentityError::Unavailable(msg) => Self::ProviderUnavailable(msg),
        }
    }
}
