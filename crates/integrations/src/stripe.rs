//! Stripe REST client.
//!
//! Requests are form-encoded and authenticated with the secret key as a
//! bearer token. 4xx answers become `ProviderError::Rejected`; transport
//! failures, 5xx answers and undecodable bodies become
//! `ProviderError::Unavailable`.

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use billing_core::ledger::PaymentIntentStatus;
use billing_core::ports::{PaymentIntent, PaymentProvider, ProviderError};
use billing_shared::config::PaymentProviderConfig;
use billing_shared::types::Currency;

/// Payment provider backed by the Stripe API.
#[derive(Debug, Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct CustomerResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    #[serde(default)]
    client_secret: Option<String>,
    status: PaymentIntentStatus,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

impl StripeClient {
    /// Creates a client for the given API base URL and secret key.
    pub fn new(
        api_base: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client =
            crate::http_client().map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        })
    }

    /// Creates a client from configuration.
    pub fn from_config(config: &PaymentProviderConfig) -> Result<Self, ProviderError> {
        Self::new(config.api_base.clone(), config.secret_key.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ProviderError> {
        let response = request
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Payment provider request failed");
                ProviderError::Unavailable(e.to_string())
            })?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

    if status.is_success() {
        return serde_json::from_str(&body).map_err(|e| {
            warn!(error = %e, "Undecodable payment provider response");
            ProviderError::Unavailable(format!("invalid response body: {e}"))
        });
    }

    let message = error_message(&body).unwrap_or_else(|| format!("HTTP {status}"));
    if status.is_client_error() {
        debug!(%status, %message, "Payment provider rejected request");
        Err(ProviderError::Rejected(message))
    } else {
        warn!(%status, %message, "Payment provider error");
        Err(ProviderError::Unavailable(message))
    }
}

fn error_message(body: &str) -> Option<String> {
    let envelope: ErrorEnvelope = serde_json::from_str(body).ok()?;
    match (envelope.error.kind, envelope.error.message) {
        (Some(kind), Some(message)) => Some(format!("{kind}: {message}")),
        (None, Some(message)) => Some(message),
        (Some(kind), None) => Some(kind),
        (None, None) => None,
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_customer(&self, email: &str) -> Result<String, ProviderError> {
        let request = self
            .client
            .post(self.url("/v1/customers"))
            .form(&[("email", email)]);
        let customer: CustomerResponse = self.send(request).await?;
        Ok(customer.id)
    }

    async fn create_intent(
        &self,
        amount: i64,
        currency: Currency,
        customer_ref: &str,
    ) -> Result<PaymentIntent, ProviderError> {
        let amount = amount.to_string();
        let request = self.client.post(self.url("/v1/payment_intents")).form(&[
            ("amount", amount.as_str()),
            ("currency", currency.as_provider_code()),
            ("customer", customer_ref),
        ]);
        let intent: IntentResponse = self.send(request).await?;
        Ok(PaymentIntent {
            id: intent.id,
            client_secret: intent.client_secret.unwrap_or_default(),
            status: intent.status,
        })
    }

    async fn get_intent_status(
        &self,
        intent_id: &str,
    ) -> Result<PaymentIntentStatus, ProviderError> {
        let mut url = Url::parse(&self.url("/v1/payment_intents"))
            .map_err(|e| ProviderError::Unavailable(format!("invalid api base: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| ProviderError::Unavailable("invalid api base".to_string()))?
            .push(intent_id);
        let request = self.client.get(url);
        let intent: IntentResponse = self.send(request).await?;
        Ok(intent.status)
    }
}
