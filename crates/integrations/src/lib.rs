//! HTTP clients for the ledger's external collaborators.
//!
//! - `StripeClient` implements `PaymentProvider` against the Stripe REST API
//! - `HttpIdentityClient` implements `IdentityProvider` against the users service

pub mod identity;
pub mod stripe;

pub use identity::HttpIdentityClient;
pub use stripe::StripeClient;

use std::time::Duration;

/// Timeout applied to every outbound request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()
}
