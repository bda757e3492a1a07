//! Application configuration management.

use std::time::Duration;

use serde::Deserialize;

use crate::types::Currency;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Ledger behaviour.
    #[serde(default)]
    pub billing: BillingConfig,
    /// Background reconciliation schedule.
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    /// Payment provider credentials.
    #[serde(default)]
    pub payment_provider: PaymentProviderConfig,
    /// Identity (users) service.
    #[serde(default)]
    pub identity: IdentityConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Ledger configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Currency used for payments and usage charges.
    #[serde(default = "default_currency")]
    pub currency: Currency,
    /// Credit granted to newly provisioned accounts, in minor units. Zero disables it.
    #[serde(default)]
    pub initial_credit_minor: i64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            initial_credit_minor: 0,
        }
    }
}

fn default_currency() -> Currency {
    Currency::Usd
}

/// Reconciliation schedule.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcilerConfig {
    /// How often one claimed payment is checked against the provider.
    #[serde(default = "default_payment_check_interval")]
    pub payment_check_interval_secs: u64,
    /// How often stale claims are swept.
    #[serde(default = "default_stale_sweep_interval")]
    pub stale_sweep_interval_secs: u64,
    /// Age after which a claim counts as stale.
    #[serde(default = "default_stale_claim_age")]
    pub stale_claim_age_secs: u64,
}

impl ReconcilerConfig {
    /// Payment check interval as a `Duration`.
    #[must_use]
    pub const fn payment_check_interval(&self) -> Duration {
        Duration::from_secs(self.payment_check_interval_secs)
    }

    /// Stale sweep interval as a `Duration`.
    #[must_use]
    pub const fn stale_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.stale_sweep_interval_secs)
    }

    /// Stale claim age as a `Duration`.
    #[must_use]
    pub const fn stale_claim_age(&self) -> Duration {
        Duration::from_secs(self.stale_claim_age_secs)
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            payment_check_interval_secs: default_payment_check_interval(),
            stale_sweep_interval_secs: default_stale_sweep_interval(),
            stale_claim_age_secs: default_stale_claim_age(),
        }
    }
}

fn default_payment_check_interval() -> u64 {
    300 // 5 minutes
}

fn default_stale_sweep_interval() -> u64 {
    60
}

fn default_stale_claim_age() -> u64 {
    60
}

/// Payment provider configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentProviderConfig {
    /// REST API base URL.
    #[serde(default = "default_provider_api_base")]
    pub api_base: String,
    /// Secret API key.
    #[serde(default)]
    pub secret_key: String,
    /// Secret used to sign webhook payloads.
    #[serde(default)]
    pub webhook_secret: String,
    /// Maximum accepted age of a signed webhook, in seconds.
    #[serde(default = "default_webhook_tolerance")]
    pub webhook_tolerance_secs: u64,
}

impl Default for PaymentProviderConfig {
    fn default() -> Self {
        Self {
            api_base: default_provider_api_base(),
            secret_key: String::new(),
            webhook_secret: String::new(),
            webhook_tolerance_secs: default_webhook_tolerance(),
        }
    }
}

fn default_provider_api_base() -> String {
    "https://api.stripe.com".to_string()
}

fn default_webhook_tolerance() -> u64 {
    300
}

/// Identity service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Base URL of the users service.
    #[serde(default = "default_identity_base_url")]
    pub base_url: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            base_url: default_identity_base_url(),
        }
    }
}

fn default_identity_base_url() -> String {
    "http://127.0.0.1:5001".to_string()
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(
                config::Environment::with_prefix("BILLING")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
