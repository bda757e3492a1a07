//! Test doubles for the external providers.
//!
//! Available to other crates through the `test-util` feature.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use billing_shared::types::Currency;

use crate::ledger::PaymentIntentStatus;
use crate::ports::{
    IdentityError, IdentityProvider, PaymentIntent, PaymentProvider, ProviderError, User,
};

/// Identity provider backed by a fixed set of users.
#[derive(Debug, Default)]
pub struct StaticIdentityProvider {
    users: HashMap<String, User>,
}

impl StaticIdentityProvider {
    /// Creates a provider with no users.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a user.
    #[must_use]
    pub fn with_user(mut self, id: &str, email: &str) -> Self {
        self.users.insert(
            id.to_string(),
            User {
                id: id.to_string(),
                email: email.to_string(),
            },
        );
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn get_user_by_id(&self, user_id: &str) -> Result<User, IdentityError> {
        self.users
            .get(user_id)
            .cloned()
            .ok_or_else(|| IdentityError::NotFound(user_id.to_string()))
    }
}

/// Payment provider whose intent statuses are set by the test.
///
/// New intents start as `requires_payment_method`.
#[derive(Debug, Default)]
pub struct ScriptedPaymentProvider {
    next_id: AtomicU64,
    customers: AtomicU64,
    fail_next_intent: AtomicBool,
    statuses: Mutex<HashMap<String, PaymentIntentStatus>>,
    intent_customers: Mutex<HashMap<String, String>>,
    unavailable: Mutex<HashSet<String>>,
}

impl ScriptedPaymentProvider {
    /// Creates a provider with no intents.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the status reported for an intent.
    pub fn set_status(&self, intent_id: &str, status: PaymentIntentStatus) {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(intent_id.to_string(), status);
    }

    /// Makes status lookups for an intent fail.
    pub fn set_unavailable(&self, intent_id: &str) {
        self.unavailable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(intent_id.to_string());
    }

    /// Makes the next `create_intent` call fail.
    pub fn fail_next_intent(&self) {
        self.fail_next_intent.store(true, Ordering::SeqCst);
    }

    /// Customer reference an intent was created for.
    #[must_use]
    pub fn customer_of(&self, intent_id: &str) -> Option<String> {
        self.intent_customers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(intent_id)
            .cloned()
    }

    /// Number of customers created so far.
    #[must_use]
    pub fn customers_created(&self) -> u64 {
        self.customers.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentProvider for ScriptedPaymentProvider {
    async fn create_customer(&self, _email: &str) -> Result<String, ProviderError> {
        // Let concurrent callers interleave as they would over the network.
        tokio::task::yield_now().await;
        let n = self.customers.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("cus_{n}"))
    }

    async fn create_intent(
        &self,
        _amount: i64,
        _currency: Currency,
        customer_ref: &str,
    ) -> Result<PaymentIntent, ProviderError> {
        if self.fail_next_intent.swap(false, Ordering::SeqCst) {
            return Err(ProviderError::Unavailable("scripted failure".to_string()));
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("pi_{n}");
        let status = PaymentIntentStatus::RequiresPaymentMethod;
        self.set_status(&id, status);
        self.intent_customers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), customer_ref.to_string());

        Ok(PaymentIntent {
            client_secret: format!("{id}_secret"),
            id,
            status,
        })
    }

    async fn get_intent_status(
        &self,
        intent_id: &str,
    ) -> Result<PaymentIntentStatus, ProviderError> {
        if self
            .unavailable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(intent_id)
        {
            return Err(ProviderError::Unavailable(format!(
                "status lookup for {intent_id} failed"
            )));
        }

        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(intent_id)
            .copied()
            .ok_or_else(|| ProviderError::Rejected(format!("no such intent: {intent_id}")))
    }
}
