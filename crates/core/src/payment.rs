//! Payment initiation and provider callbacks.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use billing_shared::types::Currency;

use crate::ledger::{
    Account, AccountResolver, CorrelationKey, LedgerError, LedgerService, NewTransaction,
    PaymentDetails, Transaction, Transition, Transitioned,
};
use crate::ports::PaymentProvider;

/// A payment recorded in the ledger, ready to be confirmed by the client.
#[derive(Debug, Clone, Serialize)]
pub struct InitiatedPayment {
    /// The `processing` payment transaction.
    pub transaction: Transaction,
    /// Secret the client uses to confirm the intent.
    pub client_secret: String,
}

/// Starts payments at the provider and records them.
#[derive(Clone)]
pub struct PaymentService {
    ledger: LedgerService,
    resolver: AccountResolver,
    provider: Arc<dyn PaymentProvider>,
    currency: Currency,
}

impl PaymentService {
    /// Creates a payment service charging in `currency`.
    #[must_use]
    pub fn new(
        ledger: LedgerService,
        resolver: AccountResolver,
        provider: Arc<dyn PaymentProvider>,
        currency: Currency,
    ) -> Self {
        Self {
            ledger,
            resolver,
            provider,
            currency,
        }
    }

    /// Creates a payment intent for `amount` minor units and records a
    /// `processing` payment crediting the user's account.
    ///
    /// The account gets a billing-provider customer on its first payment.
    ///
    /// # Errors
    ///
    /// - `LedgerError::InvalidInput` if `amount` is not positive
    /// - `LedgerError::ProviderUnavailable` if the provider fails
    pub async fn initiate_payment(
        &self,
        user_id: &str,
        amount: i64,
    ) -> Result<InitiatedPayment, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidInput(format!(
                "payment amount must be positive, got {amount}"
            )));
        }

        let account = self.resolver.get_or_create(user_id).await?;

        let customer_ref = match account.customer_ref.clone() {
            Some(customer_ref) => customer_ref,
            None => self.attach_customer(&account).await?,
        };

        let intent = self
            .provider
            .create_intent(amount, self.currency, &customer_ref)
            .await?;

        let transaction = self
            .ledger
            .create_transaction(NewTransaction::payment(
                account.id,
                amount,
                PaymentDetails {
                    intent_id: Some(intent.id.clone()),
                    client_secret: Some(intent.client_secret.clone()),
                    status: Some(intent.status),
                    checkout_session_id: None,
                },
            ))
            .await?;

        info!(
            tx_id = %transaction.id,
            intent_id = %intent.id,
            user_id,
            amount,
            "payment initiated"
        );

        Ok(InitiatedPayment {
            transaction,
            client_secret: intent.client_secret,
        })
    }

    /// Creates a provider customer and stores it on the account, unless a
    /// concurrent payment stored one first. The stored reference wins.
    async fn attach_customer(&self, account: &Account) -> Result<String, LedgerError> {
        let created = self.provider.create_customer(&account.email).await?;

        let mut scope = self.ledger.store().begin().await?;
        let current = scope.account_for_update(account.id).await?;
        if let Some(existing) = current.customer_ref {
            scope.rollback().await?;
            warn!(
                account_id = %account.id,
                customer_ref = %existing,
                unused = %created,
                "billing customer attached concurrently, discarding new one"
            );
            return Ok(existing);
        }

        scope.set_account_customer_ref(account.id, &created).await?;
        scope.commit().await?;
        info!(account_id = %account.id, "billing customer attached");
        Ok(created)
    }

    /// Settles the payment for an intent the provider reports as succeeded.
    ///
    /// Returns `None` for intents the ledger does not know.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::StoreUnavailable` on storage failure.
    pub async fn handle_intent_succeeded(
        &self,
        intent_id: &str,
    ) -> Result<Option<Transitioned>, LedgerError> {
        let key = CorrelationKey::PaymentIntent(intent_id.to_string());
        match self
            .ledger
            .apply_by_correlation_key(&key, Transition::Succeed)
            .await
        {
            Ok(result) => Ok(Some(result)),
            Err(err) if err.is_not_found() => {
                warn!(intent_id, "no transaction for succeeded intent");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}
