//! One reconciliation step at a time.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use billing_shared::types::TransactionId;

use crate::ledger::{LedgerError, LedgerService, Lifecycle, StoreError, TransitionOutcome};
use crate::ports::PaymentProvider;

/// Result of one payment check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CheckOutcome {
    /// No transaction was waiting for a check.
    Idle,
    /// A transaction was checked against the provider.
    Checked {
        /// The claimed transaction.
        transaction_id: TransactionId,
        /// What the provider's answer changed.
        outcome: TransitionOutcome,
    },
}

/// Checks processing payments against the payment provider.
pub struct Reconciler {
    ledger: LedgerService,
    provider: Arc<dyn PaymentProvider>,
    stale_claim_age: chrono::Duration,
}

impl Reconciler {
    /// Creates a reconciler. Claims older than `stale_claim_age` are released
    /// by [`Reconciler::sweep_stale_claims`].
    #[must_use]
    pub fn new(
        ledger: LedgerService,
        provider: Arc<dyn PaymentProvider>,
        stale_claim_age: chrono::Duration,
    ) -> Self {
        Self {
            ledger,
            provider,
            stale_claim_age,
        }
    }

    /// Claims the payment checked longest ago, asks the provider for its
    /// intent status and applies the result.
    ///
    /// The claim is released afterwards whether or not the check succeeded.
    ///
    /// # Errors
    ///
    /// - `LedgerError::ProviderUnavailable` if the status lookup fails
    /// - `LedgerError::StoreUnavailable` on storage failure
    pub async fn check_next_payment(&self) -> Result<CheckOutcome, LedgerError> {
        let claimed = {
            let mut scope = self.ledger.store().begin().await?;
            match scope.claim_next_payment_check().await {
                Ok(tx) => {
                    scope.commit().await?;
                    tx
                }
                Err(StoreError::NotFound { .. }) => {
                    debug!("no payment awaiting a check");
                    return Ok(CheckOutcome::Idle);
                }
                Err(err) => return Err(err.into()),
            }
        };

        let result = self.check(claimed.id, claimed.payment.intent_id.as_deref()).await;
        self.release(claimed.id).await;

        result.map(|outcome| CheckOutcome::Checked {
            transaction_id: claimed.id,
            outcome,
        })
    }

    /// Releases claims held longer than the stale age.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::StoreUnavailable` on storage failure.
    pub async fn sweep_stale_claims(&self) -> Result<u64, LedgerError> {
        let mut scope = self.ledger.store().begin().await?;
        let released = scope.release_stale_claims(self.stale_claim_age).await?;
        scope.commit().await?;

        if released > 0 {
            warn!(released, "released stale payment check claims");
        }
        Ok(released)
    }

    async fn check(
        &self,
        id: TransactionId,
        intent_id: Option<&str>,
    ) -> Result<TransitionOutcome, LedgerError> {
        let Some(intent_id) = intent_id else {
            return Err(LedgerError::InvalidInput(format!(
                "claimed transaction {id} has no payment intent"
            )));
        };

        let status = self
            .provider
            .get_intent_status(intent_id)
            .await
            .inspect_err(|err| {
                error!(tx_id = %id, intent_id, error = %err, "payment intent status lookup failed");
            })?;

        let transition = Lifecycle::for_provider_status(status);
        let result = self.ledger.transition(id, transition).await?;
        if result.outcome.is_applied() {
            info!(tx_id = %id, intent_id, payment_status = %status, "payment reconciled");
        }
        Ok(result.outcome)
    }

    async fn release(&self, id: TransactionId) {
        let released = async {
            let mut scope = self.ledger.store().begin().await?;
            scope.release_claim(id).await?;
            scope.commit().await
        }
        .await;

        if let Err(err) = released {
            error!(tx_id = %id, error = %err, "failed to release payment check claim");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{
        InMemoryLedgerStore, NewTransaction, PaymentDetails, PaymentIntentStatus,
        TransactionStatus,
    };
    use crate::testing::ScriptedPaymentProvider;
    use billing_shared::types::AccountId;
    use futures::future::join_all;

    struct Fixture {
        ledger: LedgerService,
        provider: Arc<ScriptedPaymentProvider>,
        reconciler: Arc<Reconciler>,
    }

    fn fixture(stale_claim_age: chrono::Duration) -> Fixture {
        let ledger = LedgerService::new(Arc::new(InMemoryLedgerStore::new()));
        let provider = Arc::new(ScriptedPaymentProvider::new());
        let reconciler = Arc::new(Reconciler::new(
            ledger.clone(),
            provider.clone(),
            stale_claim_age,
        ));
        Fixture {
            ledger,
            provider,
            reconciler,
        }
    }

    async fn processing_payment(ledger: &LedgerService, intent: &str) -> TransactionId {
        ledger
            .create_transaction(NewTransaction::payment(
                AccountId::new(),
                1000,
                PaymentDetails {
                    intent_id: Some(intent.to_string()),
                    status: Some(PaymentIntentStatus::RequiresPaymentMethod),
                    ..PaymentDetails::default()
                },
            ))
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_idle_when_nothing_to_check() {
        let f = fixture(chrono::Duration::minutes(1));
        assert_eq!(
            f.reconciler.check_next_payment().await.unwrap(),
            CheckOutcome::Idle
        );
    }

    #[tokio::test]
    async fn test_succeeded_intent_settles_and_releases() {
        let f = fixture(chrono::Duration::minutes(1));
        let id = processing_payment(&f.ledger, "pi_ok").await;
        f.provider.set_status("pi_ok", PaymentIntentStatus::Succeeded);

        let outcome = f.reconciler.check_next_payment().await.unwrap();
        assert!(matches!(
            outcome,
            CheckOutcome::Checked { transaction_id, outcome } if transaction_id == id && outcome.is_applied()
        ));

        let tx = f.ledger.transaction(id).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Success);
        assert_eq!(tx.payment.status, Some(PaymentIntentStatus::Succeeded));
        assert!(!tx.is_locked);
    }

    #[tokio::test]
    async fn test_intermediate_status_is_mirrored() {
        let f = fixture(chrono::Duration::minutes(1));
        let id = processing_payment(&f.ledger, "pi_action").await;
        f.provider.set_status("pi_action", PaymentIntentStatus::RequiresAction);

        f.reconciler.check_next_payment().await.unwrap();

        let tx = f.ledger.transaction(id).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Processing);
        assert_eq!(tx.payment.status, Some(PaymentIntentStatus::RequiresAction));
        assert!(!tx.is_locked);
    }

    #[tokio::test]
    async fn test_provider_failure_still_releases_claim() {
        let f = fixture(chrono::Duration::minutes(1));
        let id = processing_payment(&f.ledger, "pi_down").await;
        f.provider.set_unavailable("pi_down");

        let err = f.reconciler.check_next_payment().await.unwrap_err();
        assert!(matches!(err, LedgerError::ProviderUnavailable(_)));

        let tx = f.ledger.transaction(id).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Processing);
        assert!(!tx.is_locked);
    }

    #[tokio::test]
    async fn test_concurrent_claims_are_exclusive() {
        let f = fixture(chrono::Duration::minutes(1));
        let id = processing_payment(&f.ledger, "pi_once").await;

        let claims = (0..10).map(|_| {
            let ledger = f.ledger.clone();
            tokio::spawn(async move {
                let mut scope = ledger.store().begin().await.unwrap();
                let claimed = scope.claim_next_payment_check().await.ok();
                scope.commit().await.unwrap();
                claimed.map(|tx| tx.id)
            })
        });
        let claimed: Vec<TransactionId> = join_all(claims)
            .await
            .into_iter()
            .filter_map(|joined| joined.unwrap())
            .collect();

        assert_eq!(claimed, vec![id]);
    }

    #[tokio::test]
    async fn test_sweep_recovers_abandoned_claims() {
        let f = fixture(chrono::Duration::zero());
        let id = processing_payment(&f.ledger, "pi_abandoned").await;

        // A checker that claimed and then vanished.
        let mut scope = f.ledger.store().begin().await.unwrap();
        scope.claim_next_payment_check().await.unwrap();
        scope.commit().await.unwrap();
        assert!(f.ledger.transaction(id).await.unwrap().is_locked);

        assert_eq!(f.reconciler.sweep_stale_claims().await.unwrap(), 1);

        f.provider.set_status("pi_abandoned", PaymentIntentStatus::Canceled);
        f.reconciler.check_next_payment().await.unwrap();
        assert_eq!(
            f.ledger.transaction(id).await.unwrap().status,
            TransactionStatus::Canceled
        );
    }
}
