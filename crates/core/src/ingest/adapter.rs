//! Applies billing events to the ledger.
//!
//! Events are always acknowledged: failures are logged and reported in the
//! outcome instead of being returned as errors, so a bad message never
//! blocks the queue.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use billing_shared::types::{AccountId, Currency, Money, TransactionId};

use crate::ingest::events::{BillingEvent, ChunkRef, UsageCompleted};
use crate::ledger::{
    AccountResolver, LedgerError, LedgerService, NewTransaction, Transition, TransitionOutcome,
    UsageDetails,
};

/// What handling an event did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// A usage debit was recorded.
    Recorded {
        /// The new transaction.
        transaction_id: TransactionId,
    },
    /// A transaction was transitioned (or already was in the target state).
    Transitioned {
        /// The transaction.
        transaction_id: TransactionId,
        /// What changed.
        transition: TransitionOutcome,
    },
    /// An account was provisioned.
    Provisioned {
        /// The account.
        account_id: AccountId,
        /// The initial credit, if one was granted by this event.
        credit: Option<TransactionId>,
    },
    /// The event was valid but had nothing to do.
    Skipped {
        /// Why.
        reason: String,
    },
    /// The event could not be applied.
    Failed {
        /// Why.
        reason: String,
    },
}

/// Event consumer bound to the ledger.
#[derive(Clone)]
pub struct EventIngest {
    ledger: LedgerService,
    resolver: AccountResolver,
    currency: Currency,
    initial_credit: i64,
}

impl EventIngest {
    /// Creates an adapter. `initial_credit` is in minor units; zero disables it.
    #[must_use]
    pub fn new(
        ledger: LedgerService,
        resolver: AccountResolver,
        currency: Currency,
        initial_credit: i64,
    ) -> Self {
        Self {
            ledger,
            resolver,
            currency,
            initial_credit,
        }
    }

    /// Decodes and handles a JSON event.
    pub async fn handle_payload(&self, payload: &[u8]) -> IngestOutcome {
        match serde_json::from_slice::<BillingEvent>(payload) {
            Ok(event) => self.handle(event).await,
            Err(err) => {
                warn!(error = %err, "dropping malformed billing event");
                IngestOutcome::Failed {
                    reason: format!("malformed event: {err}"),
                }
            }
        }
    }

    /// Handles a decoded event.
    pub async fn handle(&self, event: BillingEvent) -> IngestOutcome {
        let event_type = event.event_type();
        debug!(event_type, "handling billing event");

        let result = match event {
            BillingEvent::UsageCompleted(usage) => self.record_usage(usage).await,
            BillingEvent::ValidationSucceeded(chunk) => {
                self.settle_chunk(&chunk, Transition::Succeed).await
            }
            BillingEvent::ValidationFailed(chunk) => {
                self.settle_chunk(&chunk, Transition::Cancel).await
            }
            BillingEvent::AccountProvisioned { user_id } => self.provision(&user_id).await,
        };

        match result {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(event_type, error = %err, "failed to apply billing event");
                IngestOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }

    async fn record_usage(&self, usage: UsageCompleted) -> Result<IngestOutcome, LedgerError> {
        for (field, value) in [
            ("user_id", &usage.user_id),
            ("client_user_id", &usage.client_user_id),
            ("stream_contract_address", &usage.stream_contract_address),
        ] {
            if value.trim().is_empty() {
                return Err(LedgerError::InvalidInput(format!("empty {field}")));
            }
        }

        let key = usage.correlation_key();
        match self.ledger.transaction_by_correlation_key(&key).await {
            Ok(existing) => {
                info!(tx_id = %existing.id, %key, "usage already recorded");
                return Ok(IngestOutcome::Skipped {
                    reason: format!("usage for {key} already recorded"),
                });
            }
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }

        let payer = self.resolver.get_or_create(&usage.user_id).await?;
        let payee = self.resolver.get_or_create(&usage.client_user_id).await?;

        let amount = usage
            .price
            .checked_mul(Decimal::from(usage.duration))
            .and_then(|major| Money::from_major(major, self.currency))
            .ok_or_else(|| {
                LedgerError::InvalidInput(format!(
                    "usage amount out of range: {} x {}",
                    usage.price, usage.duration
                ))
            })?;

        let details = UsageDetails {
            stream_id: usage.stream_id,
            stream_name: usage.stream_name,
            stream_contract_address: usage.stream_contract_address,
            stream_is_live: usage.stream_is_live,
            profile_id: usage.profile_id,
            profile_name: usage.profile_name,
            profile_cost: usage.profile_cost,
            task_id: usage.task_id,
            chunk_num: usage.chunk_num,
            duration_secs: usage.duration,
            price: usage.price,
        };

        match self
            .ledger
            .create_transaction(NewTransaction::usage_debit(
                payer.id,
                payee.id,
                amount.minor,
                details,
            ))
            .await
        {
            Ok(transaction) => Ok(IngestOutcome::Recorded {
                transaction_id: transaction.id,
            }),
            // Lost a race against a concurrent delivery of the same event.
            Err(LedgerError::Conflict(_)) => Ok(IngestOutcome::Skipped {
                reason: format!("usage for {key} already recorded"),
            }),
            Err(err) => Err(err),
        }
    }

    async fn settle_chunk(
        &self,
        chunk: &ChunkRef,
        transition: Transition,
    ) -> Result<IngestOutcome, LedgerError> {
        let result = self
            .ledger
            .apply_by_correlation_key(&chunk.correlation_key(), transition)
            .await?;

        Ok(IngestOutcome::Transitioned {
            transaction_id: result.transaction.id,
            transition: result.outcome,
        })
    }

    async fn provision(&self, user_id: &str) -> Result<IngestOutcome, LedgerError> {
        let account = self.resolver.get_or_create(user_id).await?;
        let credit = self
            .resolver
            .ensure_initial_credit(&account, self.initial_credit)
            .await?;

        Ok(IngestOutcome::Provisioned {
            account_id: account.id,
            credit: credit.map(|tx| tx.id),
        })
    }
}
