//! Transaction status state machine.
//!
//! ```text
//!             ┌──────────── Succeed / Cancel (usage_debit only) ───────────┐
//!             │                                                            ▼
//!  pending ───┴──► processing ──── Succeed ────► success                terminal
//!     │                │  ▲ ────── Cancel  ────► canceled
//!     │                └──┘ MirrorPaymentStatus(intermediate)
//!     └──── Fail ──────┴────────── Fail ───────► failed
//! ```
//!
//! Terminal statuses never change again. Applying any transition to a
//! terminal transaction is a no-op, not an error, so replayed events and
//! webhooks are harmless.

use serde::{Deserialize, Serialize};

use crate::ledger::error::LedgerError;
use crate::ledger::types::{
    NewTransaction, PaymentIntentStatus, Transaction, TransactionKind, TransactionStatus,
};

/// A requested change to a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "status", rename_all = "snake_case")]
pub enum Transition {
    /// Settle the transaction.
    Succeed,
    /// Cancel the transaction.
    Cancel,
    /// Mark the transaction failed.
    Fail,
    /// Copy the provider's intent status onto the transaction.
    MirrorPaymentStatus(PaymentIntentStatus),
}

/// Result of planning a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TransitionOutcome {
    /// The store must write these values.
    Applied {
        /// New transaction status.
        status: TransactionStatus,
        /// New mirror value; `None` leaves the stored mirror untouched.
        payment_status: Option<PaymentIntentStatus>,
    },
    /// Nothing to write.
    Unchanged,
}

impl TransitionOutcome {
    /// Returns true if the outcome changes the row.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Stateless transition rules.
pub struct Lifecycle;

impl Lifecycle {
    /// Decides what a transition does to a transaction.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::TransitionRejected` if the transition is not
    /// allowed from the current status.
    pub fn plan(tx: &Transaction, transition: Transition) -> Result<TransitionOutcome, LedgerError> {
        if tx.status.is_terminal() {
            return Ok(TransitionOutcome::Unchanged);
        }

        match transition {
            Transition::Succeed => Self::settle(
                tx,
                TransactionStatus::Success,
                PaymentIntentStatus::Succeeded,
            ),
            Transition::Cancel => Self::settle(
                tx,
                TransactionStatus::Canceled,
                PaymentIntentStatus::Canceled,
            ),
            Transition::Fail => Ok(TransitionOutcome::Applied {
                status: TransactionStatus::Failed,
                payment_status: None,
            }),
            Transition::MirrorPaymentStatus(status) => Self::mirror(tx, status),
        }
    }

    /// Maps a provider intent status to the transition it implies.
    #[must_use]
    pub const fn for_provider_status(status: PaymentIntentStatus) -> Transition {
        match status {
            PaymentIntentStatus::Succeeded => Transition::Succeed,
            PaymentIntentStatus::Canceled => Transition::Cancel,
            other => Transition::MirrorPaymentStatus(other),
        }
    }

    /// Checks the initial state of a transaction about to be created.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidInput` describing the first violation.
    pub fn validate_new(tx: &NewTransaction) -> Result<(), LedgerError> {
        if tx.amount < 0 {
            return Err(LedgerError::InvalidInput(format!(
                "amount must not be negative, got {}",
                tx.amount
            )));
        }

        match (tx.kind, tx.status) {
            (TransactionKind::Payment, TransactionStatus::Pending) => Ok(()),
            (TransactionKind::Payment, TransactionStatus::Processing) => {
                if tx.payment.intent_id.is_none() {
                    return Err(LedgerError::InvalidInput(
                        "processing payment requires an intent id".to_string(),
                    ));
                }
                Ok(())
            }
            (
                TransactionKind::UsageDebit,
                TransactionStatus::Pending | TransactionStatus::Processing,
            ) => {
                if tx.usage.is_none() {
                    return Err(LedgerError::InvalidInput(
                        "usage debit requires usage details".to_string(),
                    ));
                }
                Ok(())
            }
            (TransactionKind::Deposit, TransactionStatus::Pending | TransactionStatus::Success) => {
                Ok(())
            }
            (kind, status) => Err(LedgerError::InvalidInput(format!(
                "{kind} transaction cannot start as {status}"
            ))),
        }
    }

    fn settle(
        tx: &Transaction,
        status: TransactionStatus,
        payment_status: PaymentIntentStatus,
    ) -> Result<TransitionOutcome, LedgerError> {
        match tx.status {
            TransactionStatus::Processing => Ok(TransitionOutcome::Applied {
                status,
                payment_status: Some(payment_status),
            }),
            TransactionStatus::Pending if tx.kind == TransactionKind::UsageDebit => {
                Ok(TransitionOutcome::Applied {
                    status,
                    payment_status: Some(payment_status),
                })
            }
            current => Err(LedgerError::TransitionRejected {
                kind: tx.kind,
                status: current,
                reason: format!("cannot move to {status} before processing"),
            }),
        }
    }

    fn mirror(
        tx: &Transaction,
        status: PaymentIntentStatus,
    ) -> Result<TransitionOutcome, LedgerError> {
        if tx.status != TransactionStatus::Processing {
            return Err(LedgerError::TransitionRejected {
                kind: tx.kind,
                status: tx.status,
                reason: "payment status is only mirrored while processing".to_string(),
            });
        }

        match Self::for_provider_status(status) {
            Transition::MirrorPaymentStatus(status) if tx.payment.status == Some(status) => {
                Ok(TransitionOutcome::Unchanged)
            }
            Transition::MirrorPaymentStatus(status) => Ok(TransitionOutcome::Applied {
                status: TransactionStatus::Processing,
                payment_status: Some(status),
            }),
            settled => Self::plan(tx, settled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::types::{PaymentDetails, UsageDetails};
    use billing_shared::types::{AccountId, TransactionId};
    use chrono::Utc;

    fn transaction(kind: TransactionKind, status: TransactionStatus) -> Transaction {
        Transaction {
            id: TransactionId::new(),
            kind,
            from: AccountId::BANK,
            to: AccountId::new(),
            amount: 1000,
            status,
            payment: PaymentDetails {
                intent_id: Some("pi_1".to_string()),
                ..PaymentDetails::default()
            },
            usage: None,
            created_at: Utc::now(),
            checked_at: Utc::now(),
            is_locked: false,
        }
    }

    #[test]
    fn test_processing_payment_succeeds() {
        let tx = transaction(TransactionKind::Payment, TransactionStatus::Processing);
        assert_eq!(
            Lifecycle::plan(&tx, Transition::Succeed).unwrap(),
            TransitionOutcome::Applied {
                status: TransactionStatus::Success,
                payment_status: Some(PaymentIntentStatus::Succeeded),
            }
        );
    }

    #[test]
    fn test_pending_payment_cannot_succeed() {
        let tx = transaction(TransactionKind::Payment, TransactionStatus::Pending);
        let err = Lifecycle::plan(&tx, Transition::Succeed).unwrap_err();
        assert!(matches!(err, LedgerError::TransitionRejected { .. }));
    }

    #[test]
    fn test_pending_usage_debit_bypasses_processing() {
        let tx = transaction(TransactionKind::UsageDebit, TransactionStatus::Pending);
        assert_eq!(
            Lifecycle::plan(&tx, Transition::Cancel).unwrap(),
            TransitionOutcome::Applied {
                status: TransactionStatus::Canceled,
                payment_status: Some(PaymentIntentStatus::Canceled),
            }
        );
    }

    #[test]
    fn test_fail_leaves_mirror_untouched() {
        let tx = transaction(TransactionKind::Payment, TransactionStatus::Pending);
        assert_eq!(
            Lifecycle::plan(&tx, Transition::Fail).unwrap(),
            TransitionOutcome::Applied {
                status: TransactionStatus::Failed,
                payment_status: None,
            }
        );
    }

    #[test]
    fn test_mirror_intermediate_status() {
        let mut tx = transaction(TransactionKind::Payment, TransactionStatus::Processing);
        let requires_action =
            Transition::MirrorPaymentStatus(PaymentIntentStatus::RequiresAction);

        assert_eq!(
            Lifecycle::plan(&tx, requires_action).unwrap(),
            TransitionOutcome::Applied {
                status: TransactionStatus::Processing,
                payment_status: Some(PaymentIntentStatus::RequiresAction),
            }
        );

        tx.payment.status = Some(PaymentIntentStatus::RequiresAction);
        assert_eq!(
            Lifecycle::plan(&tx, requires_action).unwrap(),
            TransitionOutcome::Unchanged
        );
    }

    #[test]
    fn test_mirror_of_final_provider_status_settles() {
        let tx = transaction(TransactionKind::Payment, TransactionStatus::Processing);
        let outcome = Lifecycle::plan(
            &tx,
            Transition::MirrorPaymentStatus(PaymentIntentStatus::Canceled),
        )
        .unwrap();
        assert_eq!(
            outcome,
            TransitionOutcome::Applied {
                status: TransactionStatus::Canceled,
                payment_status: Some(PaymentIntentStatus::Canceled),
            }
        );
    }

    #[test]
    fn test_mirror_on_pending_is_rejected() {
        let tx = transaction(TransactionKind::Payment, TransactionStatus::Pending);
        assert!(
            Lifecycle::plan(
                &tx,
                Transition::MirrorPaymentStatus(PaymentIntentStatus::Processing)
            )
            .is_err()
        );
    }

    #[test]
    fn test_for_provider_status() {
        assert_eq!(
            Lifecycle::for_provider_status(PaymentIntentStatus::Succeeded),
            Transition::Succeed
        );
        assert_eq!(
            Lifecycle::for_provider_status(PaymentIntentStatus::Canceled),
            Transition::Cancel
        );
        assert_eq!(
            Lifecycle::for_provider_status(PaymentIntentStatus::RequiresCapture),
            Transition::MirrorPaymentStatus(PaymentIntentStatus::RequiresCapture)
        );
    }

    #[test]
    fn test_validate_new() {
        let to = AccountId::new();
        assert!(Lifecycle::validate_new(&NewTransaction::deposit(to, 500)).is_ok());

        let negative = NewTransaction::deposit(to, -1);
        assert!(matches!(
            Lifecycle::validate_new(&negative),
            Err(LedgerError::InvalidInput(_))
        ));

        let no_intent = NewTransaction::payment(to, 1000, PaymentDetails::default());
        assert!(Lifecycle::validate_new(&no_intent).is_err());

        let awaiting_intent = no_intent.with_status(TransactionStatus::Pending);
        assert!(Lifecycle::validate_new(&awaiting_intent).is_ok());

        let usage = NewTransaction::usage_debit(AccountId::new(), to, 10, UsageDetails::default());
        assert!(Lifecycle::validate_new(&usage).is_ok());

        let settled_usage = usage.with_status(TransactionStatus::Success);
        assert!(Lifecycle::validate_new(&settled_usage).is_err());

        let mut missing_usage =
            NewTransaction::usage_debit(AccountId::new(), to, 10, UsageDetails::default());
        missing_usage.usage = None;
        assert!(Lifecycle::validate_new(&missing_usage).is_err());
    }
}
