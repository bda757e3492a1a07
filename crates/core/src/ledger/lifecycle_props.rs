//! Property-based tests for the transaction state machine.

use chrono::Utc;
use proptest::prelude::*;

use billing_shared::types::{AccountId, TransactionId};

use crate::ledger::lifecycle::{Lifecycle, Transition, TransitionOutcome};
use crate::ledger::types::{
    PaymentDetails, PaymentIntentStatus, Transaction, TransactionKind, TransactionStatus,
};

fn arb_status() -> impl Strategy<Value = TransactionStatus> {
    prop_oneof![
        Just(TransactionStatus::Pending),
        Just(TransactionStatus::Processing),
        Just(TransactionStatus::Success),
        Just(TransactionStatus::Canceled),
        Just(TransactionStatus::Failed),
    ]
}

fn arb_kind() -> impl Strategy<Value = TransactionKind> {
    prop_oneof![
        Just(TransactionKind::Payment),
        Just(TransactionKind::UsageDebit),
        Just(TransactionKind::Deposit),
    ]
}

fn arb_intent_status() -> impl Strategy<Value = PaymentIntentStatus> {
    prop_oneof![
        Just(PaymentIntentStatus::RequiresPaymentMethod),
        Just(PaymentIntentStatus::RequiresConfirmation),
        Just(PaymentIntentStatus::RequiresAction),
        Just(PaymentIntentStatus::Processing),
        Just(PaymentIntentStatus::RequiresCapture),
        Just(PaymentIntentStatus::Canceled),
        Just(PaymentIntentStatus::Succeeded),
    ]
}

fn arb_transition() -> impl Strategy<Value = Transition> {
    prop_oneof![
        Just(Transition::Succeed),
        Just(Transition::Cancel),
        Just(Transition::Fail),
        arb_intent_status().prop_map(Transition::MirrorPaymentStatus),
    ]
}

fn arb_transaction() -> impl Strategy<Value = Transaction> {
    (
        arb_kind(),
        arb_status(),
        proptest::option::of(arb_intent_status()),
        0_i64..1_000_000,
    )
        .prop_map(|(kind, status, mirror, amount)| Transaction {
            id: TransactionId::new(),
            kind,
            from: AccountId::BANK,
            to: AccountId::new(),
            amount,
            status,
            payment: PaymentDetails {
                intent_id: Some("pi_prop".to_string()),
                status: mirror,
                ..PaymentDetails::default()
            },
            usage: None,
            created_at: Utc::now(),
            checked_at: Utc::now(),
            is_locked: false,
        })
}

/// Applies a planned outcome the way a store would.
fn apply(tx: &mut Transaction, outcome: TransitionOutcome) {
    if let TransitionOutcome::Applied {
        status,
        payment_status,
    } = outcome
    {
        tx.status = status;
        if payment_status.is_some() {
            tx.payment.status = payment_status;
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Terminal transactions are never changed and never produce errors.
    #[test]
    fn prop_terminal_is_noop(tx in arb_transaction(), transition in arb_transition()) {
        prop_assume!(tx.status.is_terminal());
        prop_assert_eq!(Lifecycle::plan(&tx, transition).unwrap(), TransitionOutcome::Unchanged);
    }

    /// No sequence of transitions moves a status backwards or out of a terminal state.
    #[test]
    fn prop_status_is_monotonic(
        mut tx in arb_transaction(),
        transitions in proptest::collection::vec(arb_transition(), 1..12),
    ) {
        let rank = |s: TransactionStatus| match s {
            TransactionStatus::Pending => 0,
            TransactionStatus::Processing => 1,
            _ => 2,
        };

        for transition in transitions {
            let before = tx.status;
            if let Ok(outcome) = Lifecycle::plan(&tx, transition) {
                apply(&mut tx, outcome);
            }
            prop_assert!(rank(tx.status) >= rank(before));
            if before.is_terminal() {
                prop_assert_eq!(tx.status, before);
            }
        }
    }

    /// Applying the same transition twice has the effect of applying it once.
    #[test]
    fn prop_transitions_are_idempotent(mut tx in arb_transaction(), transition in arb_transition()) {
        if let Ok(outcome) = Lifecycle::plan(&tx, transition) {
            apply(&mut tx, outcome);
            let again = Lifecycle::plan(&tx, transition);
            prop_assert!(matches!(again, Ok(TransitionOutcome::Unchanged)));
        }
    }

    /// A settled transaction always mirrors the matching provider token.
    #[test]
    fn prop_settle_sets_matching_mirror(tx in arb_transaction(), succeed in any::<bool>()) {
        let transition = if succeed { Transition::Succeed } else { Transition::Cancel };
        if let Ok(TransitionOutcome::Applied { status, payment_status }) = Lifecycle::plan(&tx, transition) {
            let expected = if succeed {
                (TransactionStatus::Success, PaymentIntentStatus::Succeeded)
            } else {
                (TransactionStatus::Canceled, PaymentIntentStatus::Canceled)
            };
            prop_assert_eq!((status, payment_status), (expected.0, Some(expected.1)));
        }
    }

    /// Provider statuses map to the transition named by their token.
    #[test]
    fn prop_provider_status_mapping(status in arb_intent_status()) {
        let transition = Lifecycle::for_provider_status(status);
        match status {
            PaymentIntentStatus::Succeeded => prop_assert_eq!(transition, Transition::Succeed),
            PaymentIntentStatus::Canceled => prop_assert_eq!(transition, Transition::Cancel),
            other => prop_assert_eq!(transition, Transition::MirrorPaymentStatus(other)),
        }
    }
}
