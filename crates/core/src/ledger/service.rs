//! Ledger service: creation, transitions, balances and charge queries.
//!
//! Every public method opens exactly one store scope and commits it before
//! returning, so each call is atomic on its own.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info};

use billing_shared::types::{AccountId, TransactionId};

use crate::charges::{self, ChartPoint, DailyCharge};
use crate::ledger::error::{LedgerError, StoreError};
use crate::ledger::lifecycle::{Lifecycle, Transition, TransitionOutcome};
use crate::ledger::store::{LedgerScope, LedgerStore};
use crate::ledger::types::{Account, CorrelationKey, NewAccount, NewTransaction, Transaction};

/// A transaction after a transition was applied to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transitioned {
    /// The transaction as stored after the call.
    pub transaction: Transaction,
    /// What the transition changed.
    pub outcome: TransitionOutcome,
}

/// Entry point for ledger reads and writes.
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
}

impl LedgerService {
    /// Creates a service over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Creates an account.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Conflict` if the user already has an account.
    pub async fn create_account(&self, account: NewAccount) -> Result<Account, LedgerError> {
        let mut scope = self.store.begin().await?;
        let account = scope.create_account(account).await?;
        scope.commit().await?;

        info!(account_id = %account.id, user_id = %account.user_id, "account created");
        Ok(account)
    }

    /// Validates and records a new transaction.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidInput` if the initial state is not allowed.
    pub async fn create_transaction(
        &self,
        transaction: NewTransaction,
    ) -> Result<Transaction, LedgerError> {
        Lifecycle::validate_new(&transaction)?;

        let mut scope = self.store.begin().await?;
        let transaction = scope.create_transaction(transaction).await?;
        scope.commit().await?;

        info!(
            tx_id = %transaction.id,
            kind = %transaction.kind,
            status = %transaction.status,
            amount = transaction.amount,
            "transaction recorded"
        );
        Ok(transaction)
    }

    /// Reads a transaction by id.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::NotFound` if it does not exist.
    pub async fn transaction(&self, id: TransactionId) -> Result<Transaction, LedgerError> {
        let mut scope = self.store.begin().await?;
        let transaction = scope.transaction_by_id(id).await?;
        scope.commit().await?;
        Ok(transaction)
    }

    /// Reads the transaction carrying an external identifier.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::NotFound` if no transaction matches.
    pub async fn transaction_by_correlation_key(
        &self,
        key: &CorrelationKey,
    ) -> Result<Transaction, LedgerError> {
        let mut scope = self.store.begin().await?;
        let transaction = scope.find_by_correlation_key(key).await?;
        scope.commit().await?;
        Ok(transaction)
    }

    /// Applies a transition to a transaction.
    ///
    /// The row is re-read under a write lock, so concurrent transitions on
    /// the same transaction are applied one after the other.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::NotFound` or `LedgerError::TransitionRejected`.
    pub async fn transition(
        &self,
        id: TransactionId,
        transition: Transition,
    ) -> Result<Transitioned, LedgerError> {
        let mut scope = self.store.begin().await?;
        let result = apply_transition(scope.as_mut(), id, transition).await?;
        scope.commit().await?;
        Ok(result)
    }

    /// Applies a transition to the transaction carrying an external identifier.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::NotFound` if no transaction matches.
    pub async fn apply_by_correlation_key(
        &self,
        key: &CorrelationKey,
        transition: Transition,
    ) -> Result<Transitioned, LedgerError> {
        let mut scope = self.store.begin().await?;
        let found = scope.find_by_correlation_key(key).await?;
        let result = apply_transition(scope.as_mut(), found.id, transition).await?;
        scope.commit().await?;
        Ok(result)
    }

    /// Marks a transaction succeeded.
    ///
    /// # Errors
    ///
    /// See [`LedgerService::transition`].
    pub async fn mark_succeeded(&self, id: TransactionId) -> Result<Transitioned, LedgerError> {
        self.transition(id, Transition::Succeed).await
    }

    /// Marks a transaction canceled.
    ///
    /// # Errors
    ///
    /// See [`LedgerService::transition`].
    pub async fn mark_canceled(&self, id: TransactionId) -> Result<Transitioned, LedgerError> {
        self.transition(id, Transition::Cancel).await
    }

    /// Marks a transaction failed.
    ///
    /// # Errors
    ///
    /// See [`LedgerService::transition`].
    pub async fn mark_failed(&self, id: TransactionId) -> Result<Transitioned, LedgerError> {
        self.transition(id, Transition::Fail).await
    }

    /// Balance of an account in minor units, from settled transactions.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::StoreUnavailable` on storage failure.
    pub async fn balance(&self, account: AccountId) -> Result<i64, LedgerError> {
        let mut scope = self.store.begin().await?;
        let balance = scope.compute_balance(account).await?;
        scope.commit().await?;
        Ok(balance)
    }

    /// Balance of a user's account; zero if the user has no account yet.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::StoreUnavailable` on storage failure.
    pub async fn balance_for_user(&self, user_id: &str) -> Result<i64, LedgerError> {
        let mut scope = self.store.begin().await?;
        let balance = match scope.account_by_user_id(user_id).await {
            Ok(account) => scope.compute_balance(account.id).await?,
            Err(StoreError::NotFound { .. }) => 0,
            Err(err) => return Err(err.into()),
        };
        scope.commit().await?;
        Ok(balance)
    }

    /// Daily charge rows paid by a user, newest day first.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::StoreUnavailable` on storage failure.
    pub async fn charges_for_user(&self, user_id: &str) -> Result<Vec<DailyCharge>, LedgerError> {
        let mut scope = self.store.begin().await?;
        let rows = match scope.account_by_user_id(user_id).await {
            Ok(account) => scope.list_charges(Some(account.id)).await?,
            Err(StoreError::NotFound { .. }) => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        scope.commit().await?;
        Ok(charges::aggregate_by_day(&rows))
    }

    /// Daily charge rows across all accounts, newest day first.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::StoreUnavailable` on storage failure.
    pub async fn all_charges(&self) -> Result<Vec<DailyCharge>, LedgerError> {
        let mut scope = self.store.begin().await?;
        let rows = scope.list_charges(None).await?;
        scope.commit().await?;
        Ok(charges::aggregate_by_day(&rows))
    }

    /// Per-day live and on-demand charges of a user for the month of `today`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::StoreUnavailable` on storage failure.
    pub async fn charge_chart_for_user(
        &self,
        user_id: &str,
        today: NaiveDate,
    ) -> Result<Vec<ChartPoint>, LedgerError> {
        let rows = self.charges_for_user(user_id).await?;
        Ok(charges::monthly_chart(&rows, today))
    }

    /// Deposits and payments credited to a user by the bank, newest first.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::StoreUnavailable` on storage failure.
    pub async fn deposits_for_user(&self, user_id: &str) -> Result<Vec<Transaction>, LedgerError> {
        let mut scope = self.store.begin().await?;
        let rows = match scope.account_by_user_id(user_id).await {
            Ok(account) => scope.list_deposits(account.id).await?,
            Err(StoreError::NotFound { .. }) => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        scope.commit().await?;
        Ok(rows)
    }
}

/// Plans and writes a transition inside an open scope.
pub(crate) async fn apply_transition(
    scope: &mut dyn LedgerScope,
    id: TransactionId,
    transition: Transition,
) -> Result<Transitioned, LedgerError> {
    let current = scope.transaction_for_update(id).await?;
    let outcome = Lifecycle::plan(&current, transition)?;

    let transaction = match outcome {
        TransitionOutcome::Applied {
            status,
            payment_status,
        } => {
            let updated = scope.update_status(id, status, payment_status).await?;
            info!(
                tx_id = %id,
                from_status = %current.status,
                to_status = %status,
                payment_status = ?payment_status,
                "transaction transitioned"
            );
            updated
        }
        TransitionOutcome::Unchanged => {
            debug!(tx_id = %id, status = %current.status, ?transition, "transition is a no-op");
            current
        }
    };

    Ok(Transitioned {
        transaction,
        outcome,
    })
}
