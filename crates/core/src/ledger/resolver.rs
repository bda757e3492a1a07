//! Account resolution for external user ids.

use std::sync::Arc;

use tracing::{info, warn};

use crate::ledger::error::{LedgerError, StoreError};
use crate::ledger::store::LedgerStore;
use crate::ledger::types::{Account, NewAccount, NewTransaction, Transaction, TransactionKind};
use crate::ports::IdentityProvider;

/// Finds or provisions the account of a user.
#[derive(Clone)]
pub struct AccountResolver {
    store: Arc<dyn LedgerStore>,
    identity: Arc<dyn IdentityProvider>,
}

impl AccountResolver {
    /// Creates a resolver.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { store, identity }
    }

    /// Returns the user's account, creating it from the identity service if needed.
    ///
    /// Concurrent callers for the same user all receive the same account.
    ///
    /// # Errors
    ///
    /// - `LedgerError::InvalidInput` for an empty user id
    /// - `LedgerError::NotFound` if the identity service does not know the user
    /// - `LedgerError::ProviderUnavailable` if the identity service fails
    pub async fn get_or_create(&self, user_id: &str) -> Result<Account, LedgerError> {
        if user_id.trim().is_empty() {
            return Err(LedgerError::InvalidInput("user_id is empty".to_string()));
        }

        match self.find(user_id).await {
            Ok(account) => return Ok(account),
            Err(StoreError::NotFound { .. }) => {}
            Err(err) => return Err(err.into()),
        }

        let user = self.identity.get_user_by_id(user_id).await?;

        let mut scope = self.store.begin().await?;
        match scope
            .create_account(NewAccount::new(user_id, user.email))
            .await
        {
            Ok(account) => {
                scope.commit().await?;
                info!(account_id = %account.id, user_id, "account provisioned");
                Ok(account)
            }
            Err(StoreError::Conflict(_)) => {
                scope.rollback().await?;
                warn!(user_id, "account created concurrently, using existing row");
                Ok(self.find(user_id).await?)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Credits a new account once with `amount` minor units from the bank.
    ///
    /// Does nothing when `amount` is not positive or the account already
    /// holds a deposit, so repeated provisioning events are harmless. The
    /// account row is locked while checking, so concurrent redeliveries
    /// grant at most one credit.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::StoreUnavailable` on storage failure.
    pub async fn ensure_initial_credit(
        &self,
        account: &Account,
        amount: i64,
    ) -> Result<Option<Transaction>, LedgerError> {
        if amount <= 0 {
            return Ok(None);
        }

        let mut scope = self.store.begin().await?;
        scope.account_for_update(account.id).await?;
        let already_credited = scope
            .list_deposits(account.id)
            .await?
            .iter()
            .any(|tx| tx.kind == TransactionKind::Deposit);
        if already_credited {
            scope.rollback().await?;
            return Ok(None);
        }

        let deposit = scope
            .create_transaction(NewTransaction::deposit(account.id, amount))
            .await?;
        scope.commit().await?;

        info!(account_id = %account.id, tx_id = %deposit.id, amount, "initial credit granted");
        Ok(Some(deposit))
    }

    async fn find(&self, user_id: &str) -> Result<Account, StoreError> {
        let mut scope = self.store.begin().await?;
        let account = scope.account_by_user_id(user_id).await?;
        scope.commit().await?;
        Ok(account)
    }
}
