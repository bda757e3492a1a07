//! Storage traits for accounts and transactions.
//!
//! All reads and writes go through a `LedgerScope`, an explicit store
//! transaction obtained from `LedgerStore::begin`. Changes become visible to
//! other scopes only after `commit`; dropping a scope without committing
//! discards them.
//!
//! Services never open a second scope while holding one.

use async_trait::async_trait;

use billing_shared::types::{AccountId, TransactionId};

use crate::ledger::error::StoreError;
use crate::ledger::types::{
    Account, CorrelationKey, NewAccount, NewTransaction, PaymentIntentStatus, Transaction,
    TransactionStatus,
};

/// Opens store transactions.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Starts a new scope.
    async fn begin(&self) -> Result<Box<dyn LedgerScope>, StoreError>;
}

/// Operations available inside one store transaction.
#[async_trait]
pub trait LedgerScope: Send {
    /// Inserts an account. Fails with `Conflict` if the user already has one.
    async fn create_account(&mut self, account: NewAccount) -> Result<Account, StoreError>;

    /// Looks up an account by external user id.
    async fn account_by_user_id(&mut self, user_id: &str) -> Result<Account, StoreError>;

    /// Looks up an account by id.
    async fn account_by_id(&mut self, id: AccountId) -> Result<Account, StoreError>;

    /// Reads an account and holds it against concurrent writers until the
    /// scope ends.
    async fn account_for_update(&mut self, id: AccountId) -> Result<Account, StoreError>;

    /// Records the billing-provider customer reference of an account.
    async fn set_account_customer_ref(
        &mut self,
        id: AccountId,
        customer_ref: &str,
    ) -> Result<Account, StoreError>;

    /// Inserts a transaction, unlocked.
    ///
    /// Fails with `Conflict` if a usage debit for the same stream chunk exists.
    async fn create_transaction(
        &mut self,
        transaction: NewTransaction,
    ) -> Result<Transaction, StoreError>;

    /// Reads a transaction.
    async fn transaction_by_id(&mut self, id: TransactionId) -> Result<Transaction, StoreError>;

    /// Reads a transaction and holds it against concurrent writers until the
    /// scope ends.
    async fn transaction_for_update(
        &mut self,
        id: TransactionId,
    ) -> Result<Transaction, StoreError>;

    /// Finds the transaction carrying the given external identifier.
    async fn find_by_correlation_key(
        &mut self,
        key: &CorrelationKey,
    ) -> Result<Transaction, StoreError>;

    /// Claims the unlocked processing transaction with the oldest
    /// `checked_at` that has a payment intent.
    ///
    /// Sets `is_locked` and refreshes `checked_at`. Returns `NotFound` when
    /// nothing qualifies. Two concurrent callers never claim the same row.
    async fn claim_next_payment_check(&mut self) -> Result<Transaction, StoreError>;

    /// Clears the claim on a transaction and refreshes `checked_at`.
    async fn release_claim(&mut self, id: TransactionId) -> Result<(), StoreError>;

    /// Clears claims whose `checked_at` is at least `older_than` ago.
    /// Returns the number of rows released.
    async fn release_stale_claims(&mut self, older_than: chrono::Duration)
    -> Result<u64, StoreError>;

    /// Writes a new status and, when given, a new payment-status mirror.
    async fn update_status(
        &mut self,
        id: TransactionId,
        status: TransactionStatus,
        payment_status: Option<PaymentIntentStatus>,
    ) -> Result<Transaction, StoreError>;

    /// Sum of successful credits minus successful debits of an account.
    async fn compute_balance(&mut self, account: AccountId) -> Result<i64, StoreError>;

    /// Successful usage debits paid by `payer` (or by anyone), newest first.
    async fn list_charges(
        &mut self,
        payer: Option<AccountId>,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// Transactions from the bank account to `account`, newest first.
    async fn list_deposits(&mut self, account: AccountId)
    -> Result<Vec<Transaction>, StoreError>;

    /// Persists the scope.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discards the scope.
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
