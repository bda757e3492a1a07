//! In-memory `LedgerStore`.
//!
//! Each scope holds the store mutex for its whole lifetime and works on a
//! copy of the state, written back on commit. Scopes are therefore fully
//! serialized, which gives claims the same exclusivity the database gets
//! from row locks.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use billing_shared::types::{AccountId, TransactionId};

use crate::ledger::error::StoreError;
use crate::ledger::store::{LedgerScope, LedgerStore};
use crate::ledger::types::{
    Account, CorrelationKey, NewAccount, NewTransaction, PaymentIntentStatus, Transaction,
    TransactionKind, TransactionStatus,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    accounts: HashMap<AccountId, Account>,
    transactions: HashMap<TransactionId, Transaction>,
}

/// Ledger store kept in process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryLedgerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerScope>, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryScope { guard, working }))
    }
}

struct MemoryScope {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

impl MemoryScope {
    fn transaction_mut(&mut self, id: TransactionId) -> Result<&mut Transaction, StoreError> {
        self.working
            .transactions
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("transaction", id))
    }

    fn newest_first(mut rows: Vec<Transaction>) -> Vec<Transaction> {
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows
    }
}

#[async_trait]
impl LedgerScope for MemoryScope {
    async fn create_account(&mut self, account: NewAccount) -> Result<Account, StoreError> {
        if self
            .working
            .accounts
            .values()
            .any(|existing| existing.user_id == account.user_id)
        {
            return Err(StoreError::Conflict(format!(
                "account for user {} already exists",
                account.user_id
            )));
        }

        let account = Account {
            id: account.id.unwrap_or_default(),
            user_id: account.user_id,
            email: account.email,
            customer_ref: None,
            balance: None,
            created_at: account.created_at.unwrap_or_else(Utc::now),
            updated_at: None,
        };
        self.working.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn account_by_user_id(&mut self, user_id: &str) -> Result<Account, StoreError> {
        self.working
            .accounts
            .values()
            .find(|account| account.user_id == user_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("account", user_id))
    }

    async fn account_by_id(&mut self, id: AccountId) -> Result<Account, StoreError> {
        self.working
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("account", id))
    }

    // Scopes are already serialized.
    async fn account_for_update(&mut self, id: AccountId) -> Result<Account, StoreError> {
        self.account_by_id(id).await
    }

    async fn set_account_customer_ref(
        &mut self,
        id: AccountId,
        customer_ref: &str,
    ) -> Result<Account, StoreError> {
        let account = self
            .working
            .accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("account", id))?;
        account.customer_ref = Some(customer_ref.to_string());
        account.updated_at = Some(Utc::now());
        Ok(account.clone())
    }

    async fn create_transaction(
        &mut self,
        transaction: NewTransaction,
    ) -> Result<Transaction, StoreError> {
        let id = transaction.id.unwrap_or_default();
        if self.working.transactions.contains_key(&id) {
            return Err(StoreError::Conflict(format!(
                "transaction {id} already exists"
            )));
        }
        if let Some(usage) = &transaction.usage {
            let key = CorrelationKey::StreamChunk {
                contract_address: usage.stream_contract_address.clone(),
                chunk_num: usage.chunk_num,
            };
            if self.working.transactions.values().any(|tx| tx.matches(&key)) {
                return Err(StoreError::Conflict(format!("usage for {key} already exists")));
            }
        }

        let created_at = transaction.created_at.unwrap_or_else(Utc::now);
        let row = Transaction {
            id,
            kind: transaction.kind,
            from: transaction.from,
            to: transaction.to,
            amount: transaction.amount,
            status: transaction.status,
            payment: transaction.payment,
            usage: transaction.usage,
            created_at,
            checked_at: created_at,
            is_locked: false,
        };
        self.working.transactions.insert(id, row.clone());
        Ok(row)
    }

    async fn transaction_by_id(&mut self, id: TransactionId) -> Result<Transaction, StoreError> {
        self.transaction_mut(id).map(|tx| tx.clone())
    }

    async fn transaction_for_update(
        &mut self,
        id: TransactionId,
    ) -> Result<Transaction, StoreError> {
        // The scope already holds the whole store.
        self.transaction_by_id(id).await
    }

    async fn find_by_correlation_key(
        &mut self,
        key: &CorrelationKey,
    ) -> Result<Transaction, StoreError> {
        self.working
            .transactions
            .values()
            .filter(|tx| tx.matches(key))
            .min_by_key(|tx| (tx.created_at, tx.id))
            .cloned()
            .ok_or_else(|| StoreError::not_found("transaction", key))
    }

    async fn claim_next_payment_check(&mut self) -> Result<Transaction, StoreError> {
        let id = self
            .working
            .transactions
            .values()
            .filter(|tx| tx.is_claimable())
            .min_by_key(|tx| (tx.checked_at, tx.id))
            .map(|tx| tx.id)
            .ok_or_else(|| StoreError::not_found("transaction", "claimable payment"))?;

        let tx = self.transaction_mut(id)?;
        tx.is_locked = true;
        tx.checked_at = Utc::now();
        Ok(tx.clone())
    }

    async fn release_claim(&mut self, id: TransactionId) -> Result<(), StoreError> {
        let tx = self.transaction_mut(id)?;
        tx.is_locked = false;
        tx.checked_at = Utc::now();
        Ok(())
    }

    async fn release_stale_claims(
        &mut self,
        older_than: chrono::Duration,
    ) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - older_than;
        let mut released = 0;
        for tx in self.working.transactions.values_mut() {
            if tx.is_locked && tx.checked_at <= cutoff {
                tx.is_locked = false;
                released += 1;
            }
        }
        Ok(released)
    }

    async fn update_status(
        &mut self,
        id: TransactionId,
        status: TransactionStatus,
        payment_status: Option<PaymentIntentStatus>,
    ) -> Result<Transaction, StoreError> {
        let tx = self.transaction_mut(id)?;
        tx.status = status;
        if payment_status.is_some() {
            tx.payment.status = payment_status;
        }
        Ok(tx.clone())
    }

    async fn compute_balance(&mut self, account: AccountId) -> Result<i64, StoreError> {
        let balance = self
            .working
            .transactions
            .values()
            .filter(|tx| tx.status == TransactionStatus::Success)
            .try_fold(0_i64, |balance, tx| {
                let credit = if tx.to == account { tx.amount } else { 0 };
                let debit = if tx.from == account { tx.amount } else { 0 };
                balance.checked_add(credit)?.checked_sub(debit)
            });
        balance.ok_or_else(|| StoreError::Unavailable(format!("balance overflow for {account}")))
    }

    async fn list_charges(
        &mut self,
        payer: Option<AccountId>,
    ) -> Result<Vec<Transaction>, StoreError> {
        let rows = self
            .working
            .transactions
            .values()
            .filter(|tx| {
                tx.kind == TransactionKind::UsageDebit
                    && tx.status == TransactionStatus::Success
                    && payer.is_none_or(|payer| tx.from == payer)
            })
            .cloned()
            .collect();
        Ok(Self::newest_first(rows))
    }

    async fn list_deposits(
        &mut self,
        account: AccountId,
    ) -> Result<Vec<Transaction>, StoreError> {
        let rows = self
            .working
            .transactions
            .values()
            .filter(|tx| tx.from == AccountId::BANK && tx.to == account)
            .cloned()
            .collect();
        Ok(Self::newest_first(rows))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let Self { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::types::{PaymentDetails, UsageDetails};

    async fn seed_payment(
        store: &InMemoryLedgerStore,
        intent: &str,
        age_secs: i64,
    ) -> Transaction {
        let mut payment = NewTransaction::payment(
            AccountId::new(),
            1000,
            PaymentDetails {
                intent_id: Some(intent.to_string()),
                ..PaymentDetails::default()
            },
        );
        payment.created_at = Some(Utc::now() - chrono::Duration::seconds(age_secs));

        let mut scope = store.begin().await.unwrap();
        let tx = scope.create_transaction(payment).await.unwrap();
        scope.commit().await.unwrap();
        tx
    }

    #[tokio::test]
    async fn test_dropped_scope_rolls_back() {
        let store = InMemoryLedgerStore::new();
        {
            let mut scope = store.begin().await.unwrap();
            scope
                .create_account(NewAccount::new("u1", "u1@example.com"))
                .await
                .unwrap();
        }

        let mut scope = store.begin().await.unwrap();
        let err = scope.account_by_user_id("u1").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_explicit_rollback_discards_changes() {
        let store = InMemoryLedgerStore::new();
        let mut scope = store.begin().await.unwrap();
        scope
            .create_account(NewAccount::new("u1", "u1@example.com"))
            .await
            .unwrap();
        scope.rollback().await.unwrap();

        let mut scope = store.begin().await.unwrap();
        assert!(scope.account_by_user_id("u1").await.is_err());
    }

    #[tokio::test]
    async fn test_balance_overflow_is_an_error() {
        let store = InMemoryLedgerStore::new();
        let account = AccountId::new();
        let mut scope = store.begin().await.unwrap();
        for _ in 0..2 {
            scope
                .create_transaction(NewTransaction::deposit(account, i64::MAX))
                .await
                .unwrap();
        }

        let err = scope.compute_balance(account).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_duplicate_user_is_conflict() {
        let store = InMemoryLedgerStore::new();
        let mut scope = store.begin().await.unwrap();
        scope
            .create_account(NewAccount::new("u1", "a@example.com"))
            .await
            .unwrap();
        let err = scope
            .create_account(NewAccount::new("u1", "b@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_claim_picks_oldest_checked() {
        let store = InMemoryLedgerStore::new();
        let second = seed_payment(&store, "pi_2", 60).await;
        let first = seed_payment(&store, "pi_1", 120).await;

        let mut scope = store.begin().await.unwrap();
        let claimed = scope.claim_next_payment_check().await.unwrap();
        assert_eq!(claimed.id, first.id);
        assert!(claimed.is_locked);

        let next = scope.claim_next_payment_check().await.unwrap();
        assert_eq!(next.id, second.id);

        let err = scope.claim_next_payment_check().await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_claim_skips_rows_without_intent() {
        let store = InMemoryLedgerStore::new();
        let mut scope = store.begin().await.unwrap();
        scope
            .create_transaction(
                NewTransaction::payment(AccountId::new(), 10, PaymentDetails::default())
                    .with_status(TransactionStatus::Pending),
            )
            .await
            .unwrap();
        assert!(scope.claim_next_payment_check().await.is_err());
    }

    #[tokio::test]
    async fn test_release_stale_claims() {
        let store = InMemoryLedgerStore::new();
        let tx = seed_payment(&store, "pi_stale", 0).await;

        let mut scope = store.begin().await.unwrap();
        scope.claim_next_payment_check().await.unwrap();
        assert_eq!(
            scope
                .release_stale_claims(chrono::Duration::minutes(1))
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            scope
                .release_stale_claims(chrono::Duration::zero())
                .await
                .unwrap(),
            1
        );
        assert!(!scope.transaction_by_id(tx.id).await.unwrap().is_locked);
    }

    #[tokio::test]
    async fn test_find_by_stream_chunk() {
        let store = InMemoryLedgerStore::new();
        let mut scope = store.begin().await.unwrap();
        let usage = UsageDetails {
            stream_id: "s1".into(),
            stream_contract_address: "0xabc".into(),
            chunk_num: 3,
            ..UsageDetails::default()
        };
        let tx = scope
            .create_transaction(NewTransaction::usage_debit(
                AccountId::new(),
                AccountId::new(),
                50,
                usage,
            ))
            .await
            .unwrap();

        let found = scope
            .find_by_correlation_key(&CorrelationKey::StreamChunk {
                contract_address: "0xabc".into(),
                chunk_num: 3,
            })
            .await
            .unwrap();
        assert_eq!(found.id, tx.id);

        assert!(
            scope
                .find_by_correlation_key(&CorrelationKey::StreamChunk {
                    contract_address: "0xabc".into(),
                    chunk_num: 4,
                })
                .await
                .is_err()
        );
    }
}
