//! PostgreSQL implementation of the ledger store.
//!
//! Each `LedgerScope` wraps one database transaction. Claims use
//! `FOR UPDATE SKIP LOCKED` so concurrent reconcilers never pick the same
//! row; status writes lock the row with `FOR UPDATE`.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::{Expr, LockBehavior, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};

use billing_core::ledger::types::{
    Account, CorrelationKey, NewAccount, NewTransaction, PaymentDetails, PaymentIntentStatus,
    Transaction, UsageDetails,
};
use billing_core::ledger::{
    LedgerScope, LedgerStore, StoreError, TransactionKind, TransactionStatus,
};
use billing_shared::types::{AccountId, TransactionId};

use crate::entities::sea_orm_active_enums as enums;
use crate::entities::{accounts, transactions};

/// Ledger store backed by a `SeaORM` connection pool.
#[derive(Debug, Clone)]
pub struct SeaOrmLedgerStore {
    db: DatabaseConnection,
}

impl SeaOrmLedgerStore {
    /// Creates a new store.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LedgerStore for SeaOrmLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerScope>, StoreError> {
        let txn = self.db.begin().await.map_err(db_err)?;
        Ok(Box::new(SeaOrmScope { txn }))
    }
}

/// One database transaction.
pub struct SeaOrmScope {
    txn: DatabaseTransaction,
}

impl SeaOrmScope {
    async fn transaction_model(
        &self,
        id: TransactionId,
        lock: bool,
    ) -> Result<transactions::Model, StoreError> {
        let mut query = transactions::Entity::find_by_id(id.into_inner());
        if lock {
            query = query.lock_exclusive();
        }
        query
            .one(&self.txn)
            .await
            .map_err(db_err)?
            .ok_or_else(|| StoreError::not_found("transaction", id))
    }

    async fn account_model(
        &self,
        id: AccountId,
        lock: bool,
    ) -> Result<accounts::Model, StoreError> {
        let mut query = accounts::Entity::find_by_id(id.into_inner());
        if lock {
            query = query.lock_exclusive();
        }
        query
            .one(&self.txn)
            .await
            .map_err(db_err)?
            .ok_or_else(|| StoreError::not_found("account", id))
    }

    async fn sum_success(
        &self,
        column: transactions::Column,
        account: AccountId,
    ) -> Result<i64, StoreError> {
        let total: Option<i64> = transactions::Entity::find()
            .select_only()
            .column_as(Expr::cust("COALESCE(SUM(amount), 0)::BIGINT"), "total")
            .filter(column.eq(account.into_inner()))
            .filter(transactions::Column::Status.eq(enums::TransactionStatus::Success))
            .into_tuple()
            .one(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(total.unwrap_or(0))
    }
}

#[async_trait]
impl LedgerScope for SeaOrmScope {
    async fn create_account(&mut self, account: NewAccount) -> Result<Account, StoreError> {
        let model = accounts::ActiveModel {
            id: Set(account.id.unwrap_or_default().into_inner()),
            user_id: Set(account.user_id),
            email: Set(account.email),
            customer_ref: Set(None),
            balance: Set(None),
            created_at: Set(account.created_at.unwrap_or_else(Utc::now).into()),
            updated_at: Set(None),
        };
        let model = model.insert(&self.txn).await.map_err(db_err)?;
        Ok(account_from_model(model))
    }

    async fn account_by_user_id(&mut self, user_id: &str) -> Result<Account, StoreError> {
        accounts::Entity::find()
            .filter(accounts::Column::UserId.eq(user_id))
            .one(&self.txn)
            .await
            .map_err(db_err)?
            .map(account_from_model)
            .ok_or_else(|| StoreError::not_found("account", user_id))
    }

    async fn account_by_id(&mut self, id: AccountId) -> Result<Account, StoreError> {
        self.account_model(id, false).await.map(account_from_model)
    }

    async fn account_for_update(&mut self, id: AccountId) -> Result<Account, StoreError> {
        self.account_model(id, true).await.map(account_from_model)
    }

    async fn set_account_customer_ref(
        &mut self,
        id: AccountId,
        customer_ref: &str,
    ) -> Result<Account, StoreError> {
        let mut model: accounts::ActiveModel = self.account_model(id, true).await?.into();
        model.customer_ref = Set(Some(customer_ref.to_string()));
        model.updated_at = Set(Some(Utc::now().into()));
        let model = model.update(&self.txn).await.map_err(db_err)?;
        Ok(account_from_model(model))
    }

    async fn create_transaction(
        &mut self,
        transaction: NewTransaction,
    ) -> Result<Transaction, StoreError> {
        let created_at = transaction.created_at.unwrap_or_else(Utc::now);
        let payment = transaction.payment;

        let mut model = transactions::ActiveModel {
            id: Set(transaction.id.unwrap_or_default().into_inner()),
            kind: Set(transaction.kind.into()),
            from_account_id: Set(transaction.from.into_inner()),
            to_account_id: Set(transaction.to.into_inner()),
            amount: Set(transaction.amount),
            status: Set(transaction.status.into()),
            payment_intent_id: Set(payment.intent_id),
            payment_intent_secret: Set(payment.client_secret),
            payment_status: Set(payment.status.map(|s| s.as_str().to_string())),
            checkout_session_id: Set(payment.checkout_session_id),
            stream_id: Set(None),
            stream_name: Set(None),
            stream_contract_address: Set(None),
            stream_is_live: Set(false),
            profile_id: Set(None),
            profile_name: Set(None),
            profile_cost: Set(None),
            task_id: Set(None),
            chunk_num: Set(None),
            duration_secs: Set(None),
            price: Set(None),
            created_at: Set(created_at.into()),
            checked_at: Set(created_at.into()),
            is_locked: Set(false),
        };

        if let Some(usage) = transaction.usage {
            model.stream_id = Set(Some(usage.stream_id));
            model.stream_name = Set(usage.stream_name);
            model.stream_contract_address = Set(Some(usage.stream_contract_address));
            model.stream_is_live = Set(usage.stream_is_live);
            model.profile_id = Set(usage.profile_id);
            model.profile_name = Set(usage.profile_name);
            model.profile_cost = Set(usage.profile_cost);
            model.task_id = Set(usage.task_id);
            model.chunk_num = Set(Some(usage.chunk_num));
            model.duration_secs = Set(Some(usage.duration_secs));
            model.price = Set(Some(usage.price));
        }

        let model = model.insert(&self.txn).await.map_err(db_err)?;
        Ok(transaction_from_model(model))
    }

    async fn transaction_by_id(&mut self, id: TransactionId) -> Result<Transaction, StoreError> {
        self.transaction_model(id, false)
            .await
            .map(transaction_from_model)
    }

    async fn transaction_for_update(
        &mut self,
        id: TransactionId,
    ) -> Result<Transaction, StoreError> {
        self.transaction_model(id, true)
            .await
            .map(transaction_from_model)
    }

    async fn find_by_correlation_key(
        &mut self,
        key: &CorrelationKey,
    ) -> Result<Transaction, StoreError> {
        let query = match key {
            CorrelationKey::PaymentIntent(id) => transactions::Entity::find()
                .filter(transactions::Column::PaymentIntentId.eq(id.as_str())),
            CorrelationKey::CheckoutSession(id) => transactions::Entity::find()
                .filter(transactions::Column::CheckoutSessionId.eq(id.as_str())),
            CorrelationKey::StreamChunk {
                contract_address,
                chunk_num,
            } => transactions::Entity::find()
                .filter(transactions::Column::StreamContractAddress.eq(contract_address.as_str()))
                .filter(transactions::Column::ChunkNum.eq(*chunk_num)),
        };

        query
            .order_by_asc(transactions::Column::CreatedAt)
            .order_by_asc(transactions::Column::Id)
            .one(&self.txn)
            .await
            .map_err(db_err)?
            .map(transaction_from_model)
            .ok_or_else(|| StoreError::not_found("transaction", key))
    }

    async fn claim_next_payment_check(&mut self) -> Result<Transaction, StoreError> {
        let row = transactions::Entity::find()
            .filter(transactions::Column::Status.eq(enums::TransactionStatus::Processing))
            .filter(transactions::Column::IsLocked.eq(false))
            .filter(transactions::Column::PaymentIntentId.is_not_null())
            .order_by_asc(transactions::Column::CheckedAt)
            .order_by_asc(transactions::Column::Id)
            .lock_with_behavior(LockType::Update, LockBehavior::SkipLocked)
            .one(&self.txn)
            .await
            .map_err(db_err)?
            .ok_or_else(|| StoreError::not_found("transaction", "claimable payment"))?;

        let mut model: transactions::ActiveModel = row.into();
        model.is_locked = Set(true);
        model.checked_at = Set(Utc::now().into());
        let model = model.update(&self.txn).await.map_err(db_err)?;
        Ok(transaction_from_model(model))
    }

    async fn release_claim(&mut self, id: TransactionId) -> Result<(), StoreError> {
        let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();
        let result = transactions::Entity::update_many()
            .col_expr(transactions::Column::IsLocked, Expr::value(false))
            .col_expr(transactions::Column::CheckedAt, Expr::value(now))
            .filter(transactions::Column::Id.eq(id.into_inner()))
            .exec(&self.txn)
            .await
            .map_err(db_err)?;

        if result.rows_affected == 0 {
            return Err(StoreError::not_found("transaction", id));
        }
        Ok(())
    }

    async fn release_stale_claims(
        &mut self,
        older_than: chrono::Duration,
    ) -> Result<u64, StoreError> {
        let cutoff: sea_orm::prelude::DateTimeWithTimeZone = (Utc::now() - older_than).into();
        let result = transactions::Entity::update_many()
            .col_expr(transactions::Column::IsLocked, Expr::value(false))
            .filter(transactions::Column::IsLocked.eq(true))
            .filter(transactions::Column::CheckedAt.lte(cutoff))
            .exec(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected)
    }

    async fn update_status(
        &mut self,
        id: TransactionId,
        status: TransactionStatus,
        payment_status: Option<PaymentIntentStatus>,
    ) -> Result<Transaction, StoreError> {
        let mut model: transactions::ActiveModel = self.transaction_model(id, true).await?.into();
        model.status = Set(status.into());
        if let Some(payment_status) = payment_status {
            model.payment_status = Set(Some(payment_status.as_str().to_string()));
        }
        let model = model.update(&self.txn).await.map_err(db_err)?;
        Ok(transaction_from_model(model))
    }

    async fn compute_balance(&mut self, account: AccountId) -> Result<i64, StoreError> {
        let credits = self
            .sum_success(transactions::Column::ToAccountId, account)
            .await?;
        let debits = self
            .sum_success(transactions::Column::FromAccountId, account)
            .await?;
        credits
            .checked_sub(debits)
            .ok_or_else(|| StoreError::Unavailable(format!("balance overflow for {account}")))
    }

    async fn list_charges(
        &mut self,
        payer: Option<AccountId>,
    ) -> Result<Vec<Transaction>, StoreError> {
        let mut query = transactions::Entity::find()
            .filter(transactions::Column::Kind.eq(enums::TransactionKind::UsageDebit))
            .filter(transactions::Column::Status.eq(enums::TransactionStatus::Success));
        if let Some(payer) = payer {
            query = query.filter(transactions::Column::FromAccountId.eq(payer.into_inner()));
        }
        let rows = query
            .order_by_desc(transactions::Column::CreatedAt)
            .order_by_desc(transactions::Column::Id)
            .all(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(transaction_from_model).collect())
    }

    async fn list_deposits(
        &mut self,
        account: AccountId,
    ) -> Result<Vec<Transaction>, StoreError> {
        let rows = transactions::Entity::find()
            .filter(transactions::Column::FromAccountId.eq(AccountId::BANK.into_inner()))
            .filter(transactions::Column::ToAccountId.eq(account.into_inner()))
            .order_by_desc(transactions::Column::CreatedAt)
            .order_by_desc(transactions::Column::Id)
            .all(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(transaction_from_model).collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.txn.commit().await.map_err(db_err)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.txn.rollback().await.map_err(db_err)
    }
}

/// Maps unique violations to `Conflict` and everything else to `Unavailable`.
fn db_err(err: DbErr) -> StoreError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => StoreError::Conflict(detail),
        _ => {
            tracing::warn!(error = %err, "Ledger store query failed");
            StoreError::Unavailable(err.to_string())
        }
    }
}

fn account_from_model(model: accounts::Model) -> Account {
    Account {
        id: AccountId::from_uuid(model.id),
        user_id: model.user_id,
        email: model.email,
        customer_ref: model.customer_ref,
        balance: model.balance,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.map(|at| at.with_timezone(&Utc)),
    }
}

fn transaction_from_model(model: transactions::Model) -> Transaction {
    let usage = match model.stream_contract_address {
        Some(stream_contract_address) => Some(UsageDetails {
            stream_id: model.stream_id.unwrap_or_default(),
            stream_name: model.stream_name,
            stream_contract_address,
            stream_is_live: model.stream_is_live,
            profile_id: model.profile_id,
            profile_name: model.profile_name,
            profile_cost: model.profile_cost,
            task_id: model.task_id,
            chunk_num: model.chunk_num.unwrap_or_default(),
            duration_secs: model.duration_secs.unwrap_or_default(),
            price: model.price.unwrap_or_default(),
        }),
        None => None,
    };

    Transaction {
        id: TransactionId::from_uuid(model.id),
        kind: TransactionKind::from(model.kind),
        from: AccountId::from_uuid(model.from_account_id),
        to: AccountId::from_uuid(model.to_account_id),
        amount: model.amount,
        status: TransactionStatus::from(model.status),
        payment: PaymentDetails {
            intent_id: model.payment_intent_id,
            client_secret: model.payment_intent_secret,
            status: model
                .payment_status
                .as_deref()
                .and_then(PaymentIntentStatus::parse),
            checkout_session_id: model.checkout_session_id,
        },
        usage,
        created_at: model.created_at.with_timezone(&Utc),
        checked_at: model.checked_at.with_timezone(&Utc),
        is_locked: model.is_locked,
    }
}
