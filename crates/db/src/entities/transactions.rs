//! `SeaORM` Entity for the billing_transactions table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::{TransactionKind, TransactionStatus};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "billing_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub kind: TransactionKind,
    /// Nil UUID for the bank account.
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    pub amount: i64,
    pub status: TransactionStatus,
    pub payment_intent_id: Option<String>,
    pub payment_intent_secret: Option<String>,
    /// Provider intent status token.
    pub payment_status: Option<String>,
    pub checkout_session_id: Option<String>,
    pub stream_id: Option<String>,
    pub stream_name: Option<String>,
    pub stream_contract_address: Option<String>,
    pub stream_is_live: bool,
    pub profile_id: Option<String>,
    pub profile_name: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((20, 8)))", nullable)]
    pub profile_cost: Option<Decimal>,
    pub task_id: Option<String>,
    pub chunk_num: Option<i64>,
    pub duration_secs: Option<i64>,
    #[sea_orm(column_type = "Decimal(Some((20, 8)))", nullable)]
    pub price: Option<Decimal>,
    pub created_at: DateTimeWithTimeZone,
    pub checked_at: DateTimeWithTimeZone,
    pub is_locked: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
