//! `SeaORM` active enums mapped to PostgreSQL enum types.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use billing_core::ledger::types as domain;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(
    rs_type = "String",
    db_type = "Enum",
    enum_name = "billing_transaction_status"
)]
pub enum TransactionStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "success")]
    Success,
    #[sea_orm(string_value = "canceled")]
    Canceled,
    #[sea_orm(string_value = "failed")]
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(
    rs_type = "String",
    db_type = "Enum",
    enum_name = "billing_transaction_kind"
)]
pub enum TransactionKind {
    #[sea_orm(string_value = "payment")]
    Payment,
    #[sea_orm(string_value = "usage_debit")]
    UsageDebit,
    #[sea_orm(string_value = "deposit")]
    Deposit,
}

impl From<domain::TransactionStatus> for TransactionStatus {
    fn from(status: domain::TransactionStatus) -> Self {
        match status {
            domain::TransactionStatus::Pending => Self::Pending,
            domain::TransactionStatus::Processing => Self::Processing,
            domain::TransactionStatus::Success => Self::Success,
            domain::TransactionStatus::Canceled => Self::Canceled,
            domain::TransactionStatus::Failed => Self::Failed,
        }
    }
}

impl From<TransactionStatus> for domain::TransactionStatus {
    fn from(status: TransactionStatus) -> Self {
        match status {
            TransactionStatus::Pending => Self::Pending,
            TransactionStatus::Processing => Self::Processing,
            TransactionStatus::Success => Self::Success,
            TransactionStatus::Canceled => Self::Canceled,
            TransactionStatus::Failed => Self::Failed,
        }
    }
}

impl From<domain::TransactionKind> for TransactionKind {
    fn from(kind: domain::TransactionKind) -> Self {
        match kind {
            domain::TransactionKind::Payment => Self::Payment,
            domain::TransactionKind::UsageDebit => Self::UsageDebit,
            domain::TransactionKind::Deposit => Self::Deposit,
        }
    }
}

impl From<TransactionKind> for domain::TransactionKind {
    fn from(kind: TransactionKind) -> Self {
        match kind {
            TransactionKind::Payment => Self::Payment,
            TransactionKind::UsageDebit => Self::UsageDebit,
            TransactionKind::Deposit => Self::Deposit,
        }
    }
}
