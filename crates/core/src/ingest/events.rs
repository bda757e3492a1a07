//! Inbound billing events.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ledger::types::CorrelationKey;

/// An event delivered by the message bus, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BillingEvent {
    /// A transcoding task finished and its usage should be charged.
    UsageCompleted(UsageCompleted),
    /// A chunk passed validation; its charge settles.
    ValidationSucceeded(ChunkRef),
    /// A chunk failed validation; its charge is canceled.
    ValidationFailed(ChunkRef),
    /// A user was created and needs a billing account.
    AccountProvisioned {
        /// External user id.
        user_id: String,
    },
}

impl BillingEvent {
    /// The `type` tag of the event.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::UsageCompleted(_) => "usage_completed",
            Self::ValidationSucceeded(_) => "validation_succeeded",
            Self::ValidationFailed(_) => "validation_failed",
            Self::AccountProvisioned { .. } => "account_provisioned",
        }
    }
}

/// Usage of one stream chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCompleted {
    /// Payer.
    pub user_id: String,
    /// Payee.
    pub client_user_id: String,
    pub stream_id: String,
    #[serde(default)]
    pub stream_name: Option<String>,
    pub stream_contract_address: String,
    #[serde(default)]
    pub stream_is_live: bool,
    #[serde(default)]
    pub profile_id: Option<String>,
    #[serde(default)]
    pub profile_name: Option<String>,
    #[serde(default)]
    pub profile_cost: Option<Decimal>,
    #[serde(default)]
    pub task_id: Option<String>,
    pub chunk_num: i64,
    /// Seconds of usage.
    pub duration: i64,
    /// Price per second in major units.
    pub price: Decimal,
}

impl UsageCompleted {
    /// Key of the usage debit this event produces.
    #[must_use]
    pub fn correlation_key(&self) -> CorrelationKey {
        CorrelationKey::StreamChunk {
            contract_address: self.stream_contract_address.clone(),
            chunk_num: self.chunk_num,
        }
    }
}

/// Reference to a stream chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRef {
    pub stream_contract_address: String,
    pub chunk_num: i64,
}

impl ChunkRef {
    /// Key of the usage debit for this chunk.
    #[must_use]
    pub fn correlation_key(&self) -> CorrelationKey {
        CorrelationKey::StreamChunk {
            contract_address: self.stream_contract_address.clone(),
            chunk_num: self.chunk_num,
        }
    }
}
