//! Ledger domain types.
//!
//! Accounts, transactions, their statuses and the correlation keys used to
//! re-locate a transaction from inbound events.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use billing_shared::types::{AccountId, TransactionId};

/// Transaction status.
///
/// `Pending` and `Processing` are open; `Success`, `Canceled` and `Failed`
/// are terminal and never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Recorded, waiting for an external outcome.
    Pending,
    /// Waiting on the payment provider.
    Processing,
    /// Settled; counts towards balances.
    Success,
    /// Canceled by the provider or by a failed validation.
    Canceled,
    /// Failed on an error path.
    Failed,
}

impl TransactionStatus {
    /// Returns the string representation of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "success" => Some(Self::Success),
            "canceled" => Some(Self::Canceled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns true if no further transition is permitted.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Canceled | Self::Failed)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a transaction represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Funded by a payment-provider intent, bank to account.
    Payment,
    /// Usage charge, payer to payee.
    UsageDebit,
    /// Internal credit from the bank account.
    Deposit,
}

impl TransactionKind {
    /// Returns the string representation of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Payment => "payment",
            Self::UsageDebit => "usage_debit",
            Self::Deposit => "deposit",
        }
    }

    /// Parses a kind from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "payment" => Some(Self::Payment),
            "usage_debit" => Some(Self::UsageDebit),
            "deposit" => Some(Self::Deposit),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment intent status as reported by the payment provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
}

impl PaymentIntentStatus {
    /// Provider token for this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RequiresPaymentMethod => "requires_payment_method",
            Self::RequiresConfirmation => "requires_confirmation",
            Self::RequiresAction => "requires_action",
            Self::Processing => "processing",
            Self::RequiresCapture => "requires_capture",
            Self::Canceled => "canceled",
            Self::Succeeded => "succeeded",
        }
    }

    /// Parses a provider token.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "requires_payment_method" => Some(Self::RequiresPaymentMethod),
            "requires_confirmation" => Some(Self::RequiresConfirmation),
            "requires_action" => Some(Self::RequiresAction),
            "processing" => Some(Self::Processing),
            "requires_capture" => Some(Self::RequiresCapture),
            "canceled" => Some(Self::Canceled),
            "succeeded" => Some(Self::Succeeded),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentIntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A per-user billing account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// External user identity; one account per user.
    pub user_id: String,
    pub email: String,
    /// Billing-provider customer reference, attached on first payment.
    pub customer_ref: Option<String>,
    /// Cached balance. The ledger sum is authoritative.
    pub balance: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Input for creating an account.
#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    /// Assigned by the store when absent.
    pub id: Option<AccountId>,
    pub user_id: String,
    pub email: String,
    /// Assigned by the store when absent.
    pub created_at: Option<DateTime<Utc>>,
}

impl NewAccount {
    /// Creates an input for the given user.
    #[must_use]
    pub fn new(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            ..Self::default()
        }
    }
}

/// Payment-provider fields of a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub intent_id: Option<String>,
    pub client_secret: Option<String>,
    /// Mirror of the provider's intent status.
    pub status: Option<PaymentIntentStatus>,
    pub checkout_session_id: Option<String>,
}

/// Usage fields of a `UsageDebit` transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageDetails {
    pub stream_id: String,
    pub stream_name: Option<String>,
    pub stream_contract_address: String,
    pub stream_is_live: bool,
    pub profile_id: Option<String>,
    pub profile_name: Option<String>,
    /// Profile cost in major units.
    pub profile_cost: Option<Decimal>,
    pub task_id: Option<String>,
    pub chunk_num: i64,
    pub duration_secs: i64,
    /// Price per second in major units.
    pub price: Decimal,
}

/// A ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub kind: TransactionKind,
    pub from: AccountId,
    pub to: AccountId,
    /// Minor currency units.
    pub amount: i64,
    pub status: TransactionStatus,
    pub payment: PaymentDetails,
    pub usage: Option<UsageDetails>,
    pub created_at: DateTime<Utc>,
    /// Last time a reconciliation claim was taken or released.
    pub checked_at: DateTime<Utc>,
    pub is_locked: bool,
}

impl Transaction {
    /// Returns true if the given correlation key points at this transaction.
    #[must_use]
    pub fn matches(&self, key: &CorrelationKey) -> bool {
        match key {
            CorrelationKey::PaymentIntent(id) => self.payment.intent_id.as_deref() == Some(id),
            CorrelationKey::CheckoutSession(id) => {
                self.payment.checkout_session_id.as_deref() == Some(id)
            }
            CorrelationKey::StreamChunk {
                contract_address,
                chunk_num,
            } => self.usage.as_ref().is_some_and(|usage| {
                usage.stream_contract_address == *contract_address
                    && usage.chunk_num == *chunk_num
            }),
        }
    }

    /// Returns true if the reconciler may claim this transaction.
    #[must_use]
    pub fn is_claimable(&self) -> bool {
        !self.is_locked
            && self.status == TransactionStatus::Processing
            && self.payment.intent_id.is_some()
    }
}

/// Input for creating a transaction.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    /// Assigned by the store when absent.
    pub id: Option<TransactionId>,
    pub kind: TransactionKind,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: i64,
    pub status: TransactionStatus,
    pub payment: PaymentDetails,
    pub usage: Option<UsageDetails>,
    /// Assigned by the store when absent.
    pub created_at: Option<DateTime<Utc>>,
}

impl NewTransaction {
    /// A successful credit from the bank account.
    #[must_use]
    pub fn deposit(to: AccountId, amount: i64) -> Self {
        Self {
            id: None,
            kind: TransactionKind::Deposit,
            from: AccountId::BANK,
            to,
            amount,
            status: TransactionStatus::Success,
            payment: PaymentDetails::default(),
            usage: None,
            created_at: None,
        }
    }

    /// A payment awaiting its provider intent.
    #[must_use]
    pub fn payment(to: AccountId, amount: i64, payment: PaymentDetails) -> Self {
        Self {
            id: None,
            kind: TransactionKind::Payment,
            from: AccountId::BANK,
            to,
            amount,
            status: TransactionStatus::Processing,
            payment,
            usage: None,
            created_at: None,
        }
    }

    /// A pending usage charge from `from` to `to`.
    #[must_use]
    pub fn usage_debit(from: AccountId, to: AccountId, amount: i64, usage: UsageDetails) -> Self {
        Self {
            id: None,
            kind: TransactionKind::UsageDebit,
            from,
            to,
            amount,
            status: TransactionStatus::Pending,
            payment: PaymentDetails::default(),
            usage: Some(usage),
            created_at: None,
        }
    }

    /// Overrides the initial status.
    #[must_use]
    pub const fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = status;
        self
    }
}

/// External identifier used to re-locate a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CorrelationKey {
    /// Payment-provider intent ID.
    PaymentIntent(String),
    /// Checkout-session ID.
    CheckoutSession(String),
    /// Stream contract address and chunk number of a usage debit.
    StreamChunk {
        contract_address: String,
        chunk_num: i64,
    },
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PaymentIntent(id) => write!(f, "payment_intent:{id}"),
            Self::CheckoutSession(id) => write!(f, "checkout_session:{id}"),
            Self::StreamChunk {
                contract_address,
                chunk_num,
            } => write!(f, "stream_chunk:{contract_address}/{chunk_num}"),
        }
    }
}
