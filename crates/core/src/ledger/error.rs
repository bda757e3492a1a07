//! Ledger error types.
//!
//! `StoreError` is what storage backends report; `LedgerError` is what the
//! services in this crate return to callers.

use thiserror::Error;

use billing_shared::AppError;

use crate::ledger::types::{TransactionKind, TransactionStatus};
use crate::ports::ProviderError;

/// Errors reported by a `LedgerStore` implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The requested row does not exist.
    #[error("{entity} not found: {key}")]
    NotFound {
        /// Entity name, e.g. "account".
        entity: &'static str,
        /// Lookup key as displayed.
        key: String,
    },

    /// A uniqueness constraint was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The backing store failed or is unreachable.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Shorthand for a `NotFound` error.
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }
}

/// Errors returned by ledger, payment, reconciliation and ingest services.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// An account or transaction could not be found.
    #[error("{entity} not found: {key}")]
    NotFound {
        /// Entity name.
        entity: &'static str,
        /// Lookup key as displayed.
        key: String,
    },

    /// A uniqueness constraint was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The requested change is not allowed for the transaction.
    #[error("Transition rejected for {kind} transaction in status {status}: {reason}")]
    TransitionRejected {
        /// Transaction kind.
        kind: TransactionKind,
        /// Current status.
        status: TransactionStatus,
        /// Why the change was refused.
        reason: String,
    },

    /// Input was rejected before reaching storage.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The payment or identity provider failed.
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The backing store failed.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl LedgerError {
    /// Returns true for `NotFound`.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, key } => Self::NotFound { entity, key },
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::Unavailable(msg) => Self::StoreUnavailable(msg),
        }
    }
}

impl From<ProviderError> for LedgerError {
    fn from(err: ProviderError) -> Self {
        Self::ProviderUnavailable(err.to_string())
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound { .. } => Self::NotFound(err.to_string()),
            LedgerError::Conflict(msg) => Self::Conflict(msg),
            LedgerError::TransitionRejected { .. } => Self::BusinessRule(err.to_string()),
            LedgerError::InvalidInput(msg) => Self::Validation(msg),
            LedgerError::ProviderUnavailable(_) | LedgerError::StoreUnavailable(_) => {
                tracing::error!(error = %err, "ledger operation failed");
                Self::internal()
            }
        }
    }
}
