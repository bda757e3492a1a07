//! Accounts, transactions and their lifecycle.
//!
//! - `types` - accounts, transactions, statuses and correlation keys
//! - `lifecycle` - the status state machine
//! - `store` - storage traits with explicit scopes
//! - `memory` - in-process store
//! - `service` - transaction creation, transitions, balances and charges
//! - `resolver` - get-or-create of accounts for external users

pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod resolver;
pub mod service;
pub mod store;
pub mod types;

#[cfg(test)]
mod lifecycle_props;

pub use error::{LedgerError, StoreError};
pub use lifecycle::{Lifecycle, Transition, TransitionOutcome};
pub use memory::InMemoryLedgerStore;
pub use resolver::AccountResolver;
pub use service::{LedgerService, Transitioned};
pub use store::{LedgerScope, LedgerStore};
pub use types::{
    Account, CorrelationKey, NewAccount, NewTransaction, PaymentDetails, PaymentIntentStatus,
    Transaction, TransactionKind, TransactionStatus, UsageDetails,
};
