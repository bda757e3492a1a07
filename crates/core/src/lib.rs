//! Core billing logic.
//!
//! This crate holds the ledger rules with no web or database dependencies.
//! Storage and external providers are reached through traits.
//!
//! # Modules
//!
//! - `ledger` - accounts, transactions, the status state machine and storage traits
//! - `payment` - payment initiation and provider callbacks
//! - `reconcile` - background reconciliation against the payment provider
//! - `ingest` - message-bus events applied to the ledger
//! - `charges` - daily charge aggregation and charts
//! - `ports` - identity and payment provider traits

pub mod charges;
pub mod ingest;
pub mod ledger;
pub mod payment;
pub mod ports;
pub mod reconcile;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;
