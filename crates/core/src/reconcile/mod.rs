//! Payment reconciliation against the payment provider.
//!
//! - `reconciler` - claim, check and release of one payment; stale sweeps
//! - `scheduler` - the periodic tasks running them

pub mod reconciler;
pub mod scheduler;

pub use reconciler::{CheckOutcome, Reconciler};
pub use scheduler::{ReconcileScheduler, ScheduleConfig, SchedulerHandle};
