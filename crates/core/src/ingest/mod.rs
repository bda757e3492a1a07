//! Event ingest: the consumer side of the message bus.

pub mod adapter;
pub mod events;

pub use adapter::{EventIngest, IngestOutcome};
pub use events::{BillingEvent, ChunkRef, UsageCompleted};
