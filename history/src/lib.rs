//! Durable, append-only storage for raw observations and derived features.
//!
//! Both logs are plain CSV files that only ever grow. Writers serialize on a
//! tail lock and publish a *committed length* after each fsync; readers only
//! look at bytes below that length, so they see whole records or nothing.

mod codec;
pub mod errors;
pub mod feature_log;
mod log_file;
pub mod snapshot;
pub mod store;

pub use errors::HistoryError;
pub use feature_log::FeatureLog;
pub use log_file::{AppendReceipt, OrderingPolicy};
pub use snapshot::SnapshotHandle;
pub use store::{HistoryStore, ObservationRange, RangeIter};
