//! Best-effort hand-off to the outside world.
//!
//! [`AlertDispatcher`] forwards anomaly events to a [`Notifier`];
//! [`ArchiveSync`] replicates local artifacts through an [`ArchiveSink`].
//! Neither ever returns an error to the caller: failures are logged and
//! reported as values so a broken sink cannot undo local persistence.

pub mod alert;
pub mod archive;
pub mod errors;
mod http;
pub mod sinks;

use std::path::Path;

use async_trait::async_trait;

pub use alert::{AlertDispatcher, AlertOutcome, AlertStatus, DispatchResult, format_event};
pub use archive::{Artifact, ArtifactKind, ArchiveSync, SyncResult};
pub use errors::{DeliveryError, SinkError};
pub use sinks::{
    DirectorySink, HttpPutSink, WebhookNotifier, archive_sink_from_uri, notifier_from_uri,
};

/// Durable object storage: `upload(file)`.
#[async_trait]
pub trait ArchiveSink: Send + Sync {
    /// Short human label for logs (`dir:/mnt/replica`, `http://...`).
    fn describe(&self) -> String;

    async fn upload(&self, path: &Path) -> Result<(), SinkError>;
}

/// Alert transport: `notify(message)`.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<(), DeliveryError>;
}
