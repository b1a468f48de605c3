use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use corelib::{Classify, ErrorKind};
use tracing::{debug, info, instrument, warn};

use crate::ArchiveSink;
use crate::errors::SinkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    RawLog,
    Snapshot,
    FeatureLog,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArtifactKind::RawLog => "raw_log",
            ArtifactKind::Snapshot => "snapshot",
            ArtifactKind::FeatureLog => "feature_log",
        })
    }
}

/// A local file that should be replicated off-box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    pub fn raw_log(path: impl Into<PathBuf>) -> Self {
        Self::new(ArtifactKind::RawLog, path)
    }

    pub fn snapshot(path: impl Into<PathBuf>) -> Self {
        Self::new(ArtifactKind::Snapshot, path)
    }

    pub fn feature_log(path: impl Into<PathBuf>) -> Self {
        Self::new(ArtifactKind::FeatureLog, path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug)]
pub enum SyncResult {
    Uploaded,
    /// No archive sink is configured.
    Skipped,
    Failed(SinkError),
}

impl SyncResult {
    pub fn is_failure(&self) -> bool {
        matches!(self, SyncResult::Failed(_))
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            SyncResult::Failed(e) => Some(e.kind()),
            _ => None,
        }
    }
}

/// Pushes artifacts to the archive sink, one bounded attempt each.
#[derive(Clone)]
pub struct ArchiveSync {
    sink: Option<Arc<dyn ArchiveSink>>,
    timeout: Duration,
}

impl ArchiveSync {
    pub fn new(sink: Option<Arc<dyn ArchiveSink>>, timeout: Duration) -> Self {
        Self { sink, timeout }
    }

    pub fn disabled() -> Self {
        Self::new(None, Duration::ZERO)
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Never fails: a sink error is logged and returned as `SyncResult::Failed`.
    #[instrument(
        skip(self, artifact),
        target = "archive",
        fields(kind = %artifact.kind, path = %artifact.path.display())
    )]
    pub async fn push(&self, artifact: &Artifact) -> SyncResult {
        let Some(sink) = &self.sink else {
            debug!("no archive sink configured; skipping");
            return SyncResult::Skipped;
        };

        let outcome = match tokio::time::timeout(self.timeout, sink.upload(&artifact.path)).await {
            Ok(res) => res,
            Err(_) => Err(SinkError::Timeout(self.timeout)),
        };

        match outcome {
            Ok(()) => {
                info!(sink = %sink.describe(), "artifact archived");
                SyncResult::Uploaded
            }
            Err(e) => {
                warn!(
                    sink = %sink.describe(),
                    error = %e,
                    error_kind = %e.kind(),
                    "archive push failed; local copy is intact"
                );
                SyncResult::Failed(e)
            }
        }
    }
}
