use std::fmt;
use std::time::Duration;

use corelib::{Classify, ErrorKind};
use feed::FetchError;
use history::HistoryError;
use thiserror::Error;
use tokio::task::JoinError;

/// Pipeline stage names, as they appear in logs and cycle reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Fetch,
    Append,
    Snapshot,
    ArchiveRaw,
    ArchiveSnapshot,
    Features,
    Detect,
    Alert,
    ArchiveFeatures,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Append => "append",
            Stage::Snapshot => "snapshot",
            Stage::ArchiveRaw => "archive_raw",
            Stage::ArchiveSnapshot => "archive_snapshot",
            Stage::Features => "features",
            Stage::Detect => "detect",
            Stage::Alert => "alert",
            Stage::ArchiveFeatures => "archive_features",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure that ended the cycle early. Anything committed before it stays.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("fetch did not complete within {0:?}")]
    FetchTimeout(Duration),

    #[error("{stage} failed: {source}")]
    Persistence {
        stage: Stage,
        #[source]
        source: HistoryError,
    },

    #[error("{stage} did not finish: {source}")]
    Interrupted {
        stage: Stage,
        #[source]
        source: JoinError,
    },
}

impl CycleError {
    pub(crate) fn persistence(stage: Stage) -> impl FnOnce(HistoryError) -> Self {
        move |source| CycleError::Persistence { stage, source }
    }

    pub fn stage(&self) -> Stage {
        match self {
            CycleError::Fetch(_) | CycleError::FetchTimeout(_) => Stage::Fetch,
            CycleError::Persistence { stage, .. } | CycleError::Interrupted { stage, .. } => *stage,
        }
    }
}

impl Classify for CycleError {
    fn kind(&self) -> ErrorKind {
        match self {
            CycleError::Fetch(e) => e.kind(),
            CycleError::FetchTimeout(_) => ErrorKind::SourceUnavailable,
            CycleError::Persistence { source, .. } => source.kind(),
            // The write may or may not have reached the disk.
            CycleError::Interrupted { .. } => ErrorKind::PersistenceError,
        }
    }
}
