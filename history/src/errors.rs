use std::path::PathBuf;

use chrono::{DateTime, Utc};
use corelib::{Classify, ErrorKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error on {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("out-of-order record: {got} is earlier than last recorded {last}")]
    OutOfOrder {
        last: DateTime<Utc>,
        got: DateTime<Utc>,
    },

    #[error("{} header mismatch: expected [{expected}], found [{found}]", path.display())]
    HeaderMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("{} row {row}: {reason}", path.display())]
    Corrupt {
        path: PathBuf,
        row: u64,
        reason: String,
    },

    #[error("{} holds {found} bytes, less than its committed {committed}", path.display())]
    Shrunk {
        path: PathBuf,
        committed: u64,
        found: u64,
    },

    #[error("snapshot {} already exists", .0.display())]
    SnapshotExists(PathBuf),
}

impl HistoryError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| HistoryError::Io { path, source }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>) -> impl FnOnce(csv::Error) -> Self {
        let path = path.into();
        move |source| HistoryError::Csv { path, source }
    }
}

impl Classify for HistoryError {
    /// Every local storage failure is a persistence failure: the write did
    /// not become durable and the log is as it was before the call.
    fn kind(&self) -> ErrorKind {
        ErrorKind::PersistenceError
    }
}
