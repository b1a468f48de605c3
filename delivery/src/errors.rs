use std::path::PathBuf;
use std::time::Duration;

use corelib::{Classify, ErrorKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("archive sink unavailable: {0}")]
    Unavailable(String),

    #[error("archive i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("archive upload timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid archive sink uri '{0}'")]
    InvalidUri(String),
}

impl Classify for SinkError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::SinkUnavailable
    }
}

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("notification rejected with status {0}")]
    Rejected(reqwest::StatusCode),

    #[error("notification http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification timed out after {0:?}")]
    Timeout(Duration),

    #[error("notification failed: {0}")]
    Failed(String),

    #[error("invalid notification sink uri '{0}'")]
    InvalidUri(String),
}

impl Classify for DeliveryError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::DeliveryError
    }
}
