use std::time::Duration;

use corelib::{Classify, ErrorKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("price source unavailable: {0}")]
    Unavailable(String),

    #[error("invalid response from price source: {0}")]
    Format(String),

    #[error("price source rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
}

impl Classify for FetchError {
    fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Http(e) if e.is_decode() => ErrorKind::SourceFormatError,
            FetchError::Http(_) | FetchError::Unavailable(_) => ErrorKind::SourceUnavailable,
            FetchError::Format(_) => ErrorKind::SourceFormatError,
            FetchError::RateLimited { .. } => ErrorKind::SourceRateLimited,
        }
    }
}
