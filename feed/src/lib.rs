//! Observation fetching.
//!
//! Pulls one `(timestamp, value)` sample from the remote price source per
//! call. The fetcher never retries and never persists: it fails fast with a
//! classifiable [`FetchError`] and leaves the retry/skip decision to the
//! caller.

pub mod client;
pub mod errors;
pub mod parse;

use async_trait::async_trait;
use corelib::Observation;

pub use client::{HttpPriceSource, SourceConfig};
pub use errors::FetchError;
pub use parse::{ResponseShape, parse_observation};

/// Abstraction over the remote price source.
#[async_trait]
pub trait ObservationFetcher: Send + Sync {
    async fn fetch(&self) -> Result<Observation, FetchError>;
}
