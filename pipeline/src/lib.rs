//! One ingestion cycle, end to end.
//!
//! [`Pipeline::run_cycle`] fetches a sample, records it, derives features,
//! judges them and hands the results to the delivery channels. Fetch and
//! local persistence failures abort the cycle as a [`CycleError`]; sink and
//! delivery failures are recorded in the [`CycleReport`] and the cycle still
//! succeeds.

mod bootstrap;
pub mod config;
pub mod cycle;
pub mod error;

pub use config::PipelineConfig;
pub use cycle::{Components, CycleReport, Pipeline};
pub use error::{CycleError, Stage};
