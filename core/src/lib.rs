//! Shared domain model for the price ingestion pipeline.
//!
//! Every other crate in the workspace speaks in these types: observations
//! flow in from `feed`, are recorded by `history`, summarized and judged by
//! `engine`, and announced or replicated by `delivery`.

pub mod duration;
pub mod error;
pub mod models;

pub use error::{Classify, ErrorKind};
pub use models::*;
