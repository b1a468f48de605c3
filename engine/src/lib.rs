//! Derivation stages: rolling statistics over the recorded history and the
//! fixed-threshold anomaly rule applied to them.
//!
//! Nothing in here talks to the network; alert and archive transport live in
//! `delivery`.

pub mod anomaly;
pub mod rolling_stats;
mod stats;

pub use anomaly::{AnomalyDetector, evaluate};
pub use rolling_stats::RollingStatsEngine;
