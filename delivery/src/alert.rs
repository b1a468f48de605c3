use std::sync::Arc;
use std::time::Duration;

use chrono::SecondsFormat;
use corelib::{AnomalyEvent, Classify};
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use crate::Notifier;
use crate::errors::DeliveryError;

#[derive(Debug)]
pub enum AlertStatus {
    Sent,
    /// Alerting is disabled (no notification sink).
    Skipped,
    Failed(DeliveryError),
}

#[derive(Debug)]
pub struct AlertOutcome {
    pub rule: String,
    pub message: String,
    pub status: AlertStatus,
}

/// Per-event outcomes of one dispatch, in event order.
#[derive(Debug, Default)]
pub struct DispatchResult {
    pub outcomes: Vec<AlertOutcome>,
}

impl DispatchResult {
    pub fn sent(&self) -> usize {
        self.count(|s| matches!(s, AlertStatus::Sent))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, AlertStatus::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, AlertStatus::Failed(_)))
    }

    pub fn failures(&self) -> impl Iterator<Item = &DeliveryError> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            AlertStatus::Failed(e) => Some(e),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    fn count(&self, pred: impl Fn(&AlertStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// One-line, human-readable alert text.
pub fn format_event(asset: &str, event: &AnomalyEvent) -> String {
    format!(
        "[{asset}] {} anomaly at {}: {} is {} vs rolling mean {} (threshold {})",
        event.rule_triggered,
        event.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        event.observed_value,
        signed_percent(event.magnitude),
        event.mean,
        percent(event.threshold),
    )
}

fn percent(fraction: Decimal) -> String {
    format!("{}%", (fraction * Decimal::ONE_HUNDRED).round_dp(2))
}

fn signed_percent(fraction: Decimal) -> String {
    if fraction.is_sign_negative() {
        percent(fraction)
    } else {
        format!("+{}", percent(fraction))
    }
}

/// Forwards anomaly events to the notifier; one attempt per event.
#[derive(Clone)]
pub struct AlertDispatcher {
    notifier: Option<Arc<dyn Notifier>>,
    asset: String,
    timeout: Duration,
}

impl AlertDispatcher {
    pub fn new(notifier: Option<Arc<dyn Notifier>>, asset: impl Into<String>, timeout: Duration) -> Self {
        Self {
            notifier,
            asset: asset.into(),
            timeout,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.notifier.is_some()
    }

    /// Delivery failures are logged and recorded, never returned as `Err`.
    #[instrument(skip(self, events), target = "alert", fields(events = events.len()))]
    pub async fn dispatch(&self, events: &[AnomalyEvent]) -> DispatchResult {
        let mut result = DispatchResult::default();

        for event in events {
            let message = format_event(&self.asset, event);
            let status = self.deliver(&message).await;

            match &status {
                AlertStatus::Sent => info!(rule = %event.rule_triggered, "alert delivered"),
                AlertStatus::Skipped => {
                    debug!(rule = %event.rule_triggered, %message, "alerting disabled; not sent")
                }
                AlertStatus::Failed(e) => warn!(
                    rule = %event.rule_triggered,
                    error = %e,
                    error_kind = %e.kind(),
                    "alert delivery failed"
                ),
            }

            result.outcomes.push(AlertOutcome {
                rule: event.rule_triggered.clone(),
                message,
                status,
            });
        }

        result
    }

    async fn deliver(&self, message: &str) -> AlertStatus {
        let Some(notifier) = &self.notifier else {
            return AlertStatus::Skipped;
        };

        match tokio::time::timeout(self.timeout, notifier.notify(message)).await {
            Ok(Ok(())) => AlertStatus::Sent,
            Ok(Err(e)) => AlertStatus::Failed(e),
            Err(_) => AlertStatus::Failed(DeliveryError::Timeout(self.timeout)),
        }
    }
}
