use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::json;

use crate::Notifier;
use crate::errors::DeliveryError;
use crate::http;

/// Slack/Discord-compatible incoming webhook: `POST {"text": message}`.
#[derive(Clone)]
pub struct WebhookNotifier {
    http: Client,
    url: Url,
}

impl WebhookNotifier {
    pub fn new(url: Url, request_timeout: Duration) -> Result<Self, DeliveryError> {
        Ok(Self {
            http: http::client(request_timeout)?,
            url,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, message: &str) -> Result<(), DeliveryError> {
        let resp = self
            .http
            .post(self.url.clone())
            .json(&json!({ "text": message }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DeliveryError::Rejected(status));
        }
        Ok(())
    }
}
