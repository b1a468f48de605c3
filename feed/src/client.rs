use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use corelib::Observation;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument, warn};

use crate::ObservationFetcher;
use crate::errors::FetchError;
use crate::parse::{ResponseShape, parse_observation};

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub endpoint: String,
    pub shape: ResponseShape,

    /// Upper bound on a single request, connect through body.
    pub request_timeout: Duration,
}

/// reqwest-backed price source. One GET per `fetch()`, no retries.
#[derive(Clone)]
pub struct HttpPriceSource {
    http: Client,
    endpoint: String,
    shape: ResponseShape,
}

impl HttpPriceSource {
    pub fn new(cfg: SourceConfig) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(cfg.request_timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            endpoint: cfg.endpoint,
            shape: cfg.shape,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ObservationFetcher for HttpPriceSource {
    #[instrument(skip(self), fields(endpoint = %self.endpoint), level = "debug")]
    async fn fetch(&self) -> Result<Observation, FetchError> {
        let resp = self.http.get(&self.endpoint).send().await?;
        let status = resp.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);

            warn!(?retry_after, "price source throttled the request");
            return Err(FetchError::RateLimited { retry_after });
        }

        if !status.is_success() {
            return Err(FetchError::Unavailable(format!("unexpected status {status}")));
        }

        let body = resp.bytes().await?;
        let observation = parse_observation(&body, &self.shape, Utc::now())?;

        debug!(
            value = %observation.value,
            timestamp = %observation.timestamp,
            "observation fetched"
        );

        Ok(observation)
    }
}
