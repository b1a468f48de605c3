mod directory;
mod http_put;
mod webhook;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;

pub use directory::DirectorySink;
pub use http_put::HttpPutSink;
pub use webhook::WebhookNotifier;

use crate::errors::{DeliveryError, SinkError};
use crate::{ArchiveSink, Notifier};

/// `file:///dir` or a bare path → [`DirectorySink`]; `http(s)://base` →
/// [`HttpPutSink`].
pub fn archive_sink_from_uri(
    uri: &str,
    request_timeout: Duration,
) -> Result<Arc<dyn ArchiveSink>, SinkError> {
    let uri = uri.trim();
    if uri.is_empty() {
        return Err(SinkError::InvalidUri(uri.to_string()));
    }

    match Url::parse(uri) {
        Ok(url) if url.scheme() == "file" => {
            let dir = url
                .to_file_path()
                .map_err(|()| SinkError::InvalidUri(uri.to_string()))?;
            Ok(Arc::new(DirectorySink::new(dir)))
        }
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            Ok(Arc::new(HttpPutSink::new(url, request_timeout)?))
        }
        Ok(_) => Err(SinkError::InvalidUri(uri.to_string())),
        Err(_) => Ok(Arc::new(DirectorySink::new(PathBuf::from(uri)))),
    }
}

/// Only `http(s)://` webhooks are supported.
pub fn notifier_from_uri(
    uri: &str,
    request_timeout: Duration,
) -> Result<Arc<dyn Notifier>, DeliveryError> {
    let url = Url::parse(uri.trim()).map_err(|_| DeliveryError::InvalidUri(uri.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(DeliveryError::InvalidUri(uri.to_string()));
    }
    Ok(Arc::new(WebhookNotifier::new(url, request_timeout)?))
}
