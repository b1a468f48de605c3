use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::debug;

use crate::ArchiveSink;
use crate::errors::SinkError;
use crate::http;

/// Object-store style upload: `PUT <base>/<file name>` with the file bytes.
#[derive(Clone)]
pub struct HttpPutSink {
    http: Client,
    base: Url,
}

impl HttpPutSink {
    pub fn new(mut base: Url, request_timeout: Duration) -> Result<Self, SinkError> {
        // Without a trailing slash `join` would replace the last segment.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            http: http::client(request_timeout)?,
            base,
        })
    }

    pub fn object_url(&self, name: &str) -> Result<Url, SinkError> {
        self.base
            .join(name)
            .map_err(|e| SinkError::InvalidUri(format!("{}{name}: {e}", self.base)))
    }
}

#[async_trait]
impl ArchiveSink for HttpPutSink {
    fn describe(&self) -> String {
        self.base.to_string()
    }

    async fn upload(&self, path: &Path) -> Result<(), SinkError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| SinkError::Unavailable(format!("{} has no file name", path.display())))?;
        let url = self.object_url(name)?;

        let body = tokio::fs::read(path).await.map_err(|source| SinkError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let bytes = body.len();

        let resp = self
            .http
            .put(url.clone())
            .header(reqwest::header::CONTENT_TYPE, "text/csv")
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SinkError::Unavailable(format!("PUT {url} returned {status}")));
        }

        debug!(%url, bytes, "artifact uploaded");
        Ok(())
    }
}
