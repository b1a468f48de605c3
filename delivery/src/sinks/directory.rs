use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::ArchiveSink;
use crate::errors::SinkError;

/// Replicates artifacts into a directory (a mounted bucket, a NAS share).
///
/// Each upload lands under a temporary name and is renamed into place, so a
/// reader of the replica never sees a half-copied file.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ArchiveSink for DirectorySink {
    fn describe(&self) -> String {
        format!("dir:{}", self.root.display())
    }

    async fn upload(&self, path: &Path) -> Result<(), SinkError> {
        let name = path
            .file_name()
            .ok_or_else(|| SinkError::Unavailable(format!("{} has no file name", path.display())))?;

        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| SinkError::Io {
                path: self.root.clone(),
                source,
            })?;

        let dest = self.root.join(name);
        // Unique per upload so concurrent pushes of one artifact never share a file.
        let staging = self.root.join(format!(
            ".{}.{}.partial",
            name.to_string_lossy(),
            Uuid::new_v4().simple()
        ));

        let copied = fs::copy(path, &staging).await.map_err(|source| SinkError::Io {
            path: path.to_path_buf(),
            source,
        });
        let bytes = match copied {
            Ok(n) => n,
            Err(e) => {
                discard_staging(&staging).await;
                return Err(e);
            }
        };

        if let Err(source) = fs::rename(&staging, &dest).await {
            discard_staging(&staging).await;
            return Err(SinkError::Io { path: dest, source });
        }

        debug!(dest = %dest.display(), bytes, "artifact copied to replica");
        Ok(())
    }
}

async fn discard_staging(staging: &Path) {
    match fs::remove_file(staging).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            path = %staging.display(),
            error = %e,
            "failed to remove staging copy"
        ),
    }
}
