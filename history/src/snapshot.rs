use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::errors::HistoryError;
use crate::log_file::{open_prefix, sync_parent_dir};

const COPY_CHUNK: usize = 64 * 1024;

/// An immutable point-in-time copy of the raw log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotHandle {
    pub path: PathBuf,
    pub taken_at: DateTime<Utc>,
    pub len: u64,
    /// Hex-encoded SHA-256 of the snapshot bytes.
    pub sha256: String,
}

impl SnapshotHandle {
    /// Re-hashes the file on disk; `false` means it changed after capture.
    pub fn verify(&self) -> Result<bool, HistoryError> {
        let file = File::open(&self.path).map_err(HistoryError::io(&self.path))?;
        let mut hasher = Sha256::new();
        let len = copy_hashing(file, &mut io::sink(), &mut hasher)
            .map_err(HistoryError::io(&self.path))?;

        Ok(len == self.len && hex::encode(hasher.finalize()) == self.sha256)
    }
}

/// `<log stem>-<UTC capture instant, nanosecond precision>.csv`
pub fn snapshot_file_name(source: &Path, taken_at: &DateTime<Utc>) -> String {
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("history");
    format!("{stem}-{}.csv", taken_at.format("%Y%m%dT%H%M%S%.9fZ"))
}

/// Copies the first `len` bytes of `source` into a new read-only file in `dir`.
///
/// An existing snapshot is never overwritten. A failed copy removes the
/// partial file; the source log is only ever read.
pub(crate) fn write_snapshot(
    source: &Path,
    len: u64,
    dir: &Path,
    taken_at: DateTime<Utc>,
) -> Result<SnapshotHandle, HistoryError> {
    fs::create_dir_all(dir).map_err(HistoryError::io(dir))?;

    let dest = dir.join(snapshot_file_name(source, &taken_at));
    let mut out = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&dest)
        .map_err(|source| match source.kind() {
            io::ErrorKind::AlreadyExists => HistoryError::SnapshotExists(dest.clone()),
            _ => HistoryError::Io {
                path: dest.clone(),
                source,
            },
        })?;

    let mut hasher = Sha256::new();
    let copied = open_prefix(source, len).and_then(|reader| {
        copy_hashing(reader, &mut out, &mut hasher)
            .and_then(|n| {
                if n == len {
                    out.sync_all().map(|()| n)
                } else {
                    Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("log shorter than committed length ({n} < {len})"),
                    ))
                }
            })
            .map_err(HistoryError::io(&dest))
    });

    if let Err(err) = copied {
        drop(out);
        if let Err(cleanup) = fs::remove_file(&dest) {
            warn!(path = %dest.display(), error = %cleanup, "failed to remove partial snapshot");
        }
        return Err(err);
    }
    drop(out);

    let mut perms = fs::metadata(&dest)
        .map_err(HistoryError::io(&dest))?
        .permissions();
    perms.set_readonly(true);
    fs::set_permissions(&dest, perms).map_err(HistoryError::io(&dest))?;
    sync_parent_dir(&dest)?;

    let handle = SnapshotHandle {
        path: dest,
        taken_at,
        len,
        sha256: hex::encode(hasher.finalize()),
    };

    info!(
        target: "store",
        path = %handle.path.display(),
        bytes = handle.len,
        sha256 = %handle.sha256,
        "snapshot written"
    );

    Ok(handle)
}

fn copy_hashing<R: Read, W: Write>(
    mut reader: R,
    writer: &mut W,
    hasher: &mut Sha256,
) -> io::Result<u64> {
    let mut buf = vec![0u8; COPY_CHUNK];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
}
