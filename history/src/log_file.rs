use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use csv::StringRecord;
use fd_lock::RwLock;
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::codec::encode_line;
use crate::errors::HistoryError;

/// What to do with a record whose timestamp is earlier than the newest one
/// already in the log (clock skew, manual backfill).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderingPolicy {
    /// Refuse the append; the log is left untouched.
    #[default]
    Reject,

    /// Append it; reads yield arrival order.
    AcceptAsIs,

    /// Append it; reads yield timestamp order (stable for ties).
    Reorder,
}

impl FromStr for OrderingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(OrderingPolicy::Reject),
            "accept" | "accept-as-is" => Ok(OrderingPolicy::AcceptAsIs),
            "reorder" => Ok(OrderingPolicy::Reorder),
            other => Err(format!(
                "unknown ordering policy '{other}' (expected reject, accept or reorder)"
            )),
        }
    }
}

impl fmt::Display for OrderingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OrderingPolicy::Reject => "reject",
            OrderingPolicy::AcceptAsIs => "accept",
            OrderingPolicy::Reorder => "reorder",
        })
    }
}

/// Where a successfully appended record landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendReceipt {
    /// Zero-based record number (header excluded).
    pub index: u64,
    pub offset: u64,
    pub len: u64,
    pub out_of_order: bool,
}

/// Reader-visible state: only bytes below `len` are whole, fsynced records.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Committed {
    pub len: u64,
    pub monotonic: bool,
}

/// Validates one complete row and returns its timestamp.
type RowCheck = dyn Fn(&StringRecord) -> Result<DateTime<Utc>, String> + Send + Sync;

struct Tail {
    /// Advisory lock shared with every other handle on the same path.
    file: RwLock<File>,
    rows: RowState,
    /// `(rollback_to, end)` left behind by a write whose rollback failed.
    stale: Option<(u64, u64)>,
}

#[derive(Debug, Clone, Copy)]
struct RowState {
    last_ts: Option<DateTime<Utc>>,
    records: u64,
    monotonic: bool,
}

impl RowState {
    const EMPTY: RowState = RowState {
        last_ts: None,
        records: 0,
        monotonic: true,
    };

    fn absorb<R: Read>(
        &mut self,
        path: &Path,
        rdr: &mut csv::Reader<R>,
        check: &RowCheck,
    ) -> Result<(), HistoryError> {
        for rec in rdr.records() {
            let rec = rec.map_err(HistoryError::csv(path))?;
            let ts = check(&rec).map_err(|reason| HistoryError::Corrupt {
                path: path.to_path_buf(),
                row: self.records + 1,
                reason,
            })?;

            if let Some(last) = self.last_ts {
                if ts < last {
                    self.monotonic = false;
                }
            }
            self.last_ts = Some(self.last_ts.map_or(ts, |last| last.max(ts)));
            self.records += 1;
        }
        Ok(())
    }
}

/// An append-only CSV file whose first column is a UTC timestamp.
///
/// Several handles, in one process or many, may append to the same path.
/// Writes are serialized by an exclusive advisory lock on the file, and each
/// writer picks up rows the others committed before adding its own.
pub(crate) struct AppendOnlyCsv {
    path: PathBuf,
    check: Box<RowCheck>,
    tail: Mutex<Tail>,
    committed: AtomicU64,
    monotonic: AtomicBool,
}

impl AppendOnlyCsv {
    /// Open or create the log, recovering from a torn trailing row.
    ///
    /// `check` validates one complete row and returns its timestamp; any
    /// failure aborts the open rather than serving a log we cannot parse.
    pub(crate) fn open<F>(path: &Path, header: &[String], check: F) -> Result<Self, HistoryError>
    where
        F: Fn(&StringRecord) -> Result<DateTime<Utc>, String> + Send + Sync + 'static,
    {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(HistoryError::io(parent))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
            .map_err(HistoryError::io(path))?;

        let mut file = RwLock::new(file);
        let (len, rows) = {
            let mut guard = file.write().map_err(HistoryError::io(path))?;
            recover(path, &mut guard, header, &check)?
        };

        Ok(Self {
            path: path.to_path_buf(),
            check: Box::new(check),
            tail: Mutex::new(Tail {
                file,
                rows,
                stale: None,
            }),
            committed: AtomicU64::new(len),
            monotonic: AtomicBool::new(rows.monotonic),
        })
    }

    /// Append one record, all-or-nothing.
    ///
    /// Holds the tail mutex and the file lock for the whole write; both are
    /// released on every return path.
    pub(crate) fn append(
        &self,
        ts: DateTime<Utc>,
        fields: &[String],
        policy: OrderingPolicy,
    ) -> Result<AppendReceipt, HistoryError> {
        let line = encode_line(fields).map_err(HistoryError::csv(&self.path))?;

        let mut tail = self.tail.lock();
        let Tail { file, rows, stale } = &mut *tail;
        let mut file = file.write().map_err(HistoryError::io(&self.path))?;

        if let Some((rollback_to, end)) = *stale {
            // Only ours to discard if no other writer has touched the tail since.
            if disk_len(&self.path, &file)? == end {
                warn!(
                    path = %self.path.display(),
                    rollback_to,
                    end,
                    "discarding bytes left by a failed append"
                );
                file.set_len(rollback_to)
                    .map_err(HistoryError::io(&self.path))?;
            }
            *stale = None;
        }

        let offset = self.catch_up(&mut file, rows)?;

        let mut out_of_order = false;
        if let Some(last) = rows.last_ts {
            if ts < last {
                if policy == OrderingPolicy::Reject {
                    return Err(HistoryError::OutOfOrder { last, got: ts });
                }
                warn!(
                    path = %self.path.display(),
                    %last,
                    got = %ts,
                    %policy,
                    "accepting out-of-order record"
                );
                out_of_order = true;
            }
        }

        if let Err(source) = write_durably(&mut file, &line) {
            if let Err(rollback) = file.set_len(offset) {
                error!(
                    path = %self.path.display(),
                    error = %rollback,
                    "failed to roll back partial append; next append will retry"
                );
                *stale = file.metadata().ok().map(|m| (offset, m.len()));
            }
            return Err(HistoryError::Io {
                path: self.path.clone(),
                source,
            });
        }

        let index = rows.records;
        rows.records += 1;
        rows.last_ts = Some(rows.last_ts.map_or(ts, |last| last.max(ts)));

        if out_of_order {
            rows.monotonic = false;
            // Published before the new length so a reader that sees the
            // record also sees that the log is no longer sorted.
            self.monotonic.store(false, Ordering::Release);
        }

        let len = line.len() as u64;
        self.committed.store(offset + len, Ordering::Release);

        Ok(AppendReceipt {
            index,
            offset,
            len,
            out_of_order,
        })
    }

    /// Commits rows other writers appended past our committed length and
    /// returns the new end of the log. Must be called with the file lock held.
    ///
    /// A trailing fragment without a newline can only be left by a writer
    /// that died mid-write, so it is cut off.
    fn catch_up(&self, file: &mut File, rows: &mut RowState) -> Result<u64, HistoryError> {
        let committed = self.committed.load(Ordering::Acquire);
        let end = disk_len(&self.path, file)?;

        if end == committed {
            return Ok(committed);
        }
        if end < committed {
            return Err(HistoryError::Shrunk {
                path: self.path.clone(),
                committed,
                found: end,
            });
        }

        let mut bytes = Vec::new();
        file.seek(SeekFrom::Start(committed))
            .and_then(|_| std::io::Read::by_ref(file).take(end - committed).read_to_end(&mut bytes))
            .map_err(HistoryError::io(&self.path))?;

        let whole = bytes
            .iter()
            .rposition(|b| *b == b'\n')
            .map_or(0, |i| i + 1);

        if whole < bytes.len() {
            warn!(
                path = %self.path.display(),
                torn_bytes = bytes.len() - whole,
                "truncating torn row left by another writer"
            );
            file.set_len(committed + whole as u64)
                .and_then(|()| file.sync_data())
                .map_err(HistoryError::io(&self.path))?;
            bytes.truncate(whole);
        }

        if bytes.is_empty() {
            return Ok(committed);
        }

        let mut next = *rows;
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(bytes.as_slice());
        next.absorb(&self.path, &mut rdr, &*self.check)?;

        debug!(
            path = %self.path.display(),
            rows = next.records - rows.records,
            "picked up rows appended by another writer"
        );

        *rows = next;
        if !rows.monotonic {
            self.monotonic.store(false, Ordering::Release);
        }

        let len = committed + bytes.len() as u64;
        self.committed.store(len, Ordering::Release);
        Ok(len)
    }

    pub(crate) fn committed(&self) -> Committed {
        let len = self.committed.load(Ordering::Acquire);
        let monotonic = self.monotonic.load(Ordering::Acquire);
        Committed { len, monotonic }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn records(&self) -> u64 {
        self.tail.lock().rows.records
    }

    pub(crate) fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.tail.lock().rows.last_ts
    }
}

/// A fresh read handle limited to the first `len` bytes of `path`.
pub(crate) fn open_prefix(path: &Path, len: u64) -> Result<io::Take<File>, HistoryError> {
    File::open(path)
        .map(|f| f.take(len))
        .map_err(HistoryError::io(path))
}

fn disk_len(path: &Path, file: &File) -> Result<u64, HistoryError> {
    file.metadata()
        .map(|m| m.len())
        .map_err(HistoryError::io(path))
}

fn write_durably(file: &mut File, line: &[u8]) -> io::Result<()> {
    file.write_all(line)?;
    file.sync_data()
}

/// Truncates a torn trailing row, writes the header into an empty file and
/// scans every row. Runs under the file lock.
fn recover(
    path: &Path,
    file: &mut File,
    header: &[String],
    check: &RowCheck,
) -> Result<(u64, RowState), HistoryError> {
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(HistoryError::io(path))?;

    let intact = bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |i| i + 1);

    if intact < bytes.len() {
        warn!(
            path = %path.display(),
            torn_bytes = bytes.len() - intact,
            "truncating partial trailing row"
        );
        file.set_len(intact as u64)
            .and_then(|()| file.sync_data())
            .map_err(HistoryError::io(path))?;
        bytes.truncate(intact);
    }

    if bytes.is_empty() {
        let line = encode_line(header).map_err(HistoryError::csv(path))?;
        write_durably(file, &line).map_err(HistoryError::io(path))?;
        sync_parent_dir(path)?;
        bytes = line;
    }

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(bytes.as_slice());

    let found = rdr.headers().map_err(HistoryError::csv(path))?.clone();
    if found.iter().ne(header.iter().map(String::as_str)) {
        return Err(HistoryError::HeaderMismatch {
            path: path.to_path_buf(),
            expected: header.join(","),
            found: found.iter().collect::<Vec<_>>().join(","),
        });
    }

    let mut rows = RowState::EMPTY;
    rows.absorb(path, &mut rdr, check)?;

    Ok((bytes.len() as u64, rows))
}

#[cfg(unix)]
pub(crate) fn sync_parent_dir(path: &Path) -> Result<(), HistoryError> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(dir) => File::open(dir)
            .and_then(|d| d.sync_all())
            .map_err(HistoryError::io(dir)),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
pub(crate) fn sync_parent_dir(_path: &Path) -> Result<(), HistoryError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::parse_ts;
    use chrono::TimeZone;

    fn header() -> Vec<String> {
        vec!["timestamp".into(), "value".into()]
    }

    fn ts_of(rec: &StringRecord) -> Result<DateTime<Utc>, String> {
        parse_ts(rec.get(0).unwrap_or_default())
    }

    fn row(secs: i64, v: &str) -> (DateTime<Utc>, Vec<String>) {
        let ts = Utc.timestamp_opt(secs, 0).unwrap();
        (ts, vec![crate::codec::format_ts(&ts), v.to_string()])
    }

    #[test]
    fn creates_file_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/log.csv");

        let log = AppendOnlyCsv::open(&path, &header(), ts_of).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "timestamp,value\n");
        assert_eq!(log.records(), 0);
        assert_eq!(log.committed().len, 16);
    }

    #[test]
    fn torn_trailing_row_is_truncated_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        fs::write(
            &path,
            "timestamp,value\n2024-05-01T12:00:00Z,100\n2024-05-01T12:01",
        )
        .unwrap();

        let log = AppendOnlyCsv::open(&path, &header(), ts_of).unwrap();

        assert_eq!(log.records(), 1);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "timestamp,value\n2024-05-01T12:00:00Z,100\n"
        );
    }

    #[test]
    fn header_mismatch_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        fs::write(&path, "ts,price\n").unwrap();

        let err = AppendOnlyCsv::open(&path, &header(), ts_of).err().unwrap();
        assert!(matches!(err, HistoryError::HeaderMismatch { .. }), "{err}");
    }

    #[test]
    fn corrupt_row_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        fs::write(&path, "timestamp,value\nnot-a-time,1\n").unwrap();

        let err = AppendOnlyCsv::open(&path, &header(), ts_of).err().unwrap();
        assert!(matches!(err, HistoryError::Corrupt { row: 1, .. }), "{err}");
    }

    #[test]
    fn reject_policy_leaves_log_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let log = AppendOnlyCsv::open(&path, &header(), ts_of).unwrap();

        let (t1, r1) = row(100, "1");
        let (t0, r0) = row(50, "2");
        log.append(t1, &r1, OrderingPolicy::Reject).unwrap();
        let before = fs::read(&path).unwrap();

        let err = log.append(t0, &r0, OrderingPolicy::Reject).unwrap_err();

        assert!(matches!(err, HistoryError::OutOfOrder { .. }));
        assert_eq!(fs::read(&path).unwrap(), before);
        assert_eq!(log.records(), 1);
        assert!(log.committed().monotonic);
    }

    #[test]
    fn equal_timestamps_are_not_out_of_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = AppendOnlyCsv::open(&dir.path().join("log.csv"), &header(), ts_of).unwrap();

        let (t, r) = row(100, "1");
        log.append(t, &r, OrderingPolicy::Reject).unwrap();
        let receipt = log.append(t, &r, OrderingPolicy::Reject).unwrap();

        assert_eq!(receipt.index, 1);
        assert!(!receipt.out_of_order);
    }

    #[test]
    fn torn_row_from_another_writer_is_cut_before_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let log = AppendOnlyCsv::open(&path, &header(), ts_of).unwrap();

        let (t1, r1) = row(100, "1");
        log.append(t1, &r1, OrderingPolicy::Reject).unwrap();

        // A writer that died halfway through its row.
        let mut stray = OpenOptions::new().append(true).open(&path).unwrap();
        stray.write_all(b"1970-01-01T00:03:20Z,9").unwrap();
        drop(stray);

        let (t2, r2) = row(200, "2");
        let receipt = log.append(t2, &r2, OrderingPolicy::Reject).unwrap();

        assert_eq!(receipt.index, 1);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "timestamp,value\n1970-01-01T00:01:40Z,1\n1970-01-01T00:03:20Z,2\n"
        );
    }

    #[test]
    fn rows_from_another_handle_are_kept_and_counted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let a = AppendOnlyCsv::open(&path, &header(), ts_of).unwrap();
        let b = AppendOnlyCsv::open(&path, &header(), ts_of).unwrap();

        let (t1, r1) = row(100, "1");
        let (t2, r2) = row(200, "2");
        let first = b.append(t1, &r1, OrderingPolicy::Reject).unwrap();
        let second = a.append(t2, &r2, OrderingPolicy::Reject).unwrap();

        assert_eq!(first.offset, 16);
        assert_eq!(second.index, 1);
        assert_eq!(second.offset, first.offset + first.len);
        assert_eq!(a.records(), 2);
        assert_eq!(a.last_timestamp(), Some(t2));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "timestamp,value\n1970-01-01T00:01:40Z,1\n1970-01-01T00:03:20Z,2\n"
        );
    }

    #[test]
    fn ordering_is_checked_against_rows_from_other_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let a = AppendOnlyCsv::open(&path, &header(), ts_of).unwrap();
        let b = AppendOnlyCsv::open(&path, &header(), ts_of).unwrap();

        let (late, r_late) = row(200, "2");
        let (early, r_early) = row(100, "1");
        b.append(late, &r_late, OrderingPolicy::Reject).unwrap();

        let err = a.append(early, &r_early, OrderingPolicy::Reject).unwrap_err();
        assert!(matches!(err, HistoryError::OutOfOrder { .. }), "{err}");

        let receipt = a.append(early, &r_early, OrderingPolicy::AcceptAsIs).unwrap();
        assert!(receipt.out_of_order);
        assert!(!a.committed().monotonic);
    }

    #[test]
    fn log_shorter_than_committed_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let log = AppendOnlyCsv::open(&path, &header(), ts_of).unwrap();

        let (t1, r1) = row(100, "1");
        log.append(t1, &r1, OrderingPolicy::Reject).unwrap();
        OpenOptions::new().write(true).open(&path).unwrap().set_len(16).unwrap();

        let (t2, r2) = row(200, "2");
        let err = log.append(t2, &r2, OrderingPolicy::Reject).unwrap_err();
        assert!(matches!(err, HistoryError::Shrunk { committed: 39, found: 16, .. }), "{err}");
    }
}
