use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use corelib::Observation;
use tracing::{debug, instrument};

use crate::codec::{decode_observation, encode_observation};
use crate::errors::HistoryError;
use crate::log_file::{AppendOnlyCsv, AppendReceipt, OrderingPolicy, open_prefix};
use crate::snapshot::{self, SnapshotHandle};

const RAW_HEADER: [&str; 2] = ["timestamp", "value"];

/// The raw observation log: append-only, fsynced per record, single source
/// of truth for everything derived downstream.
pub struct HistoryStore {
    log: AppendOnlyCsv,
    policy: OrderingPolicy,
}

impl HistoryStore {
    pub fn open(path: impl AsRef<Path>, policy: OrderingPolicy) -> Result<Self, HistoryError> {
        let path = path.as_ref();
        let header: Vec<String> = RAW_HEADER.iter().map(|h| h.to_string()).collect();

        let log = AppendOnlyCsv::open(path, &header, |rec| {
            decode_observation(rec).map(|obs| obs.timestamp)
        })?;

        debug!(
            target: "store",
            path = %path.display(),
            records = log.records(),
            %policy,
            "history log opened"
        );

        Ok(Self { log, policy })
    }

    /// Durably appends one observation. Nothing is deduplicated.
    #[instrument(
        skip(self, obs),
        target = "store",
        fields(ts = %obs.timestamp, value = %obs.value)
    )]
    pub fn append(&self, obs: &Observation) -> Result<AppendReceipt, HistoryError> {
        let receipt = self
            .log
            .append(obs.timestamp, &encode_observation(obs), self.policy)?;

        debug!(index = receipt.index, offset = receipt.offset, "observation committed");
        Ok(receipt)
    }

    /// Copies the committed log into `dir` under a name derived from now.
    pub fn snapshot(&self, dir: impl AsRef<Path>) -> Result<SnapshotHandle, HistoryError> {
        self.snapshot_at(dir, Utc::now())
    }

    #[instrument(skip(self, dir), target = "store", fields(dir = %dir.as_ref().display()))]
    pub fn snapshot_at(
        &self,
        dir: impl AsRef<Path>,
        taken_at: DateTime<Utc>,
    ) -> Result<SnapshotHandle, HistoryError> {
        let committed = self.log.committed();
        snapshot::write_snapshot(self.log.path(), committed.len, dir.as_ref(), taken_at)
    }

    /// Observations with `from <= timestamp <= to`, as committed right now.
    ///
    /// The range is pinned to the current committed length: records appended
    /// later are not visible through it, however many times it is iterated.
    pub fn read_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> ObservationRange {
        let committed = self.log.committed();
        let sorted = self.policy == OrderingPolicy::Reorder && !committed.monotonic;

        ObservationRange {
            path: self.log.path().to_path_buf(),
            len: committed.len,
            from,
            to,
            monotonic: committed.monotonic,
            sorted,
        }
    }

    pub fn read_all(&self) -> ObservationRange {
        self.read_range(DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC)
    }

    pub fn len(&self) -> u64 {
        self.log.records()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.log.last_timestamp()
    }

    pub fn path(&self) -> &Path {
        self.log.path()
    }

    pub fn policy(&self) -> OrderingPolicy {
        self.policy
    }
}

/// A finite, restartable view over a committed prefix of the raw log.
#[derive(Debug, Clone)]
pub struct ObservationRange {
    path: PathBuf,
    len: u64,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    monotonic: bool,
    sorted: bool,
}

impl ObservationRange {
    /// Starts a new pass over the range. Each call reopens the file.
    pub fn iter(&self) -> Result<RangeIter, HistoryError> {
        let rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(open_prefix(&self.path, self.len)?);

        let streaming = Streaming {
            records: rdr.into_records(),
            path: self.path.clone(),
            row: 0,
            from: self.from,
            to: self.to,
            stop_past_end: self.monotonic,
            done: false,
        };

        if !self.sorted {
            return Ok(RangeIter(Inner::Streaming(streaming)));
        }

        let mut buffered = streaming.collect::<Result<Vec<_>, _>>()?;
        buffered.sort_by_key(|obs| obs.timestamp);
        Ok(RangeIter(Inner::Buffered(buffered.into_iter())))
    }

    pub fn to_vec(&self) -> Result<Vec<Observation>, HistoryError> {
        self.iter()?.collect()
    }
}

pub struct RangeIter(Inner);

enum Inner {
    Streaming(Streaming),
    Buffered(std::vec::IntoIter<Observation>),
}

struct Streaming {
    records: csv::StringRecordsIntoIter<io::Take<File>>,
    path: PathBuf,
    row: u64,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    stop_past_end: bool,
    done: bool,
}

impl Iterator for Streaming {
    type Item = Result<Observation, HistoryError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let rec = match self.records.next()? {
                Ok(rec) => rec,
                Err(source) => {
                    self.done = true;
                    return Some(Err(HistoryError::Csv {
                        path: self.path.clone(),
                        source,
                    }));
                }
            };
            self.row += 1;

            let obs = match decode_observation(&rec) {
                Ok(obs) => obs,
                Err(reason) => {
                    self.done = true;
                    return Some(Err(HistoryError::Corrupt {
                        path: self.path.clone(),
                        row: self.row,
                        reason,
                    }));
                }
            };

            if obs.timestamp > self.to {
                if self.stop_past_end {
                    self.done = true;
                }
                continue;
            }
            if obs.timestamp >= self.from {
                return Some(Ok(obs));
            }
        }
        None
    }
}

impl Iterator for RangeIter {
    type Item = Result<Observation, HistoryError>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.0 {
            Inner::Streaming(s) => s.next(),
            Inner::Buffered(b) => b.next().map(Ok),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_714_564_800 + secs, 0).unwrap()
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path().join("h.csv"), OrderingPolicy::Reject).unwrap();
        for (s, v) in [(0, dec!(1)), (60, dec!(2)), (120, dec!(3)), (180, dec!(4))] {
            store.append(&Observation::new(at(s), v)).unwrap();
        }

        let got: Vec<_> = store
            .read_range(at(60), at(120))
            .to_vec()
            .unwrap()
            .into_iter()
            .map(|o| o.value)
            .collect();

        assert_eq!(got, vec![dec!(2), dec!(3)]);
    }

    #[test]
    fn range_is_pinned_to_committed_length_and_restartable() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path().join("h.csv"), OrderingPolicy::Reject).unwrap();
        store.append(&Observation::new(at(0), dec!(1))).unwrap();

        let range = store.read_all();
        store.append(&Observation::new(at(1), dec!(2))).unwrap();

        assert_eq!(range.to_vec().unwrap().len(), 1);
        assert_eq!(range.to_vec().unwrap().len(), 1);
        assert_eq!(store.read_all().to_vec().unwrap().len(), 2);
    }

    #[test]
    fn empty_range_when_from_after_to() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path().join("h.csv"), OrderingPolicy::Reject).unwrap();
        store.append(&Observation::new(at(0), dec!(1))).unwrap();

        assert!(store.read_range(at(10), at(5)).to_vec().unwrap().is_empty());
    }
}
