use std::path::Path;

use chrono::{DateTime, Utc};
use corelib::{FeatureRecord, Stat, WindowSpec, WindowStats};
use csv::StringRecord;
use tracing::{debug, instrument};

use crate::codec::{format_stat, format_ts, parse_decimal, parse_stat, parse_ts};
use crate::errors::HistoryError;
use crate::log_file::{AppendOnlyCsv, AppendReceipt, OrderingPolicy, open_prefix};

/// The derived dataset: one row per computed `FeatureRecord`.
///
/// Column layout is fixed by the window set it was opened with; reopening
/// with a different set fails instead of mixing layouts in one file.
pub struct FeatureLog {
    log: AppendOnlyCsv,
    labels: Vec<String>,
    policy: OrderingPolicy,
}

impl FeatureLog {
    pub fn open(
        path: impl AsRef<Path>,
        windows: &[WindowSpec],
        policy: OrderingPolicy,
    ) -> Result<Self, HistoryError> {
        let path = path.as_ref();
        let labels: Vec<String> = windows.iter().map(|w| w.label().to_string()).collect();
        let header = header_for(windows);
        let columns = header.len();

        let row_labels = labels.clone();
        let log = AppendOnlyCsv::open(path, &header, move |rec| {
            if rec.len() != columns {
                return Err(format!("expected {columns} columns, found {}", rec.len()));
            }
            decode_row(rec, &row_labels).map(|r| r.timestamp)
        })?;

        debug!(
            target: "store",
            path = %path.display(),
            records = log.records(),
            "feature log opened"
        );

        Ok(Self {
            log,
            labels,
            policy,
        })
    }

    /// Appends one row. Windows missing from `record` are written as
    /// insufficient data.
    #[instrument(skip(self, record), target = "store", fields(ts = %record.timestamp))]
    pub fn append(&self, record: &FeatureRecord) -> Result<AppendReceipt, HistoryError> {
        let mut fields = Vec::with_capacity(2 + self.labels.len() * 2);
        fields.push(format_ts(&record.timestamp));
        fields.push(record.value.to_string());

        for label in &self.labels {
            let (mean, std) = record
                .window(label)
                .map_or((Stat::InsufficientData, Stat::InsufficientData), |w| {
                    (w.mean, w.std)
                });
            fields.push(format_stat(&mean));
            fields.push(format_stat(&std));
        }

        self.log.append(record.timestamp, &fields, self.policy)
    }

    /// Every committed row, in file order.
    pub fn records(&self) -> Result<Vec<FeatureRecord>, HistoryError> {
        let committed = self.log.committed();
        let path = self.log.path();
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(open_prefix(path, committed.len)?);

        let mut out = Vec::new();
        for (i, rec) in rdr.records().enumerate() {
            let rec = rec.map_err(HistoryError::csv(path))?;
            let row = decode_row(&rec, &self.labels).map_err(|reason| HistoryError::Corrupt {
                path: path.to_path_buf(),
                row: i as u64 + 1,
                reason,
            })?;
            out.push(row);
        }
        Ok(out)
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
}

/// `timestamp,value,mean_<W>,std_<W>,...` in window order.
pub fn header_for(windows: &[WindowSpec]) -> Vec<String> {
    let mut header = vec!["timestamp".to_string(), "value".to_string()];
    for w in windows {
        header.push(format!("mean_{}", w.label()));
        header.push(format!("std_{}", w.label()));
    }
    header
}

fn decode_row(rec: &StringRecord, labels: &[String]) -> Result<FeatureRecord, String> {
    let field = |i: usize| rec.get(i).ok_or_else(|| format!("missing column {i}"));

    let timestamp = parse_ts(field(0)?)?;
    let value = parse_decimal(field(1)?)?;

    let mut windows = Vec::with_capacity(labels.len());
    for (i, label) in labels.iter().enumerate() {
        windows.push(WindowStats {
            window: label.clone(),
            mean: parse_stat(field(2 + i * 2)?)?,
            std: parse_stat(field(3 + i * 2)?)?,
        });
    }

    Ok(FeatureRecord {
        timestamp,
        value,
        windows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_follows_window_order() {
        let windows: Vec<WindowSpec> = vec!["24h".parse().unwrap(), "1h".parse().unwrap()];
        assert_eq!(
            header_for(&windows).join(","),
            "timestamp,value,mean_24h,std_24h,mean_1h,std_1h"
        );
    }
}
