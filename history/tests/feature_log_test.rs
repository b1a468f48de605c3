use chrono::{TimeZone, Utc};
use corelib::{FeatureRecord, Stat, WindowSpec, WindowStats};
use history::{FeatureLog, HistoryError, OrderingPolicy};
use rust_decimal_macros::dec;

fn windows(labels: &[&str]) -> Vec<WindowSpec> {
    labels.iter().map(|l| l.parse().unwrap()).collect()
}

fn record() -> FeatureRecord {
    FeatureRecord {
        timestamp: Utc.timestamp_opt(1_714_564_800, 0).unwrap(),
        value: dec!(106),
        windows: vec![
            WindowStats {
                window: "1h".into(),
                mean: Stat::Value(dec!(100)),
                std: Stat::Value(dec!(8.16)),
            },
            WindowStats {
                window: "24h".into(),
                mean: Stat::Value(dec!(106)),
                std: Stat::InsufficientData,
            },
        ],
    }
}

#[test]
fn rows_round_trip_through_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("processed/features.csv");
    let spec = windows(&["1h", "24h"]);

    {
        let log = FeatureLog::open(&path, &spec, OrderingPolicy::Reject).unwrap();
        log.append(&record()).unwrap();
    }

    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "timestamp,value,mean_1h,std_1h,mean_24h,std_24h\n\
         2024-05-01T12:00:00Z,106,100,8.16,106,\n"
    );

    let log = FeatureLog::open(&path, &spec, OrderingPolicy::Reject).unwrap();
    assert_eq!(log.records().unwrap(), vec![record()]);
}

#[test]
fn reopening_with_other_windows_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("features.csv");
    FeatureLog::open(&path, &windows(&["1h", "24h"]), OrderingPolicy::Reject).unwrap();

    let err = FeatureLog::open(&path, &windows(&["1h"]), OrderingPolicy::Reject)
        .err()
        .unwrap();

    assert!(matches!(err, HistoryError::HeaderMismatch { .. }), "{err}");
}

#[test]
fn missing_window_is_written_as_insufficient() {
    let dir = tempfile::tempdir().unwrap();
    let log = FeatureLog::open(
        dir.path().join("f.csv"),
        &windows(&["1h", "7d"]),
        OrderingPolicy::Reject,
    )
    .unwrap();

    log.append(&record()).unwrap();

    let row = &log.records().unwrap()[0];
    assert_eq!(row.window("7d").unwrap().mean, Stat::InsufficientData);
    assert_eq!(row.window("1h").unwrap().mean, Stat::Value(dec!(100)));
}
