/// Tests for the hourly Z-score extractor.
use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};

#[path = "../src/models.rs"]
mod models;

#[path = "../src/series.rs"]
mod series;

use models::{LogLevel, SystemLogEvent};
use series::{latest_value, series_sources, zscore_series, SERIES_HOURS};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn clock() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 10, 11, 30, 0).unwrap()
}

fn ev(source: &str, message: &str, ts: DateTime<Utc>) -> SystemLogEvent {
    SystemLogEvent {
        id: 0,
        timestamp: ts,
        level: LogLevel::Info,
        source: source.into(),
        message: message.into(),
        details: None,
    }
}

fn hm(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 10, hour, minute, 0).unwrap()
}

// ---------------------------------------------------------------------------
// Shape
// ---------------------------------------------------------------------------

#[test]
fn test_24_buckets_ending_at_current_hour() {
    let series = zscore_series(&[], clock());
    assert_eq!(series.len(), SERIES_HOURS);
    assert_eq!(series.last().unwrap().hour, hm(11, 0));
    assert_eq!(series.last().unwrap().label, "11:00");
    assert_eq!(series[0].label, "12:00");
    assert!(series.windows(2).all(|w| w[0].hour < w[1].hour));
    assert!(series
        .windows(2)
        .all(|w| w[1].hour.clone() - w[0].hour.clone() == Duration::hours(1)));
    assert!(series.iter().all(|b| b.values.is_empty()));
}

#[test]
fn test_labels_follow_clock_time_zone() {
    let tz = FixedOffset::east_opt(2 * 3600).unwrap();
    let now = clock().with_timezone(&tz);
    let logs = vec![ev("PAIR/A", "Z-Score calculated: 1.0", hm(11, 10))];
    let series = zscore_series(&logs, now);
    let last = series.last().unwrap();
    assert_eq!(last.label, "13:00");
    assert_eq!(last.values.get("PAIR/A"), Some(&1.0));
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

#[test]
fn test_pair_scenario() {
    let logs = vec![
        ev("PAIR/A", "Z-Score calculated: -0.5", hm(11, 5)),
        ev("PAIR/A", "Z-Score calculated: 1.23", hm(10, 20)),
        ev("ENGINE", "irrelevant message", hm(9, 0)),
    ];
    let series = zscore_series(&logs, clock());

    let ten = series.iter().find(|b| b.label == "10:00").unwrap();
    let eleven = series.iter().find(|b| b.label == "11:00").unwrap();
    assert_eq!(ten.values.get("PAIR/A"), Some(&1.23));
    assert_eq!(eleven.values.get("PAIR/A"), Some(&-0.5));

    let with_pair = series
        .iter()
        .filter(|b| b.values.contains_key("PAIR/A"))
        .count();
    assert_eq!(with_pair, 2);
    assert_eq!(series_sources(&series), vec!["PAIR/A".to_string()]);
}

#[test]
fn test_extraction_is_idempotent() {
    let logs = vec![
        ev("SOL/LTC", "Z-Score calculated: 2.2", hm(3, 0)),
        ev("AVAX/NEAR", "Z-Score calculated: -1.7", hm(8, 45)),
    ];
    assert_eq!(zscore_series(&logs, clock()), zscore_series(&logs, clock()));
}

#[test]
fn test_last_event_in_iteration_order_wins() {
    let logs = vec![
        ev("SOL/LTC", "Z-Score calculated: 0.9", hm(7, 50)),
        ev("SOL/LTC", "Z-Score calculated: 0.1", hm(7, 10)),
    ];
    let series = zscore_series(&logs, clock());
    let seven = series.iter().find(|b| b.label == "07:00").unwrap();
    assert_eq!(seven.values.get("SOL/LTC"), Some(&0.1));
}

#[test]
fn test_events_outside_window_are_dropped() {
    let logs = vec![
        // Same label as a bucket in the window, but a day earlier.
        ev("SOL/LTC", "Z-Score calculated: 5.0", hm(11, 0) - Duration::hours(24)),
        // In the future relative to the clock.
        ev("SOL/LTC", "Z-Score calculated: 6.0", hm(12, 10)),
    ];
    let series = zscore_series(&logs, clock());
    assert!(series.iter().all(|b| b.values.is_empty()));
}

#[test]
fn test_oldest_bucket_is_kept() {
    let logs = vec![ev("NEAR/FIL", "Z-Score calculated: 1.1", hm(11, 0) - Duration::hours(23))];
    let series = zscore_series(&logs, clock());
    assert_eq!(series[0].values.get("NEAR/FIL"), Some(&1.1));
}

#[test]
fn test_structured_field_wins_over_text() {
    let mut e = ev("NEAR/FIL", "Z-Score calculated: 9.9", hm(10, 0));
    e.details = Some(serde_json::json!({ "z_score": -1.25, "ratio": 3.1 }));
    let series = zscore_series(&[e], clock());
    assert_eq!(latest_value(&series, "NEAR/FIL"), Some(-1.25));
}

#[test]
fn test_non_numeric_details_fall_back_to_text() {
    let mut e = ev("NEAR/FIL", "Z-Score calculated: 0.75", hm(10, 0));
    e.details = Some(serde_json::json!({ "z_score": "n/a" }));
    let series = zscore_series(&[e], clock());
    assert_eq!(latest_value(&series, "NEAR/FIL"), Some(0.75));
}

#[test]
fn test_malformed_messages_contribute_nothing() {
    let logs = vec![
        ev("SOL/LTC", "Z-Score calculated: abc", hm(10, 0)),
        ev("SOL/LTC", "Z-Score calculated: ", hm(10, 5)),
        ev("SOL/LTC", "Z-Score calculated: --1", hm(10, 10)),
    ];
    let series = zscore_series(&logs, clock());
    assert!(series.iter().all(|b| b.values.is_empty()));
}

#[test]
fn test_latest_value_prefers_newest_bucket() {
    let logs = vec![
        ev("SOL/LTC", "Z-Score calculated: 0.3", hm(9, 0)),
        ev("SOL/LTC", "Z-Score calculated: 1.8", hm(6, 0)),
    ];
    let series = zscore_series(&logs, clock());
    assert_eq!(latest_value(&series, "SOL/LTC"), Some(0.3));
    assert_eq!(latest_value(&series, "AVAX/NEAR"), None);
}
