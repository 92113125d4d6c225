/// series.rs – Hourly Z-score series recovered from system-log events.
///
/// The engine logs each reading as `Z-Score calculated: <value>` with the pair
/// as the log source. Newer engines also put the value in `details.z_score`;
/// that field wins when present and the message text is only a fallback.
use chrono::{DateTime, Duration, TimeZone, Timelike};
use std::collections::BTreeMap;

use crate::models::SystemLogEvent;

pub const SERIES_HOURS: usize = 24;

const ZSCORE_MARKER: &str = "Z-Score calculated:";

/// One hour of the chart. `values` maps source label → reading; a missing
/// key is a gap, never zero.
#[derive(Debug, Clone, PartialEq)]
pub struct HourBucket<Tz: TimeZone> {
    pub hour: DateTime<Tz>,
    pub label: String,
    pub values: BTreeMap<String, f64>,
}

/// Build the 24 buckets ending at `now`'s hour, oldest first.
///
/// Labels are `HH:00` in `now`'s time zone. Each event contributes to the
/// bucket of its own hour (rounded down); for a given source and hour the
/// last event in iteration order wins. Events outside the window and events
/// without a readable value are skipped.
pub fn zscore_series<Tz>(logs: &[SystemLogEvent], now: DateTime<Tz>) -> Vec<HourBucket<Tz>>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let current_hour = floor_to_hour(&now);
    let mut buckets: Vec<HourBucket<Tz>> = (0..SERIES_HOURS)
        .rev()
        .map(|back| {
            let hour = current_hour.clone() - Duration::hours(back as i64);
            HourBucket {
                label: hour.format("%H:00").to_string(),
                hour,
                values: BTreeMap::new(),
            }
        })
        .collect();

    let first_hour = buckets[0].hour.clone();
    for event in logs {
        let Some(value) = reading_of(event) else {
            continue;
        };
        let at = floor_to_hour(&event.timestamp.with_timezone(&now.timezone()));
        if at < first_hour || at > current_hour {
            continue;
        }
        let idx = (at - first_hour.clone()).num_hours() as usize;
        if let Some(bucket) = buckets.get_mut(idx) {
            bucket.values.insert(event.source.clone(), value);
        }
    }

    buckets
}

/// Every source label that appears anywhere in the series, sorted.
pub fn series_sources<Tz: TimeZone>(buckets: &[HourBucket<Tz>]) -> Vec<String> {
    let mut sources: Vec<String> = buckets
        .iter()
        .flat_map(|b| b.values.keys().cloned())
        .collect();
    sources.sort();
    sources.dedup();
    sources
}

/// Most recent reading for `source` in the series, if any.
pub fn latest_value<Tz: TimeZone>(buckets: &[HourBucket<Tz>], source: &str) -> Option<f64> {
    buckets
        .iter()
        .rev()
        .find_map(|b| b.values.get(source).copied())
}

/// Numeric reading carried by a log event: structured field first, then text.
pub fn reading_of(event: &SystemLogEvent) -> Option<f64> {
    event
        .details
        .as_ref()
        .and_then(|d| d.get("z_score"))
        .and_then(|v| v.as_f64())
        .filter(|v| v.is_finite())
        .or_else(|| parse_zscore_message(&event.message))
}

/// Extract `<value>` from `... Z-Score calculated: <value> ...`.
///
/// Accepts an optional sign, digits, and an optional fractional part.
/// Anything else yields `None`.
pub fn parse_zscore_message(message: &str) -> Option<f64> {
    let start = message.find(ZSCORE_MARKER)? + ZSCORE_MARKER.len();
    let rest = message[start..].trim_start();

    let bytes = rest.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'-') | Some(b'+')) {
        end += 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == int_start {
        return None;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        if frac_end > frac_start {
            end = frac_end;
        }
    }

    rest[..end].parse::<f64>().ok().filter(|v| v.is_finite())
}

fn floor_to_hour<Tz: TimeZone>(dt: &DateTime<Tz>) -> DateTime<Tz> {
    let secs_into_hour = (dt.minute() * 60 + dt.second()) as i64;
    dt.clone()
        - Duration::seconds(secs_into_hour)
        - Duration::nanoseconds(dt.nanosecond() as i64 % 1_000_000_000)
}
