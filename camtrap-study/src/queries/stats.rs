//! Post-processing helpers for aggregation queries

use chrono::{DateTime, SecondsFormat, Utc};

/// Julian day number of the Unix epoch (1970-01-01T00:00:00Z)
const UNIX_EPOCH_JULIAN_DAY: f64 = 2_440_587.5;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Nearest-rank percentile (`p` in `(0, 100]`); 0 for an empty slice
pub fn percentile(values: &[i64], p: f64) -> i64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();

    let p = p.clamp(f64::MIN_POSITIVE, 100.0);
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Split `[start, end]` into `n` equal contiguous intervals
pub fn split_interval(start: f64, end: f64, n: usize) -> Vec<(f64, f64)> {
    if n == 0 {
        return Vec::new();
    }
    let width = (end - start) / n as f64;
    (0..n)
        .map(|i| {
            let lo = start + width * i as f64;
            // Last bucket ends exactly at `end`, free of rounding drift
            let hi = if i + 1 == n { end } else { start + width * (i + 1) as f64 };
            (lo, hi)
        })
        .collect()
}

/// Bucket for `value` within `n` buckets of `width` starting at `start`
///
/// Values past the end fall into the last bucket (the final interval is
/// closed); values before the start fall into the first.
pub fn bucket_index(value: f64, start: f64, width: f64, n: usize) -> usize {
    if n == 0 || width <= 0.0 {
        return 0;
    }
    let index = ((value - start) / width).floor();
    if index <= 0.0 {
        0
    } else {
        (index as usize).min(n - 1)
    }
}

/// Convert an SQLite `julianday()` value to a UTC timestamp
pub fn julian_day_to_datetime(julian_day: f64) -> Option<DateTime<Utc>> {
    let millis = ((julian_day - UNIX_EPOCH_JULIAN_DAY) * MILLIS_PER_DAY).round();
    if !millis.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis(millis as i64)
}

/// RFC 3339 string (`2023-01-02T00:00:00Z`) for a julian day
pub fn julian_day_to_rfc3339(julian_day: f64) -> Option<String> {
    julian_day_to_datetime(julian_day).map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
}
