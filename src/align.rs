//! Temporal alignment
//!
//! Matches a target instant to the nearest glucose sample. Samples must be
//! sorted ascending by timestamp; lookups binary-search into the slice.

use crate::types::GlucoseSample;
use chrono::{DateTime, Duration, Utc};

/// Return the sample closest to `target` among those within `± tolerance`.
///
/// When two samples are exactly equidistant the earlier one wins.
pub fn nearest_sample(
    samples: &[GlucoseSample],
    target: DateTime<Utc>,
    tolerance: Duration,
) -> Option<&GlucoseSample> {
    let target_ms = target.timestamp_millis();
    let tol_ms = tolerance.num_milliseconds().abs();

    let window = samples_between(
        samples,
        target_ms.saturating_sub(tol_ms),
        target_ms.saturating_add(tol_ms),
    );

    let mut best: Option<&GlucoseSample> = None;
    for sample in window {
        let distance = (sample.millis() - target_ms).abs();
        match best {
            // strict comparison keeps the earlier sample on ties
            Some(current) if distance >= (current.millis() - target_ms).abs() => {}
            _ => best = Some(sample),
        }
    }
    best
}

/// Samples with `start <= timestamp <= end`, as a subslice
pub fn samples_in_window(
    samples: &[GlucoseSample],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> &[GlucoseSample] {
    samples_between(samples, start.timestamp_millis(), end.timestamp_millis())
}

fn samples_between(samples: &[GlucoseSample], start_ms: i64, end_ms: i64) -> &[GlucoseSample] {
    if start_ms > end_ms {
        return &[];
    }
    let lo = samples.partition_point(|s| s.millis() < start_ms);
    let hi = samples.partition_point(|s| s.millis() <= end_ms);
    if lo >= hi {
        &[]
    } else {
        &samples[lo..hi]
    }
}
