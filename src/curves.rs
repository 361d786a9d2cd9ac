//! Event-response curve extraction
//!
//! Turns a glucose log plus an event log into one response curve per event:
//! - Post-meal: baseline shortly before the meal, peak within 3 hours
//! - Post-insulin: baseline at the dose, nadir within 4 hours, drops at fixed offsets
//!
//! Events without a usable baseline or without any sample in the response
//! window are skipped silently.

use crate::align::{nearest_sample, samples_in_window};
use crate::types::{
    FoodEvent, GlucoseSample, InsulinCurve, InsulinEvent, InsulinType, MealCurve, ResponseCurve,
};
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

/// Meal baseline is anchored this many minutes before the logged meal time
pub const MEAL_BASELINE_LEAD_MINUTES: i64 = 10;

/// Tolerance for locating a baseline sample (± minutes)
pub const BASELINE_TOLERANCE_MINUTES: i64 = 20;

/// Tolerance for locating the sample at each fixed offset (± minutes)
pub const OFFSET_TOLERANCE_MINUTES: i64 = 15;

/// Peak search window after a meal (minutes)
pub const MEAL_WINDOW_MINUTES: i64 = 180;

/// Nadir search window after a dose (minutes)
pub const INSULIN_WINDOW_MINUTES: i64 = 240;

/// Doses taken below this baseline (mg/dL) are excluded from insulin curves
pub const INSULIN_MIN_BASELINE: i32 = 100;

/// Fixed response offsets (minutes)
pub const RESPONSE_OFFSETS_MINUTES: [i64; 3] = [60, 120, 180];

/// Extract post-meal response curves.
///
/// `samples` must be sorted ascending by timestamp.
pub fn extract_meal_curves(samples: &[GlucoseSample], food: &[FoodEvent]) -> Vec<MealCurve> {
    food.iter()
        .filter_map(|event| meal_curve(samples, event))
        .collect()
}

fn meal_curve(samples: &[GlucoseSample], event: &FoodEvent) -> Option<MealCurve> {
    let t0 = event.timestamp;
    let (Some(anchor), Some(window_end)) = (
        offset(t0, -MEAL_BASELINE_LEAD_MINUTES),
        offset(t0, MEAL_WINDOW_MINUTES),
    ) else {
        debug!(event_id = %event.id, "meal skipped: timestamp out of range");
        return None;
    };

    let Some(baseline) =
        nearest_sample(samples, anchor, Duration::minutes(BASELINE_TOLERANCE_MINUTES))
    else {
        debug!(event_id = %event.id, "meal skipped: no baseline sample");
        return None;
    };

    let window = samples_in_window(samples, t0, window_end);
    let Some(peak) = extremum(window, |candidate, best| candidate > best) else {
        debug!(event_id = %event.id, "meal skipped: no samples in response window");
        return None;
    };

    let [delta_60, delta_120, delta_180] =
        RESPONSE_OFFSETS_MINUTES.map(|m| value_at(samples, t0, m).map(|v| v - baseline.value));

    Some(ResponseCurve {
        event: event.clone(),
        baseline: baseline.value,
        extremum: peak.value,
        extremum_offset_minutes: minutes_between(t0, peak.timestamp),
        delta_60,
        delta_120,
        delta_180,
    })
}

/// Extract post-insulin response curves.
///
/// Long-acting doses never participate. `samples` must be sorted ascending.
pub fn extract_insulin_curves(
    samples: &[GlucoseSample],
    insulin: &[InsulinEvent],
) -> Vec<InsulinCurve> {
    insulin
        .iter()
        .filter(|event| event.insulin_type != InsulinType::LongActing)
        .filter_map(|event| insulin_curve(samples, event))
        .collect()
}

fn insulin_curve(samples: &[GlucoseSample], event: &InsulinEvent) -> Option<InsulinCurve> {
    let t0 = event.timestamp;
    let Some(window_end) = offset(t0, INSULIN_WINDOW_MINUTES) else {
        debug!(event_id = %event.id, "dose skipped: timestamp out of range");
        return None;
    };

    let Some(baseline) = nearest_sample(samples, t0, Duration::minutes(BASELINE_TOLERANCE_MINUTES))
    else {
        debug!(event_id = %event.id, "dose skipped: no baseline sample");
        return None;
    };
    if baseline.value < INSULIN_MIN_BASELINE {
        debug!(
            event_id = %event.id,
            baseline = baseline.value,
            "dose skipped: baseline below {INSULIN_MIN_BASELINE} mg/dL"
        );
        return None;
    }

    let window = samples_in_window(samples, t0, window_end);
    let nadir = extremum(window, |candidate, best| candidate < best)?;

    let [delta_60, delta_120, delta_180] =
        RESPONSE_OFFSETS_MINUTES.map(|m| value_at(samples, t0, m).map(|v| baseline.value - v));

    Some(ResponseCurve {
        event: event.clone(),
        baseline: baseline.value,
        extremum: nadir.value,
        extremum_offset_minutes: minutes_between(t0, nadir.timestamp),
        delta_60,
        delta_120,
        delta_180,
    })
}

/// First sample whose value wins `better` against every earlier sample
fn extremum(
    window: &[GlucoseSample],
    better: impl Fn(i32, i32) -> bool,
) -> Option<&GlucoseSample> {
    let mut iter = window.iter();
    let first = iter.next()?;
    Some(iter.fold(first, |best, s| if better(s.value, best.value) { s } else { best }))
}

fn value_at(samples: &[GlucoseSample], t0: DateTime<Utc>, offset_minutes: i64) -> Option<i32> {
    nearest_sample(
        samples,
        offset(t0, offset_minutes)?,
        Duration::minutes(OFFSET_TOLERANCE_MINUTES),
    )
    .map(|s| s.value)
}

fn offset(t0: DateTime<Utc>, minutes: i64) -> Option<DateTime<Utc>> {
    t0.checked_add_signed(Duration::minutes(minutes))
}

fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_minutes()
}
