//! Time-of-day aggregation
//!
//! Buckets the whole glucose history into six fixed 4-hour local clock bands
//! (date-independent) and computes range statistics per band, plus the same
//! statistics over the whole history.

use crate::types::{GlucoseSample, GlucoseSummary, TimeOfDayBucket};
use chrono::{FixedOffset, Timelike};

/// Below this is "low" (mg/dL)
pub const RANGE_LOW: i32 = 70;

/// Above this is "high" (mg/dL)
pub const RANGE_HIGH: i32 = 180;

/// Width of each clock band (hours)
pub const BAND_HOURS: u32 = 4;

/// Number of clock bands in a day
pub const BAND_COUNT: usize = 6;

/// Sample counts per range class
#[derive(Debug, Clone, Copy, Default)]
struct RangeCounts {
    low: usize,
    in_range: usize,
    high: usize,
    sum: i64,
}

impl RangeCounts {
    fn add(&mut self, value: i32) {
        if value < RANGE_LOW {
            self.low += 1;
        } else if value > RANGE_HIGH {
            self.high += 1;
        } else {
            self.in_range += 1;
        }
        self.sum += value as i64;
    }

    fn total(&self) -> usize {
        self.low + self.in_range + self.high
    }

    fn mean(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            n => Some(self.sum as f64 / n as f64),
        }
    }

    fn percentages(&self) -> [u32; 3] {
        percentages([self.low, self.in_range, self.high])
    }
}

/// Aggregate samples into the six clock bands.
///
/// Always returns all six bands in clock order; empty bands carry zero stats.
pub fn aggregate_time_of_day(
    samples: &[GlucoseSample],
    offset: FixedOffset,
) -> Vec<TimeOfDayBucket> {
    let mut counts = [RangeCounts::default(); BAND_COUNT];

    for sample in samples {
        let hour = sample.timestamp.with_timezone(&offset).hour();
        counts[(hour / BAND_HOURS) as usize].add(sample.value);
    }

    counts
        .iter()
        .enumerate()
        .map(|(idx, c)| {
            let start_hour = idx as u32 * BAND_HOURS;
            let end_hour = start_hour + BAND_HOURS;
            let [pct_low, pct_in_range, pct_high] = c.percentages();
            TimeOfDayBucket {
                label: band_label(start_hour, end_hour),
                start_hour,
                end_hour,
                mean: c.mean().unwrap_or(0.0),
                pct_low,
                pct_in_range,
                pct_high,
                sample_count: c.total(),
            }
        })
        .collect()
}

/// Label for a band, e.g. `"04-08"`
pub fn band_label(start_hour: u32, end_hour: u32) -> String {
    format!("{:02}-{:02}", start_hour, end_hour)
}

/// Range statistics over the whole history
pub fn summarize(samples: &[GlucoseSample]) -> GlucoseSummary {
    let mut counts = RangeCounts::default();
    for sample in samples {
        counts.add(sample.value);
    }

    let Some(mean) = counts.mean() else {
        return GlucoseSummary::default();
    };

    let n = samples.len() as f64;
    let variance = samples
        .iter()
        .map(|s| (s.value as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    let std_dev = variance.sqrt();
    let [pct_low, pct_in_range, pct_high] = counts.percentages();

    GlucoseSummary {
        sample_count: samples.len(),
        mean: Some(mean),
        std_dev: Some(std_dev),
        cv_pct: (mean > 0.0).then(|| std_dev / mean * 100.0),
        pct_low,
        pct_in_range,
        pct_high,
        gmi_pct: Some(glucose_management_indicator(mean)),
    }
}

/// Estimated A1c (percent) from mean glucose in mg/dL
pub fn glucose_management_indicator(mean_mg_dl: f64) -> f64 {
    3.31 + 0.02392 * mean_mg_dl
}

/// Integer percentages that always sum to 100 for a non-empty total.
///
/// Each share is truncated, then the leftover points go to the largest
/// remainders (earlier class first on equal remainders).
fn percentages(counts: [usize; 3]) -> [u32; 3] {
    let total: usize = counts.iter().sum();
    if total == 0 {
        return [0, 0, 0];
    }

    let mut pct = [0u32; 3];
    let mut remainders = [(0usize, 0usize); 3];
    for (i, &count) in counts.iter().enumerate() {
        let scaled = count * 100;
        pct[i] = (scaled / total) as u32;
        remainders[i] = (scaled % total, i);
    }

    let leftover = 100 - pct.iter().sum::<u32>();
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for &(_, i) in remainders.iter().take(leftover as usize) {
        pct[i] += 1;
    }
    pct
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn midnight() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn at_hour(day: i64, hour: i64, value: i32) -> GlucoseSample {
        GlucoseSample::new(midnight() + Duration::days(day) + Duration::hours(hour), value)
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn test_six_bands_in_clock_order() {
        let buckets = aggregate_time_of_day(&[], utc());
        let labels: Vec<&str> = buckets.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["00-04", "04-08", "08-12", "12-16", "16-20", "20-24"]);
        assert!(buckets.iter().all(|b| b.is_empty() && b.mean == 0.0));
    }

    #[test]
    fn test_bands_group_by_hour_across_days() {
        let samples = vec![at_hour(0, 5, 100), at_hour(1, 6, 200), at_hour(2, 13, 60)];
        let buckets = aggregate_time_of_day(&samples, utc());

        let dawn = &buckets[1];
        assert_eq!(dawn.sample_count, 2);
        assert!((dawn.mean - 150.0).abs() < 1e-9);
        assert_eq!(dawn.pct_in_range, 50);
        assert_eq!(dawn.pct_high, 50);

        let afternoon = &buckets[3];
        assert_eq!(afternoon.sample_count, 1);
        assert_eq!(afternoon.pct_low, 100);
    }

    #[test]
    fn test_local_offset_shifts_band() {
        // 02:00 UTC is 21:00 the previous evening at UTC-5
        let samples = vec![at_hour(0, 2, 120)];
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        let buckets = aggregate_time_of_day(&samples, offset);
        assert_eq!(buckets[5].sample_count, 1);
        assert_eq!(buckets[0].sample_count, 0);
    }

    #[test]
    fn test_range_boundaries_are_in_range() {
        let samples = vec![at_hour(0, 9, RANGE_LOW), at_hour(0, 10, RANGE_HIGH)];
        let buckets = aggregate_time_of_day(&samples, utc());
        assert_eq!(buckets[2].pct_in_range, 100);
    }

    #[test]
    fn test_percentages_sum_to_100() {
        for low in 0..7 {
            for high in 0..7 {
                for in_range in 0..7 {
                    if low + high + in_range == 0 {
                        continue;
                    }
                    let pct = percentages([low, in_range, high]);
                    assert_eq!(pct.iter().sum::<u32>(), 100, "{low} {in_range} {high}");
                }
            }
        }
    }

    #[test]
    fn test_bucket_percentages_sum_to_100() {
        let values = [55, 65, 100, 120, 150, 190];
        let samples: Vec<_> = values
            .iter()
            .enumerate()
            .map(|(i, v)| at_hour(i as i64, 1, *v))
            .collect();
        let bucket = &aggregate_time_of_day(&samples, utc())[0];
        assert_eq!(bucket.pct_low + bucket.pct_in_range + bucket.pct_high, 100);
        // 2/6, 3/6, 1/6 -> 33.3, 50, 16.7
        assert_eq!(bucket.pct_in_range, 50);
    }

    #[test]
    fn test_summary() {
        let samples = vec![at_hour(0, 1, 100), at_hour(0, 2, 200)];
        let summary = summarize(&samples);
        assert_eq!(summary.sample_count, 2);
        assert_eq!(summary.mean, Some(150.0));
        assert_eq!(summary.std_dev, Some(50.0));
        assert!((summary.cv_pct.unwrap() - 33.333).abs() < 0.01);
        assert!((summary.gmi_pct.unwrap() - (3.31 + 0.02392 * 150.0)).abs() < 1e-9);
        assert_eq!(summary.pct_high, 50);
    }

    #[test]
    fn test_summary_empty_is_unavailable() {
        let summary = summarize(&[]);
        assert_eq!(summary.mean, None);
        assert_eq!(summary.gmi_pct, None);
        assert_eq!(summary.sample_count, 0);
    }
}
