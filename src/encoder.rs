//! Insight report encoding
//!
//! Wraps an `InsightResult` with producer, window and quality metadata and
//! serializes it to JSON.

use crate::error::ComputeError;
use crate::types::{
    GlucoseSample, InsightReport, InsightResult, ReportProducer, ReportQuality, ReportWindow,
};
use crate::{ENGINE_VERSION, PRODUCER_NAME};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Current insight report schema version
pub const REPORT_VERSION: &str = "1.0.0";

/// Nominal CGM sampling interval used for coverage
pub const SAMPLE_INTERVAL_MINUTES: i64 = 5;

/// Insight report encoder
pub struct InsightEncoder {
    instance_id: String,
}

impl Default for InsightEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl InsightEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Encode an analysis result computed over `samples`
    pub fn encode(
        &self,
        result: &InsightResult,
        samples: &[GlucoseSample],
        utc_offset_minutes: i32,
    ) -> InsightReport {
        self.encode_at(result, samples, utc_offset_minutes, Utc::now())
    }

    /// Encode with an explicit computation time
    pub fn encode_at(
        &self,
        result: &InsightResult,
        samples: &[GlucoseSample],
        utc_offset_minutes: i32,
        computed_at: DateTime<Utc>,
    ) -> InsightReport {
        let producer = ReportProducer {
            name: PRODUCER_NAME.to_string(),
            version: ENGINE_VERSION.to_string(),
            instance_id: self.instance_id.clone(),
        };

        let window = ReportWindow {
            first_sample_utc: samples.first().map(|s| s.timestamp.to_rfc3339()),
            last_sample_utc: samples.last().map(|s| s.timestamp.to_rfc3339()),
            utc_offset_minutes,
        };

        InsightReport {
            report_version: REPORT_VERSION.to_string(),
            producer,
            computed_at_utc: computed_at.to_rfc3339(),
            window,
            quality: build_quality(result, samples),
            result: result.clone(),
        }
    }

    /// Encode to a pretty-printed JSON string
    pub fn encode_to_json(
        &self,
        result: &InsightResult,
        samples: &[GlucoseSample],
        utc_offset_minutes: i32,
    ) -> Result<String, ComputeError> {
        let report = self.encode(result, samples, utc_offset_minutes);
        serde_json::to_string_pretty(&report).map_err(ComputeError::JsonError)
    }
}

fn build_quality(result: &InsightResult, samples: &[GlucoseSample]) -> ReportQuality {
    let mut flags = Vec::new();
    if samples.is_empty() {
        flags.push("no_glucose".to_string());
    }
    if result.meal_curves.is_empty() {
        flags.push("no_meal_curves".to_string());
    }
    if result.isf.is_none() {
        flags.push("isf_unavailable".to_string());
    }
    if result.icr.is_none() {
        flags.push("icr_unavailable".to_string());
    }

    ReportQuality {
        sample_count: samples.len(),
        coverage: coverage(samples),
        flags,
    }
}

/// Fraction of expected sampling slots between the first and last sample.
///
/// Samples must be sorted ascending; out-of-order input reports zero.
pub fn coverage(samples: &[GlucoseSample]) -> f64 {
    let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
        return 0.0;
    };
    let span_minutes = (last.timestamp - first.timestamp).num_minutes();
    if span_minutes < 0 {
        return 0.0;
    }
    let expected = span_minutes / SAMPLE_INTERVAL_MINUTES + 1;
    (samples.len() as f64 / expected as f64).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GlucoseSummary;
    use chrono::{Duration, TimeZone};

    fn empty_result() -> InsightResult {
        InsightResult {
            meal_curves: Vec::new(),
            insulin_curves: Vec::new(),
            time_of_day: Vec::new(),
            summary: GlucoseSummary::default(),
            meal_categories: Vec::new(),
            isf: Some(42.0),
            icr: None,
            advisories: Vec::new(),
            sample_count: 0,
            food_event_count: 0,
            insulin_event_count: 0,
        }
    }

    fn samples(n: i64, step_minutes: i64) -> Vec<GlucoseSample> {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| GlucoseSample::new(t0 + Duration::minutes(i * step_minutes), 120))
            .collect()
    }

    #[test]
    fn test_encode_report() {
        let encoder = InsightEncoder::with_instance_id("test-instance".to_string());
        let samples = samples(13, 5);
        let computed_at = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
        let report = encoder.encode_at(&empty_result(), &samples, 60, computed_at);

        assert_eq!(report.report_version, REPORT_VERSION);
        assert_eq!(report.producer.name, PRODUCER_NAME);
        assert_eq!(report.producer.version, ENGINE_VERSION);
        assert_eq!(report.producer.instance_id, "test-instance");
        assert_eq!(report.computed_at_utc, "2024-03-02T00:00:00+00:00");

        assert_eq!(
            report.window.first_sample_utc.as_deref(),
            Some("2024-03-01T00:00:00+00:00")
        );
        assert_eq!(
            report.window.last_sample_utc.as_deref(),
            Some("2024-03-01T01:00:00+00:00")
        );
        assert_eq!(report.window.utc_offset_minutes, 60);

        assert_eq!(report.quality.sample_count, 13);
        assert_eq!(report.quality.coverage, 1.0);
        assert_eq!(
            report.quality.flags,
            vec!["no_meal_curves".to_string(), "icr_unavailable".to_string()]
        );
        assert_eq!(report.result.isf, Some(42.0));
    }

    #[test]
    fn test_coverage_with_gaps() {
        // 7 samples over an hour at 10-minute spacing -> 7 of 13 slots
        let samples = samples(7, 10);
        let c = coverage(&samples);
        assert!((c - 7.0 / 13.0).abs() < 1e-9);
        assert_eq!(coverage(&[]), 0.0);
    }

    #[test]
    fn test_coverage_of_reversed_samples_is_zero() {
        let mut reversed = samples(6, 10);
        reversed.reverse();
        assert_eq!(coverage(&reversed), 0.0);
    }

    #[test]
    fn test_encode_to_json() {
        let encoder = InsightEncoder::new();
        let json = encoder.encode_to_json(&empty_result(), &[], 0).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed.get("report_version").is_some());
        assert!(parsed.get("producer").is_some());
        assert!(parsed.get("window").is_some());
        assert!(parsed.get("quality").is_some());
        assert!(parsed["window"]["first_sample_utc"].is_null());
        assert_eq!(parsed["quality"]["flags"][0], "no_glucose");
    }
}
