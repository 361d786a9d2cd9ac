//! Log ingestion
//!
//! Converts raw glucose, food and insulin records into validated, ordered
//! logs. A malformed record is dropped with a warning and counted in the
//! `IngestReport`; it never aborts ingestion. An absent log (missing key or
//! `null` in a snapshot document) is a caller error and is rejected.

use crate::error::{ComputeError, RecordError};
use crate::types::{
    FoodEvent, GlucoseSample, InsulinEvent, InsulinType, LogSnapshot, MealCategory, TrendArrow,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

/// Which input log a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Glucose,
    Food,
    Insulin,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Glucose => "glucose",
            LogKind::Food => "food",
            LogKind::Insulin => "insulin",
        }
    }
}

/// Earliest accepted record time (1970-01-01T00:00:00Z)
pub const MIN_TIMESTAMP_MS: i64 = 0;

/// Latest accepted record time (2200-01-01T00:00:00Z)
pub const MAX_TIMESTAMP_MS: i64 = 7_258_118_400_000;

/// Timestamp as epoch milliseconds or an RFC 3339 string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Millis(i64),
    Text(String),
}

impl RawTimestamp {
    pub fn parse(&self) -> Result<DateTime<Utc>, RecordError> {
        match self {
            RawTimestamp::Millis(ms) => from_millis(*ms),
            RawTimestamp::Text(text) => {
                let trimmed = text.trim();
                if let Ok(ms) = trimmed.parse::<i64>() {
                    return from_millis(ms);
                }
                DateTime::parse_from_rfc3339(trimmed)
                    .map_err(|_| RecordError::InvalidTimestamp(text.clone()))
                    .and_then(|dt| from_millis(dt.timestamp_millis()))
            }
        }
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, RecordError> {
    if !(MIN_TIMESTAMP_MS..=MAX_TIMESTAMP_MS).contains(&ms) {
        return Err(RecordError::InvalidTimestamp(format!(
            "{ms} is outside the supported range"
        )));
    }
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| RecordError::InvalidTimestamp(ms.to_string()))
}

/// Raw glucose record as stored by the log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawGlucoseRecord {
    #[serde(alias = "time", alias = "date")]
    pub timestamp: RawTimestamp,
    #[serde(alias = "sgv", alias = "mg_dl")]
    pub value: f64,
    #[serde(default, alias = "direction")]
    pub trend: Option<TrendArrow>,
}

impl RawGlucoseRecord {
    pub fn validate(&self) -> Result<GlucoseSample, RecordError> {
        let timestamp = self.timestamp.parse()?;
        if !self.value.is_finite() || self.value.round() < 1.0 || self.value > i32::MAX as f64 {
            return Err(RecordError::InvalidGlucose(self.value));
        }
        Ok(GlucoseSample {
            timestamp,
            value: self.value.round() as i32,
            trend: self.trend,
        })
    }
}

/// Raw food record as stored by the event log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFoodRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(alias = "carbs")]
    pub carbs_g: f64,
    #[serde(default)]
    pub calories: Option<f64>,
    #[serde(default = "default_category", alias = "meal_type")]
    pub category: MealCategory,
    #[serde(alias = "time")]
    pub timestamp: RawTimestamp,
    #[serde(default)]
    pub note: Option<String>,
}

fn default_category() -> MealCategory {
    MealCategory::Other
}

impl RawFoodRecord {
    pub fn validate(&self) -> Result<FoodEvent, RecordError> {
        let timestamp = self.timestamp.parse()?;
        if !self.carbs_g.is_finite() || self.carbs_g < 0.0 {
            return Err(RecordError::InvalidCarbs(self.carbs_g));
        }
        if let Some(calories) = self.calories {
            if !calories.is_finite() || calories < 0.0 {
                return Err(RecordError::InvalidCalories(calories));
            }
        }
        Ok(FoodEvent {
            id: self.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string()),
            name: self.name.clone(),
            carbs_g: self.carbs_g,
            calories: self.calories,
            category: self.category,
            timestamp,
            note: self.note.clone(),
        })
    }
}

/// Raw insulin record as stored by the event log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawInsulinRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub units: f64,
    #[serde(alias = "type")]
    pub insulin_type: InsulinType,
    #[serde(alias = "time")]
    pub timestamp: RawTimestamp,
    #[serde(default)]
    pub note: Option<String>,
}

impl RawInsulinRecord {
    pub fn validate(&self) -> Result<InsulinEvent, RecordError> {
        let timestamp = self.timestamp.parse()?;
        if !self.units.is_finite() || self.units < 0.0 {
            return Err(RecordError::InvalidUnits(self.units));
        }
        Ok(InsulinEvent {
            id: self.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string()),
            units: self.units,
            insulin_type: self.insulin_type,
            timestamp,
            note: self.note.clone(),
        })
    }
}

/// A record that was dropped during ingestion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscardedRecord {
    pub log: LogKind,
    pub index: usize,
    pub reason: String,
}

/// Outcome of ingesting one or more logs
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub accepted: usize,
    pub duplicates: usize,
    pub expired: usize,
    pub discarded: Vec<DiscardedRecord>,
}

impl IngestReport {
    fn discard(&mut self, log: LogKind, index: usize, error: &RecordError) {
        warn!(log = log.as_str(), index, reason = %error, "discarding malformed record");
        self.discarded.push(DiscardedRecord {
            log,
            index,
            reason: error.to_string(),
        });
    }

    pub fn discarded_count(&self) -> usize {
        self.discarded.len()
    }
}

/// Snapshot document: `{"glucose": [...], "food": [...], "insulin": [...]}`
#[derive(Debug, Deserialize)]
struct RawSnapshot {
    #[serde(default)]
    glucose: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    food: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    insulin: Option<Vec<serde_json::Value>>,
}

/// Adapter for turning raw log records into a `LogSnapshot`
pub struct LogAdapter;

impl LogAdapter {
    /// Parse a full snapshot document.
    ///
    /// All three logs must be present (they may be empty).
    pub fn parse_snapshot(
        json: &str,
        retention_days: u32,
    ) -> Result<(LogSnapshot, IngestReport), ComputeError> {
        let raw: RawSnapshot = serde_json::from_str(json)?;
        let glucose = raw
            .glucose
            .ok_or_else(|| ComputeError::MissingInput("glucose log".to_string()))?;
        let food = raw
            .food
            .ok_or_else(|| ComputeError::MissingInput("food log".to_string()))?;
        let insulin = raw
            .insulin
            .ok_or_else(|| ComputeError::MissingInput("insulin log".to_string()))?;

        let mut report = IngestReport::default();
        let glucose = Self::ingest_glucose(glucose, retention_days, &mut report);
        let mut food: Vec<FoodEvent> = validate_all(
            food,
            LogKind::Food,
            |r: RawFoodRecord| r.validate(),
            &mut report,
        );
        let mut insulin: Vec<InsulinEvent> = validate_all(
            insulin,
            LogKind::Insulin,
            |r: RawInsulinRecord| r.validate(),
            &mut report,
        );
        food.sort_by_key(|e| e.timestamp);
        insulin.sort_by_key(|e| e.timestamp);

        report.accepted = glucose.len() + food.len() + insulin.len();
        Ok((
            LogSnapshot {
                glucose,
                food,
                insulin,
            },
            report,
        ))
    }

    /// Parse a JSON array of glucose records
    pub fn parse_glucose_array(
        json: &str,
        retention_days: u32,
    ) -> Result<(Vec<GlucoseSample>, IngestReport), ComputeError> {
        let values: Vec<serde_json::Value> = serde_json::from_str(json)?;
        let mut report = IngestReport::default();
        let samples = Self::ingest_glucose(values, retention_days, &mut report);
        report.accepted = samples.len();
        Ok((samples, report))
    }

    /// Parse NDJSON glucose records; unparseable lines are discarded
    pub fn parse_glucose_ndjson(
        ndjson: &str,
        retention_days: u32,
    ) -> (Vec<GlucoseSample>, IngestReport) {
        let mut report = IngestReport::default();
        let mut samples = Vec::new();
        for (index, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match Self::parse_glucose_line(trimmed) {
                Ok(sample) => samples.push(sample),
                Err(e) => report.discard(LogKind::Glucose, index, &e),
            }
        }
        let samples = Self::finalize_glucose(samples, retention_days, &mut report);
        report.accepted = samples.len();
        (samples, report)
    }

    /// Parse and validate one glucose record
    pub fn parse_glucose_line(line: &str) -> Result<GlucoseSample, RecordError> {
        let raw: RawGlucoseRecord =
            serde_json::from_str(line).map_err(|e| RecordError::Malformed(e.to_string()))?;
        raw.validate()
    }

    fn ingest_glucose(
        values: Vec<serde_json::Value>,
        retention_days: u32,
        report: &mut IngestReport,
    ) -> Vec<GlucoseSample> {
        let samples = validate_all(
            values,
            LogKind::Glucose,
            |r: RawGlucoseRecord| r.validate(),
            report,
        );
        Self::finalize_glucose(samples, retention_days, report)
    }

    fn finalize_glucose(
        samples: Vec<GlucoseSample>,
        retention_days: u32,
        report: &mut IngestReport,
    ) -> Vec<GlucoseSample> {
        let (samples, duplicates) = dedup_sorted(samples);
        report.duplicates += duplicates;
        let before = samples.len();
        let samples = prune_retention(samples, retention_days);
        report.expired += before - samples.len();
        samples
    }
}

fn validate_all<R, T>(
    values: Vec<serde_json::Value>,
    log: LogKind,
    validate: impl Fn(R) -> Result<T, RecordError>,
    report: &mut IngestReport,
) -> Vec<T>
where
    R: DeserializeOwned,
{
    let mut accepted = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        let result = serde_json::from_value::<R>(value)
            .map_err(|e| RecordError::Malformed(e.to_string()))
            .and_then(&validate);
        match result {
            Ok(record) => accepted.push(record),
            Err(e) => report.discard(log, index, &e),
        }
    }
    accepted
}

/// Sort ascending by timestamp and drop later duplicates of the same timestamp.
///
/// Returns the samples and the number of duplicates dropped.
pub fn dedup_sorted(mut samples: Vec<GlucoseSample>) -> (Vec<GlucoseSample>, usize) {
    samples.sort_by_key(|s| s.timestamp);
    let before = samples.len();
    samples.dedup_by(|later, earlier| {
        let duplicate = later.timestamp == earlier.timestamp;
        if duplicate {
            debug!(timestamp = %later.timestamp, "dropping duplicate glucose sample");
        }
        duplicate
    });
    let dropped = before - samples.len();
    (samples, dropped)
}

/// Index of the first sample within `retention_days` of the newest sample.
///
/// Input must be sorted ascending.
pub fn retention_start(samples: &[GlucoseSample], retention_days: u32) -> usize {
    let Some(newest) = samples.last().map(|s| s.timestamp) else {
        return 0;
    };
    let Some(cutoff) = newest.checked_sub_signed(Duration::days(i64::from(retention_days))) else {
        return 0;
    };
    samples.partition_point(|s| s.timestamp < cutoff)
}

/// Keep samples within `retention_days` of the newest sample.
///
/// Input must be sorted ascending.
pub fn prune_retention(mut samples: Vec<GlucoseSample>, retention_days: u32) -> Vec<GlucoseSample> {
    let start = retention_start(&samples, retention_days);
    samples.drain(..start);
    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_RETENTION_DAYS;
    use pretty_assertions::assert_eq;

    fn snapshot_json() -> &'static str {
        r#"{
            "glucose": [
                {"timestamp": "2024-03-01T12:05:00Z", "value": 140, "trend": "FortyFiveUp"},
                {"timestamp": 1709294400000, "value": 110},
                {"timestamp": "2024-03-01T12:05:00Z", "value": 999},
                {"timestamp": "not a time", "value": 120},
                {"timestamp": "2024-03-01T12:10:00Z", "value": -4}
            ],
            "food": [
                {"id": "f1", "name": "oats", "carbs_g": 45, "category": "breakfast", "timestamp": "2024-03-01T12:00:00Z"},
                {"name": "juice", "carbs": -10, "timestamp": "2024-03-01T13:00:00Z"}
            ],
            "insulin": [
                {"id": "i2", "units": 2, "type": "rapid", "timestamp": "2024-03-01T14:00:00Z"},
                {"id": "i1", "units": 4, "insulin_type": "rapid", "timestamp": "2024-03-01T11:55:00Z"},
                {"id": "bad", "units": -1, "type": "rapid", "timestamp": "2024-03-01T12:00:00Z"}
            ]
        }"#
    }

    #[test]
    fn test_parse_snapshot_discards_malformed_records() {
        let (snapshot, report) =
            LogAdapter::parse_snapshot(snapshot_json(), DEFAULT_RETENTION_DAYS).unwrap();

        let values: Vec<i32> = snapshot.glucose.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![110, 140]);
        assert_eq!(snapshot.glucose[1].trend, Some(TrendArrow::FortyFiveUp));
        assert_eq!(snapshot.food.len(), 1);
        assert_eq!(snapshot.food[0].category, MealCategory::Breakfast);

        let ids: Vec<&str> = snapshot.insulin.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["i1", "i2"]);

        assert_eq!(report.duplicates, 1);
        assert_eq!(report.discarded_count(), 4);
        assert_eq!(report.accepted, 5);
        assert!(report
            .discarded
            .iter()
            .any(|d| d.log == LogKind::Insulin && d.index == 2));
    }

    #[test]
    fn test_missing_log_is_rejected() {
        let result = LogAdapter::parse_snapshot(r#"{"glucose": [], "food": []}"#, 400);
        assert!(matches!(result, Err(ComputeError::MissingInput(_))));

        let result = LogAdapter::parse_snapshot(r#"{"glucose": null, "food": [], "insulin": []}"#, 400);
        assert!(matches!(result, Err(ComputeError::MissingInput(_))));
    }

    #[test]
    fn test_empty_logs_are_fine() {
        let (snapshot, report) =
            LogAdapter::parse_snapshot(r#"{"glucose": [], "food": [], "insulin": []}"#, 400).unwrap();
        assert!(snapshot.glucose.is_empty());
        assert_eq!(report, IngestReport::default());
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(LogAdapter::parse_snapshot("not json", 400).is_err());
    }

    #[test]
    fn test_ndjson_skips_bad_lines() {
        let ndjson = "{\"timestamp\": 1709294400000, \"value\": 100}\n\
                      garbage\n\
                      \n\
                      {\"timestamp\": 1709294700000, \"sgv\": 104}\n";
        let (samples, report) = LogAdapter::parse_glucose_ndjson(ndjson, 400);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].value, 104);
        assert_eq!(report.discarded_count(), 1);
        assert_eq!(report.discarded[0].index, 1);
    }

    #[test]
    fn test_fractional_glucose_rounds() {
        let sample = LogAdapter::parse_glucose_line(r#"{"timestamp": 0, "value": 99.6}"#).unwrap();
        assert_eq!(sample.value, 100);
    }

    #[test]
    fn test_retention_prunes_old_samples() {
        let newest = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let samples = vec![
            GlucoseSample::new(newest - Duration::days(401), 100),
            GlucoseSample::new(newest - Duration::days(400), 110),
            GlucoseSample::new(newest, 120),
        ];
        let kept = prune_retention(samples, 400);
        let values: Vec<i32> = kept.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![110, 120]);
    }

    #[test]
    fn test_out_of_range_timestamps_are_discarded() {
        let json = format!(
            r#"{{
                "glucose": [
                    {{"timestamp": {}, "value": 120}},
                    {{"timestamp": -1, "value": 120}},
                    {{"timestamp": "2024-03-01T12:00:00Z", "value": 130}}
                ],
                "food": [{{"name": "cake", "carbs_g": 40, "timestamp": "+262000-01-01T00:00:00Z"}}],
                "insulin": [{{"units": 2, "type": "rapid", "timestamp": "{}"}}]
            }}"#,
            DateTime::<Utc>::MAX_UTC.timestamp_millis(),
            MAX_TIMESTAMP_MS + 1,
        );
        let (snapshot, report) = LogAdapter::parse_snapshot(&json, DEFAULT_RETENTION_DAYS).unwrap();

        assert_eq!(snapshot.glucose.len(), 1);
        assert_eq!(snapshot.glucose[0].value, 130);
        assert!(snapshot.food.is_empty());
        assert!(snapshot.insulin.is_empty());
        assert_eq!(report.discarded_count(), 4);

        let edge = RawTimestamp::Millis(MAX_TIMESTAMP_MS).parse().unwrap();
        assert_eq!(edge, Utc.with_ymd_and_hms(2200, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_retention_longer_than_history_keeps_everything() {
        let newest = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let samples = vec![
            GlucoseSample::new(newest - Duration::days(30), 100),
            GlucoseSample::new(newest, 120),
        ];
        assert_eq!(retention_start(&samples, u32::MAX), 0);
        assert_eq!(prune_retention(samples, u32::MAX).len(), 2);
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let samples = vec![
            GlucoseSample::new(t + Duration::minutes(5), 130),
            GlucoseSample::new(t, 100),
            GlucoseSample::new(t, 105),
        ];
        let (deduped, dropped) = dedup_sorted(samples);
        assert_eq!(dropped, 1);
        assert_eq!(deduped[0].value, 100);
        assert_eq!(deduped[1].value, 130);
    }
}
