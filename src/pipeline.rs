//! Pipeline orchestration
//!
//! This module provides the public API for Synheart Glucose. An analysis pass
//! runs curve extraction, time-of-day aggregation, coefficient estimation and
//! the advisory rules over one log snapshot. Alert evaluation is a separate,
//! much smaller pass over the newest samples.

use crate::adapter::{dedup_sorted, prune_retention, retention_start, IngestReport, LogAdapter};
use crate::config::{AnalysisSettings, Settings};
use crate::curves::{extract_insulin_curves, extract_meal_curves};
use crate::encoder::InsightEncoder;
use crate::error::ComputeError;
use crate::metrics::{estimate_icr, estimate_isf, summarize_meal_categories};
use crate::projection::{evaluate_alerts, AlertDispatcher, CooldownState};
use crate::prompt::build_prompt;
use crate::time_of_day::{aggregate_time_of_day, summarize};
use crate::tips::{evaluate, RuleContext};
use crate::types::{
    AlertKind, AlertRequest, GlucoseSample, InsightReport, InsightResult, LogSnapshot,
    PersonalContext,
};
use chrono::{DateTime, Utc};
use std::borrow::Cow;
use tracing::{debug, warn};

/// Run one full analysis pass over a snapshot.
///
/// Glucose samples are expected sorted and unique by timestamp; unsorted input
/// is normalized first. Samples older than the retention window (relative to
/// the newest sample) are ignored.
pub fn analyze(
    snapshot: &LogSnapshot,
    settings: &AnalysisSettings,
) -> Result<InsightResult, ComputeError> {
    analyze_retained(snapshot, settings).map(|(result, _)| result)
}

/// Analysis pass that also hands back the glucose samples it ran over
fn analyze_retained<'a>(
    snapshot: &'a LogSnapshot,
    settings: &AnalysisSettings,
) -> Result<(InsightResult, Cow<'a, [GlucoseSample]>), ComputeError> {
    settings.validate()?;
    let offset = settings.local_offset()?;
    let glucose = retained_glucose(&snapshot.glucose, settings.retention_days);
    let samples: &[GlucoseSample] = &glucose;

    let meal_curves = extract_meal_curves(samples, &snapshot.food);
    let insulin_curves = extract_insulin_curves(samples, &snapshot.insulin);
    let time_of_day = aggregate_time_of_day(samples, offset);
    let summary = summarize(samples);
    let meal_categories = summarize_meal_categories(&meal_curves);
    let isf = estimate_isf(&insulin_curves);
    let icr = estimate_icr(&meal_curves, &insulin_curves, isf);

    let advisories = evaluate(&RuleContext {
        samples,
        meal_curves: &meal_curves,
        buckets: &time_of_day,
        offset,
    });

    debug!(
        samples = samples.len(),
        meal_curves = meal_curves.len(),
        insulin_curves = insulin_curves.len(),
        advisories = advisories.len(),
        isf_available = isf.is_some(),
        icr_available = icr.is_some(),
        "analysis pass complete"
    );

    let result = InsightResult {
        meal_curves,
        insulin_curves,
        time_of_day,
        summary,
        meal_categories,
        isf,
        icr,
        advisories,
        sample_count: samples.len(),
        food_event_count: snapshot.food.len(),
        insulin_event_count: snapshot.insulin.len(),
    };
    Ok((result, glucose))
}

fn retained_glucose(samples: &[GlucoseSample], retention_days: u32) -> Cow<'_, [GlucoseSample]> {
    let ordered = samples
        .windows(2)
        .all(|pair| pair[0].timestamp < pair[1].timestamp);
    if ordered {
        return Cow::Borrowed(&samples[retention_start(samples, retention_days)..]);
    }
    warn!("glucose samples out of order, normalizing before analysis");
    let (sorted, _) = dedup_sorted(samples.to_vec());
    Cow::Owned(prune_retention(sorted, retention_days))
}

/// Analyze a snapshot document and return the insight report as JSON.
///
/// # Arguments
/// * `snapshot_json` - `{"glucose": [...], "food": [...], "insulin": [...]}`
/// * `settings_json` - Optional `Settings` document; defaults when `None`
///
/// # Example
/// ```ignore
/// let report = analyze_json(snapshot, None)?;
/// ```
pub fn analyze_json(snapshot_json: &str, settings_json: Option<&str>) -> Result<String, ComputeError> {
    let processor = InsightProcessor::with_settings(parse_settings(settings_json)?)?;
    processor.analyze_json(snapshot_json)
}

/// Analyze a snapshot document and return the insight prompt text
pub fn prompt_json(
    snapshot_json: &str,
    settings_json: Option<&str>,
    personal_json: Option<&str>,
) -> Result<String, ComputeError> {
    let processor = InsightProcessor::with_settings(parse_settings(settings_json)?)?;
    let personal = personal_json
        .map(serde_json::from_str::<PersonalContext>)
        .transpose()?;
    let (snapshot, _) = processor.ingest(snapshot_json)?;
    let result = processor.analyze(&snapshot)?;
    Ok(build_prompt(&result, personal.as_ref()))
}

fn parse_settings(settings_json: Option<&str>) -> Result<Settings, ComputeError> {
    match settings_json {
        Some(json) => Settings::from_json(json),
        None => Ok(Settings::default()),
    }
}

/// Stateful processor owning settings and persisted alert cooldowns.
///
/// Use this when alerts are evaluated repeatedly, so that cooldowns carry
/// across passes (and across restarts via `save_cooldowns`/`load_cooldowns`).
pub struct InsightProcessor {
    settings: Settings,
    cooldowns: CooldownState,
    encoder: InsightEncoder,
}

impl Default for InsightProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl InsightProcessor {
    /// Create a new processor with default settings
    pub fn new() -> Self {
        Self {
            settings: Settings::default(),
            cooldowns: CooldownState::default(),
            encoder: InsightEncoder::new(),
        }
    }

    /// Create a processor with validated settings
    pub fn with_settings(settings: Settings) -> Result<Self, ComputeError> {
        settings.validate()?;
        Ok(Self {
            settings,
            cooldowns: CooldownState::default(),
            encoder: InsightEncoder::new(),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cooldowns(&self) -> &CooldownState {
        &self.cooldowns
    }

    /// Load cooldown state from JSON
    pub fn load_cooldowns(&mut self, json: &str) -> Result<(), ComputeError> {
        self.cooldowns =
            CooldownState::from_json(json).map_err(|e| ComputeError::ParseError(e.to_string()))?;
        Ok(())
    }

    /// Save cooldown state to JSON
    pub fn save_cooldowns(&self) -> Result<String, ComputeError> {
        self.cooldowns
            .to_json()
            .map_err(|e| ComputeError::EncodingError(e.to_string()))
    }

    /// Parse a snapshot document using this processor's retention window
    pub fn ingest(
        &self,
        snapshot_json: &str,
    ) -> Result<(LogSnapshot, IngestReport), ComputeError> {
        LogAdapter::parse_snapshot(snapshot_json, self.settings.analysis.retention_days)
    }

    /// Run an analysis pass
    pub fn analyze(&self, snapshot: &LogSnapshot) -> Result<InsightResult, ComputeError> {
        analyze(snapshot, &self.settings.analysis)
    }

    /// Run an analysis pass and wrap the result in a report
    pub fn analyze_report(&self, snapshot: &LogSnapshot) -> Result<InsightReport, ComputeError> {
        let (result, samples) = analyze_retained(snapshot, &self.settings.analysis)?;
        Ok(self.encoder.encode(
            &result,
            &samples,
            self.settings.analysis.utc_offset_minutes,
        ))
    }

    /// Parse, analyze and encode a snapshot document
    pub fn analyze_json(&self, snapshot_json: &str) -> Result<String, ComputeError> {
        let (snapshot, _) = self.ingest(snapshot_json)?;
        let (result, samples) = analyze_retained(&snapshot, &self.settings.analysis)?;
        self.encoder.encode_to_json(
            &result,
            &samples,
            self.settings.analysis.utc_offset_minutes,
        )
    }

    /// Evaluate alerts over the newest samples (sorted ascending).
    pub fn evaluate_alerts(
        &mut self,
        samples: &[GlucoseSample],
        now: DateTime<Utc>,
    ) -> Vec<AlertRequest> {
        evaluate_alerts(samples, &self.settings.alerts, &mut self.cooldowns, now)
    }

    /// Evaluate alerts and hand each fired request to `dispatcher`.
    ///
    /// A kind whose delivery fails has its cooldown restored so the next pass
    /// may retry it. The first delivery error is returned after all requests
    /// have been attempted.
    pub fn evaluate_and_dispatch(
        &mut self,
        samples: &[GlucoseSample],
        now: DateTime<Utc>,
        dispatcher: &mut dyn AlertDispatcher,
    ) -> Result<Vec<AlertRequest>, ComputeError> {
        let previous = self.cooldowns.clone();
        let alerts = self.evaluate_alerts(samples, now);

        let mut first_error = None;
        let mut delivered = Vec::with_capacity(alerts.len());
        for alert in alerts {
            match dispatcher.dispatch(&alert) {
                Ok(()) => delivered.push(alert),
                Err(e) => {
                    warn!(kind = alert.kind.as_str(), error = %e, "alert delivery failed");
                    match alert.kind {
                        AlertKind::High => self.cooldowns.last_high_fired = previous.last_high_fired,
                        AlertKind::Low => self.cooldowns.last_low_fired = previous.last_low_fired,
                    }
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(delivered),
        }
    }

    /// Evaluate alerts over a JSON array of glucose records; returns the
    /// fired requests as a JSON array
    pub fn evaluate_alerts_json(
        &mut self,
        samples_json: &str,
        now: DateTime<Utc>,
    ) -> Result<String, ComputeError> {
        let (samples, _) =
            LogAdapter::parse_glucose_array(samples_json, self.settings.analysis.retention_days)?;
        let alerts = self.evaluate_alerts(&samples, now);
        serde_json::to_string(&alerts).map_err(ComputeError::JsonError)
    }
}
