//! Rate-of-change projection and threshold alerts
//!
//! This pass looks only at the newest few samples. It blends the two most
//! recent slopes into a weighted rate, projects it forward, and fires high or
//! low alerts. Each alert kind cools down for 30 minutes after firing; the
//! cooldown is derived from a persisted last-fired timestamp.

use crate::config::AlertSettings;
use crate::error::ComputeError;
use crate::types::{AlertKind, AlertRequest, GlucoseSample, Urgency};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Minimum time between two alerts of the same kind (minutes)
pub const COOLDOWN_MINUTES: i64 = 30;

/// Number of trailing samples the projector looks at
pub const MAX_RATE_SAMPLES: usize = 4;

/// High alerts at or beyond `high_threshold + ESCALATION_MARGIN` get maximum urgency
pub const ESCALATION_MARGIN: i32 = 40;

/// Short-term trend projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    /// Newest sample value (mg/dL)
    pub current: i32,
    /// Newest sample time
    pub at: DateTime<Utc>,
    /// Weighted rate (mg/dL per minute)
    pub rate_per_minute: f64,
    pub minutes_ahead: u32,
    /// `current + rate * minutes_ahead`
    pub projected: f64,
}

/// Weighted rate of change over the trailing samples (mg/dL per minute).
///
/// `(2·r1 + r2) / 3` where r1 is the newest slope and r2 the one before it;
/// just r1 with only two samples. `None` with fewer than two samples or when
/// any interval has non-positive elapsed time.
pub fn weighted_rate(samples: &[GlucoseSample]) -> Option<f64> {
    let tail = &samples[samples.len().saturating_sub(MAX_RATE_SAMPLES)..];
    let n = tail.len();
    if n < 2 {
        return None;
    }

    let r1 = slope(&tail[n - 2], &tail[n - 1])?;
    if n < 3 {
        return Some(r1);
    }
    let r2 = slope(&tail[n - 3], &tail[n - 2])?;
    Some((2.0 * r1 + r2) / 3.0)
}

fn slope(earlier: &GlucoseSample, later: &GlucoseSample) -> Option<f64> {
    let elapsed_ms = later.millis() - earlier.millis();
    if elapsed_ms <= 0 {
        return None;
    }
    let minutes = elapsed_ms as f64 / 60_000.0;
    Some((later.value - earlier.value) as f64 / minutes)
}

/// Project the newest sample `minutes_ahead` minutes forward
pub fn project(samples: &[GlucoseSample], minutes_ahead: u32) -> Option<Projection> {
    let rate = weighted_rate(samples)?;
    let latest = samples.last()?;
    Some(Projection {
        current: latest.value,
        at: latest.timestamp,
        rate_per_minute: rate,
        minutes_ahead,
        projected: latest.value as f64 + rate * minutes_ahead as f64,
    })
}

/// Last-fired timestamps per alert kind, persisted across restarts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CooldownState {
    #[serde(default)]
    pub last_high_fired: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_low_fired: Option<DateTime<Utc>>,
}

impl CooldownState {
    pub fn last_fired(&self, kind: AlertKind) -> Option<DateTime<Utc>> {
        match kind {
            AlertKind::High => self.last_high_fired,
            AlertKind::Low => self.last_low_fired,
        }
    }

    pub fn record(&mut self, kind: AlertKind, at: DateTime<Utc>) {
        match kind {
            AlertKind::High => self.last_high_fired = Some(at),
            AlertKind::Low => self.last_low_fired = Some(at),
        }
    }

    /// Eligible once strictly more than `COOLDOWN_MINUTES` have passed
    pub fn is_eligible(&self, kind: AlertKind, now: DateTime<Utc>) -> bool {
        match self.last_fired(kind) {
            Some(last) => now - last > Duration::minutes(COOLDOWN_MINUTES),
            None => true,
        }
    }

    /// Load cooldown state from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize cooldown state to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Delivery collaborator for alert requests
pub trait AlertDispatcher {
    fn dispatch(&mut self, alert: &AlertRequest) -> Result<(), ComputeError>;
}

impl AlertDispatcher for Vec<AlertRequest> {
    fn dispatch(&mut self, alert: &AlertRequest) -> Result<(), ComputeError> {
        self.push(alert.clone());
        Ok(())
    }
}

/// Evaluate high/low alerts for the newest samples.
///
/// `samples` must be sorted ascending. Fired kinds are recorded in `cooldowns`
/// at `now`; taking it by `&mut` keeps read-check-write for one pass exclusive.
pub fn evaluate_alerts(
    samples: &[GlucoseSample],
    settings: &AlertSettings,
    cooldowns: &mut CooldownState,
    now: DateTime<Utc>,
) -> Vec<AlertRequest> {
    let Some(projection) = project(samples, settings.projection_minutes) else {
        debug!(samples = samples.len(), "projection undefined, alerts suppressed");
        return Vec::new();
    };

    let mut alerts = Vec::new();

    if settings.high_alerts_enabled
        && projection.projected >= settings.high_threshold as f64
        && cooldowns.is_eligible(AlertKind::High, now)
    {
        let urgency =
            if projection.projected >= (settings.high_threshold + ESCALATION_MARGIN) as f64 {
                Urgency::Max
            } else {
                Urgency::High
            };
        alerts.push(build_alert(AlertKind::High, urgency, &projection, now));
    }

    if settings.low_alerts_enabled
        && projection.projected <= settings.low_threshold as f64
        && cooldowns.is_eligible(AlertKind::Low, now)
    {
        alerts.push(build_alert(AlertKind::Low, Urgency::Max, &projection, now));
    }

    for alert in &alerts {
        info!(
            kind = alert.kind.as_str(),
            projected = alert.projected,
            "alert fired"
        );
        cooldowns.record(alert.kind, now);
    }

    alerts
}

fn build_alert(
    kind: AlertKind,
    urgency: Urgency,
    projection: &Projection,
    now: DateTime<Utc>,
) -> AlertRequest {
    let (title, direction) = match kind {
        AlertKind::High => ("High glucose predicted", "rising"),
        AlertKind::Low => ("Low glucose predicted", "falling"),
    };
    let body = format!(
        "Glucose is {} mg/dL and {} at {:.1} mg/dL/min. Projected {:.0} mg/dL in {} min.",
        projection.current,
        direction,
        projection.rate_per_minute.abs(),
        projection.projected,
        projection.minutes_ahead
    );

    AlertRequest {
        kind,
        title: title.to_string(),
        body,
        urgency,
        projected: projection.projected,
        fired_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn series(points: &[(i64, i32)]) -> Vec<GlucoseSample> {
        points
            .iter()
            .map(|(m, v)| GlucoseSample::new(t0() + Duration::minutes(*m), *v))
            .collect()
    }

    #[test]
    fn test_rate_two_samples() {
        let samples = series(&[(0, 100), (5, 110)]);
        assert_eq!(weighted_rate(&samples), Some(2.0));
    }

    #[test]
    fn test_rate_blends_previous_slope() {
        // r2 = 1.0, r1 = 4.0 -> (8 + 1) / 3 = 3.0
        let samples = series(&[(0, 100), (5, 105), (10, 125)]);
        assert!((weighted_rate(&samples).unwrap() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_rate_uses_only_trailing_samples() {
        let samples = series(&[(-60, 300), (-30, 40), (0, 100), (5, 105), (10, 125)]);
        assert!((weighted_rate(&samples).unwrap() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_increasing_samples_positive_rate() {
        let samples = series(&[(0, 100), (5, 104), (10, 109), (15, 115)]);
        assert!(weighted_rate(&samples).unwrap() > 0.0);
    }

    #[test]
    fn test_rate_undefined() {
        assert_eq!(weighted_rate(&series(&[(0, 100)])), None);
        assert_eq!(weighted_rate(&[]), None);
        assert_eq!(weighted_rate(&series(&[(0, 100), (0, 120)])), None);
        assert_eq!(weighted_rate(&series(&[(5, 100), (0, 110), (10, 120)])), None);
    }

    #[test]
    fn test_projection() {
        let projection = project(&series(&[(0, 200), (5, 210)]), 20).unwrap();
        assert_eq!(projection.current, 210);
        assert!((projection.projected - 250.0).abs() < 1e-9);
    }

    #[test]
    fn test_high_alert_fires_and_escalates() {
        let settings = AlertSettings::default();
        let mut cooldowns = CooldownState::default();
        // rate 2/min, projected 250 at 20 min
        let samples = series(&[(0, 200), (5, 210)]);
        let alerts = evaluate_alerts(&samples, &settings, &mut cooldowns, t0());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::High);
        assert_eq!(alerts[0].urgency, Urgency::High);

        let mut cooldowns = CooldownState::default();
        let samples = series(&[(0, 250), (5, 260)]);
        let alerts = evaluate_alerts(&samples, &settings, &mut cooldowns, t0());
        assert_eq!(alerts[0].urgency, Urgency::Max);
    }

    #[test]
    fn test_low_alert_always_max() {
        let settings = AlertSettings::default();
        let mut cooldowns = CooldownState::default();
        let samples = series(&[(0, 100), (5, 90)]);
        let alerts = evaluate_alerts(&samples, &settings, &mut cooldowns, t0());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Low);
        assert_eq!(alerts[0].urgency, Urgency::Max);
        assert_eq!(cooldowns.last_low_fired, Some(t0()));
        assert_eq!(cooldowns.last_high_fired, None);
    }

    #[test]
    fn test_cooldown_suppresses_then_releases() {
        let settings = AlertSettings::default();
        let mut cooldowns = CooldownState::default();
        let samples = series(&[(0, 100), (5, 90)]);

        let first = evaluate_alerts(&samples, &settings, &mut cooldowns, t0());
        assert_eq!(first.len(), 1);

        let within = evaluate_alerts(&samples, &settings, &mut cooldowns, t0() + Duration::minutes(29));
        assert!(within.is_empty());

        let boundary = evaluate_alerts(&samples, &settings, &mut cooldowns, t0() + Duration::minutes(30));
        assert!(boundary.is_empty());

        let after = evaluate_alerts(&samples, &settings, &mut cooldowns, t0() + Duration::minutes(31));
        assert_eq!(after.len(), 1);
        assert_eq!(cooldowns.last_low_fired, Some(t0() + Duration::minutes(31)));
    }

    #[test]
    fn test_cooldowns_are_per_kind() {
        let settings = AlertSettings::default();
        let mut cooldowns = CooldownState::default();
        cooldowns.record(AlertKind::High, t0());

        let samples = series(&[(0, 100), (5, 90)]);
        let alerts = evaluate_alerts(&samples, &settings, &mut cooldowns, t0() + Duration::minutes(1));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Low);
    }

    #[test]
    fn test_disabled_kind_never_fires() {
        let settings = AlertSettings {
            low_alerts_enabled: false,
            ..Default::default()
        };
        let mut cooldowns = CooldownState::default();
        let samples = series(&[(0, 100), (5, 90)]);
        assert!(evaluate_alerts(&samples, &settings, &mut cooldowns, t0()).is_empty());
        assert_eq!(cooldowns, CooldownState::default());
    }

    #[test]
    fn test_no_alert_without_projection() {
        let settings = AlertSettings::default();
        let mut cooldowns = CooldownState::default();
        let samples = series(&[(0, 40)]);
        assert!(evaluate_alerts(&samples, &settings, &mut cooldowns, t0()).is_empty());
    }

    #[test]
    fn test_cooldown_json_roundtrip() {
        let mut cooldowns = CooldownState::default();
        cooldowns.record(AlertKind::High, t0());
        let json = cooldowns.to_json().unwrap();
        let loaded = CooldownState::from_json(&json).unwrap();
        assert_eq!(loaded, cooldowns);

        let empty = CooldownState::from_json("{}").unwrap();
        assert_eq!(empty, CooldownState::default());
    }

    #[test]
    fn test_vec_dispatcher_collects() {
        let settings = AlertSettings::default();
        let mut cooldowns = CooldownState::default();
        let samples = series(&[(0, 100), (5, 90)]);
        let mut sink: Vec<AlertRequest> = Vec::new();
        for alert in evaluate_alerts(&samples, &settings, &mut cooldowns, t0()) {
            sink.dispatch(&alert).unwrap();
        }
        assert_eq!(sink.len(), 1);
    }
}
