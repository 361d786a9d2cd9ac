//! Engine configuration
//!
//! Settings are owned by the host application and read-only to the engine.
//! Both structs deserialize with defaults for any missing field, so a host
//! can persist only what the user changed.

use crate::error::ComputeError;
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

/// Default rolling retention for glucose history (days)
pub const DEFAULT_RETENTION_DAYS: u32 = 400;

/// Longest accepted retention window (days)
pub const MAX_RETENTION_DAYS: u32 = 3650;

/// Allowed projection window (minutes)
pub const MIN_PROJECTION_MINUTES: u32 = 10;
pub const MAX_PROJECTION_MINUTES: u32 = 40;

/// Settings for the retrospective analysis pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Offset of the user's local clock from UTC, used for time-of-day bands
    pub utc_offset_minutes: i32,
    /// Glucose samples older than this (relative to the newest sample) are dropped
    pub retention_days: u32,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

impl AnalysisSettings {
    pub fn validate(&self) -> Result<(), ComputeError> {
        self.local_offset()?;
        if !(1..=MAX_RETENTION_DAYS).contains(&self.retention_days) {
            return Err(ComputeError::InvalidConfig(format!(
                "retention_days must be within 1..={}, got {}",
                MAX_RETENTION_DAYS, self.retention_days
            )));
        }
        Ok(())
    }

    /// Local clock offset as a chrono offset
    pub fn local_offset(&self) -> Result<FixedOffset, ComputeError> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                ComputeError::InvalidConfig(format!(
                    "utc_offset_minutes out of range: {}",
                    self.utc_offset_minutes
                ))
            })
    }
}

/// Settings for the projection / alert pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    /// Projected value at or above this fires a high alert (mg/dL)
    pub high_threshold: i32,
    /// Projected value at or below this fires a low alert (mg/dL)
    pub low_threshold: i32,
    /// How far ahead to project the current rate (minutes)
    pub projection_minutes: u32,
    pub high_alerts_enabled: bool,
    pub low_alerts_enabled: bool,
    /// How often the host pulls fresh data (minutes)
    pub refresh_interval_minutes: u32,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            high_threshold: 250,
            low_threshold: 70,
            projection_minutes: 20,
            high_alerts_enabled: true,
            low_alerts_enabled: true,
            refresh_interval_minutes: 5,
        }
    }
}

impl AlertSettings {
    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.low_threshold <= 0 {
            return Err(ComputeError::InvalidConfig(format!(
                "low_threshold must be positive, got {}",
                self.low_threshold
            )));
        }
        if self.high_threshold <= self.low_threshold {
            return Err(ComputeError::InvalidConfig(format!(
                "high_threshold ({}) must exceed low_threshold ({})",
                self.high_threshold, self.low_threshold
            )));
        }
        if !(MIN_PROJECTION_MINUTES..=MAX_PROJECTION_MINUTES).contains(&self.projection_minutes) {
            return Err(ComputeError::InvalidConfig(format!(
                "projection_minutes must be within {}..={}, got {}",
                MIN_PROJECTION_MINUTES, MAX_PROJECTION_MINUTES, self.projection_minutes
            )));
        }
        if self.refresh_interval_minutes == 0 {
            return Err(ComputeError::InvalidConfig(
                "refresh_interval_minutes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Combined settings document (`{"analysis": {...}, "alerts": {...}}`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub analysis: AnalysisSettings,
    pub alerts: AlertSettings,
}

impl Settings {
    /// Load and validate settings from JSON
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn validate(&self) -> Result<(), ComputeError> {
        self.analysis.validate()?;
        self.alerts.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings = Settings::from_json(r#"{"alerts": {"high_threshold": 220}}"#).unwrap();
        assert_eq!(settings.alerts.high_threshold, 220);
        assert_eq!(settings.alerts.low_threshold, 70);
        assert_eq!(settings.alerts.projection_minutes, 20);
        assert_eq!(settings.analysis.retention_days, DEFAULT_RETENTION_DAYS);
    }

    #[test]
    fn test_projection_window_bounds() {
        let mut alerts = AlertSettings::default();
        alerts.projection_minutes = 5;
        assert!(alerts.validate().is_err());
        alerts.projection_minutes = 40;
        assert!(alerts.validate().is_ok());
        alerts.projection_minutes = 41;
        assert!(alerts.validate().is_err());
    }

    #[test]
    fn test_thresholds_must_be_ordered() {
        let alerts = AlertSettings {
            high_threshold: 70,
            low_threshold: 80,
            ..Default::default()
        };
        assert!(matches!(
            alerts.validate(),
            Err(ComputeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_local_offset() {
        let analysis = AnalysisSettings {
            utc_offset_minutes: -300,
            ..Default::default()
        };
        assert_eq!(analysis.local_offset().unwrap().local_minus_utc(), -18_000);

        let bad = AnalysisSettings {
            utc_offset_minutes: 24 * 60,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_huge_offset_is_invalid_config() {
        let analysis = AnalysisSettings {
            utc_offset_minutes: 100_000_000,
            ..Default::default()
        };
        assert!(matches!(
            analysis.local_offset(),
            Err(ComputeError::InvalidConfig(_))
        ));
        let analysis = AnalysisSettings {
            utc_offset_minutes: i32::MIN,
            ..Default::default()
        };
        assert!(analysis.validate().is_err());
    }

    #[test]
    fn test_retention_days_bounds() {
        let mut analysis = AnalysisSettings::default();
        analysis.retention_days = 0;
        assert!(analysis.validate().is_err());
        analysis.retention_days = MAX_RETENTION_DAYS;
        assert!(analysis.validate().is_ok());
        analysis.retention_days = 4_000_000_000;
        assert!(matches!(
            analysis.validate(),
            Err(ComputeError::InvalidConfig(_))
        ));
    }
}
