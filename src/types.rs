//! Core types for the Synheart Glucose engine
//!
//! This module defines the data structures that flow through the engine: the
//! three input logs, the derived response curves and statistics, the insight
//! snapshot handed to presentation, and the alert requests handed to delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Qualitative CGM trend arrow (7-way slope category)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendArrow {
    #[serde(alias = "DoubleDown")]
    DoubleDown,
    #[serde(alias = "SingleDown")]
    SingleDown,
    #[serde(alias = "FortyFiveDown")]
    FortyFiveDown,
    #[serde(alias = "Flat")]
    Flat,
    #[serde(alias = "FortyFiveUp")]
    FortyFiveUp,
    #[serde(alias = "SingleUp")]
    SingleUp,
    #[serde(alias = "DoubleUp")]
    DoubleUp,
}

impl TrendArrow {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendArrow::DoubleDown => "double_down",
            TrendArrow::SingleDown => "single_down",
            TrendArrow::FortyFiveDown => "forty_five_down",
            TrendArrow::Flat => "flat",
            TrendArrow::FortyFiveUp => "forty_five_up",
            TrendArrow::SingleUp => "single_up",
            TrendArrow::DoubleUp => "double_up",
        }
    }
}

/// A single estimated glucose value (EGV)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlucoseSample {
    /// Reading time (UTC)
    pub timestamp: DateTime<Utc>,
    /// Glucose concentration (mg/dL)
    pub value: i32,
    /// Trend arrow reported by the sensor, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<TrendArrow>,
}

impl GlucoseSample {
    pub fn new(timestamp: DateTime<Utc>, value: i32) -> Self {
        Self {
            timestamp,
            value,
            trend: None,
        }
    }

    /// Timestamp as epoch milliseconds
    pub fn millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// Meal classification chosen by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealCategory {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
    Drink,
    Other,
}

impl MealCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MealCategory::Breakfast => "breakfast",
            MealCategory::Lunch => "lunch",
            MealCategory::Dinner => "dinner",
            MealCategory::Snack => "snack",
            MealCategory::Drink => "drink",
            MealCategory::Other => "other",
        }
    }
}

/// A logged meal or drink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodEvent {
    pub id: String,
    pub name: String,
    /// Carbohydrate content (grams)
    pub carbs_g: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calories: Option<f64>,
    pub category: MealCategory,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Insulin formulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsulinType {
    Rapid,
    LongActing,
    Other,
}

impl InsulinType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsulinType::Rapid => "rapid",
            InsulinType::LongActing => "long_acting",
            InsulinType::Other => "other",
        }
    }
}

/// A logged insulin dose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsulinEvent {
    pub id: String,
    pub units: f64,
    pub insulin_type: InsulinType,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Validated, chronologically ordered input logs for one analysis pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogSnapshot {
    /// Glucose samples, sorted ascending and unique by timestamp
    pub glucose: Vec<GlucoseSample>,
    pub food: Vec<FoodEvent>,
    pub insulin: Vec<InsulinEvent>,
}

/// Glucose response to one logged event.
///
/// For meals the deltas are `value - baseline` and the extremum is the peak.
/// For insulin doses the deltas are drops (`baseline - value`) and the
/// extremum is the nadir. Each delta is `None` when no sample was close
/// enough to its offset; a genuine zero is `Some(0)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseCurve<E> {
    /// The event this curve was anchored on
    pub event: E,
    /// Baseline glucose (mg/dL)
    pub baseline: i32,
    /// Peak (meal) or nadir (insulin) glucose (mg/dL)
    pub extremum: i32,
    /// Minutes from the event to the extremum sample
    pub extremum_offset_minutes: i64,
    pub delta_60: Option<i32>,
    pub delta_120: Option<i32>,
    pub delta_180: Option<i32>,
}

/// Post-meal response curve
pub type MealCurve = ResponseCurve<FoodEvent>;

/// Post-insulin response curve
pub type InsulinCurve = ResponseCurve<InsulinEvent>;

/// Range statistics for one fixed clock-hour band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeOfDayBucket {
    /// Display label, e.g. "00-04"
    pub label: String,
    /// First local hour in the band (inclusive)
    pub start_hour: u32,
    /// Last local hour bound (exclusive)
    pub end_hour: u32,
    /// Mean glucose (mg/dL), 0 when empty
    pub mean: f64,
    /// Percent of samples below 70 mg/dL
    pub pct_low: u32,
    /// Percent of samples within [70, 180] mg/dL
    pub pct_in_range: u32,
    /// Percent of samples above 180 mg/dL
    pub pct_high: u32,
    pub sample_count: usize,
}

impl TimeOfDayBucket {
    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }
}

/// Whole-history glucose statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlucoseSummary {
    pub sample_count: usize,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
    /// Coefficient of variation (percent)
    pub cv_pct: Option<f64>,
    pub pct_low: u32,
    pub pct_in_range: u32,
    pub pct_high: u32,
    /// Glucose management indicator (estimated A1c, percent)
    pub gmi_pct: Option<f64>,
}

/// Aggregate meal response for one meal category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealCategorySummary {
    pub category: MealCategory,
    pub curve_count: usize,
    pub mean_carbs_g: f64,
    /// Mean of the defined +60 min deltas
    pub mean_delta_60: Option<f64>,
    pub mean_peak: f64,
}

/// Advisory rule identifiers, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryKind {
    PostMealSpike,
    DawnPhenomenon,
    NocturnalHypoglycemia,
    LunchtimeHighs,
    LowTimeInRange,
    LatePeaking,
    OnTrack,
    InsufficientData,
}

/// One piece of advisory text produced by the rule engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advisory {
    pub kind: AdvisoryKind,
    pub message: String,
}

/// Immutable snapshot produced by one analysis pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightResult {
    pub meal_curves: Vec<MealCurve>,
    pub insulin_curves: Vec<InsulinCurve>,
    /// All six clock bands, including empty ones
    pub time_of_day: Vec<TimeOfDayBucket>,
    pub summary: GlucoseSummary,
    pub meal_categories: Vec<MealCategorySummary>,
    /// Insulin sensitivity factor (mg/dL per unit), `None` when unavailable
    pub isf: Option<f64>,
    /// Insulin-to-carb ratio (grams per unit), `None` when unavailable
    pub icr: Option<f64>,
    pub advisories: Vec<Advisory>,
    pub sample_count: usize,
    pub food_event_count: usize,
    pub insulin_event_count: usize,
}

impl InsightResult {
    /// Advisory messages joined as display text
    pub fn advisory_text(&self) -> String {
        self.advisories
            .iter()
            .map(|a| a.message.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Bucket by its label ("00-04", "04-08", ...)
    pub fn bucket(&self, label: &str) -> Option<&TimeOfDayBucket> {
        self.time_of_day.iter().find(|b| b.label == label)
    }
}

/// Optional personal details included in the insight prompt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonalContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_years: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height_cm: Option<f64>,
}

impl PersonalContext {
    pub fn has_data(&self) -> bool {
        self.age_years.is_some() || self.weight_kg.is_some() || self.height_cm.is_some()
    }
}

/// Alert kind; each kind has its own cooldown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    High,
    Low,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::High => "high",
            AlertKind::Low => "low",
        }
    }
}

/// Notification urgency requested from the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    High,
    Max,
}

/// A request for the notification collaborator to deliver an alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRequest {
    pub kind: AlertKind,
    pub title: String,
    pub body: String,
    pub urgency: Urgency,
    /// Projected glucose that triggered the alert (mg/dL)
    pub projected: f64,
    pub fired_at: DateTime<Utc>,
}

/// Producer metadata attached to every insight report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Data window the report was computed over
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportWindow {
    pub first_sample_utc: Option<String>,
    pub last_sample_utc: Option<String>,
    /// Local clock offset used for time-of-day bands
    pub utc_offset_minutes: i32,
}

/// Coverage and quality markers for a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportQuality {
    pub sample_count: usize,
    /// Fraction of 5-minute slots in the window holding a sample (0-1)
    pub coverage: f64,
    pub flags: Vec<String>,
}

/// Versioned insight report wrapping one `InsightResult`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightReport {
    pub report_version: String,
    pub producer: ReportProducer,
    pub computed_at_utc: String,
    pub window: ReportWindow,
    pub quality: ReportQuality,
    pub result: InsightResult,
}
