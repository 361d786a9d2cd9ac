//! Coefficient estimation
//!
//! Derives insulin sensitivity (ISF) and insulin-to-carb ratio (ICR) from the
//! curve sets, plus per-meal-category response summaries. Every estimate is
//! `None` when the inputs are too thin to support it.

use crate::types::{InsulinCurve, MealCategory, MealCategorySummary, MealCurve};
use std::collections::BTreeMap;

/// Minimum ISF ratios before an ISF is reported
pub const ISF_MIN_SAMPLES: usize = 3;

/// Minimum meal curves before an ICR is reported
pub const ICR_MIN_MEAL_CURVES: usize = 5;

/// Minimum insulin curves before an ICR is reported
pub const ICR_MIN_INSULIN_CURVES: usize = 3;

/// Fraction trimmed from each end before averaging ISF ratios
pub const TRIM_FRACTION: f64 = 0.2;

/// Per-dose sensitivity samples: +120 min drop divided by units
pub fn isf_ratios(curves: &[InsulinCurve]) -> Vec<f64> {
    curves
        .iter()
        .filter(|c| c.event.units > 0.0)
        .filter_map(|c| c.delta_120.map(|drop| drop as f64 / c.event.units))
        .collect()
}

/// Insulin sensitivity factor (mg/dL per unit) as a trimmed mean of per-dose ratios
pub fn estimate_isf(curves: &[InsulinCurve]) -> Option<f64> {
    let ratios = isf_ratios(curves);
    if ratios.len() < ISF_MIN_SAMPLES {
        return None;
    }
    trimmed_mean(&ratios)
}

/// Mean after dropping `TRIM_FRACTION` of values from each end (at least one each side)
pub fn trimmed_mean(values: &[f64]) -> Option<f64> {
    let trim = ((values.len() as f64 * TRIM_FRACTION).floor() as usize).max(1);
    if values.len() <= trim * 2 {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    mean(&sorted[trim..sorted.len() - trim])
}

/// Insulin-to-carb ratio (grams per unit).
///
/// Uses the average positive +60 min meal rise converted to units via ISF.
pub fn estimate_icr(
    meal_curves: &[MealCurve],
    insulin_curves: &[InsulinCurve],
    isf: Option<f64>,
) -> Option<f64> {
    let isf = isf?;
    if meal_curves.len() < ICR_MIN_MEAL_CURVES || insulin_curves.len() < ICR_MIN_INSULIN_CURVES {
        return None;
    }
    if isf <= 0.0 {
        return None;
    }

    let avg_rise = mean_positive_rise_60(meal_curves)?;
    let units_needed = avg_rise / isf;
    if units_needed <= 0.0 {
        return None;
    }

    let carbs: Vec<f64> = meal_curves.iter().map(|c| c.event.carbs_g).collect();
    let avg_carbs = mean(&carbs)?;
    Some(avg_carbs / units_needed)
}

/// Mean of the positive +60 min meal deltas
pub fn mean_positive_rise_60(meal_curves: &[MealCurve]) -> Option<f64> {
    let rises: Vec<f64> = meal_curves
        .iter()
        .filter_map(|c| c.delta_60)
        .filter(|d| *d > 0)
        .map(|d| d as f64)
        .collect();
    mean(&rises)
}

/// Response summary per meal category, in category order
pub fn summarize_meal_categories(meal_curves: &[MealCurve]) -> Vec<MealCategorySummary> {
    let mut groups: BTreeMap<MealCategory, Vec<&MealCurve>> = BTreeMap::new();
    for curve in meal_curves {
        groups.entry(curve.event.category).or_default().push(curve);
    }

    groups
        .into_iter()
        .map(|(category, curves)| {
            let carbs: Vec<f64> = curves.iter().map(|c| c.event.carbs_g).collect();
            let deltas: Vec<f64> = curves
                .iter()
                .filter_map(|c| c.delta_60.map(f64::from))
                .collect();
            let peaks: Vec<f64> = curves.iter().map(|c| c.extremum as f64).collect();

            MealCategorySummary {
                category,
                curve_count: curves.len(),
                mean_carbs_g: mean(&carbs).unwrap_or(0.0),
                mean_delta_60: mean(&deltas),
                mean_peak: mean(&peaks).unwrap_or(0.0),
            }
        })
        .collect()
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}
