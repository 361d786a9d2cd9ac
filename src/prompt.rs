//! Prompt text for an external insight provider
//!
//! The prose layout is free-form; every number in the prompt is copied from
//! the `InsightResult` without re-deriving it.

use crate::types::{InsightResult, MealCurve, PersonalContext};
use std::fmt::Write;

/// Most recent meal curves listed individually
pub const MAX_LISTED_MEALS: usize = 10;

/// Build the prompt for one insight snapshot
pub fn build_prompt(result: &InsightResult, personal: Option<&PersonalContext>) -> String {
    let mut out = String::new();

    out.push_str(
        "You are a diabetes self-management assistant. Review the glucose analysis below \
         and give short, practical observations. Do not give dosing instructions.\n",
    );

    if let Some(ctx) = personal.filter(|c| c.has_data()) {
        out.push_str("\n## About me\n");
        if let Some(age) = ctx.age_years {
            let _ = writeln!(out, "- Age: {} years", age);
        }
        if let Some(weight) = ctx.weight_kg {
            let _ = writeln!(out, "- Weight: {:.1} kg", weight);
        }
        if let Some(height) = ctx.height_cm {
            let _ = writeln!(out, "- Height: {:.1} cm", height);
        }
    }

    write_overview(&mut out, result);
    write_time_of_day(&mut out, result);
    write_meals(&mut out, result);
    write_coefficients(&mut out, result);

    if !result.advisories.is_empty() {
        out.push_str("\n## Detected patterns\n");
        for advisory in &result.advisories {
            let _ = writeln!(out, "- {}", advisory.message);
        }
    }

    out
}

fn write_overview(out: &mut String, result: &InsightResult) {
    let summary = &result.summary;
    out.push_str("\n## Overview\n");
    let _ = writeln!(
        out,
        "- {} glucose readings, {} meals logged, {} insulin doses logged",
        result.sample_count, result.food_event_count, result.insulin_event_count
    );
    if let Some(mean) = summary.mean {
        let _ = writeln!(out, "- Mean glucose: {:.1} mg/dL", mean);
    }
    if let (Some(sd), Some(cv)) = (summary.std_dev, summary.cv_pct) {
        let _ = writeln!(out, "- Standard deviation: {:.1} mg/dL (CV {:.1}%)", sd, cv);
    }
    if let Some(gmi) = summary.gmi_pct {
        let _ = writeln!(out, "- GMI: {:.1}%", gmi);
    }
    if summary.sample_count > 0 {
        let _ = writeln!(
            out,
            "- Time in range (70-180): {}%, below 70: {}%, above 180: {}%",
            summary.pct_in_range, summary.pct_low, summary.pct_high
        );
    }
}

fn write_time_of_day(out: &mut String, result: &InsightResult) {
    let populated: Vec<_> = result.time_of_day.iter().filter(|b| !b.is_empty()).collect();
    if populated.is_empty() {
        return;
    }
    out.push_str("\n## Time of day\n");
    for bucket in populated {
        let _ = writeln!(
            out,
            "- {}: mean {:.0} mg/dL, {}% low, {}% in range, {}% high ({} readings)",
            bucket.label,
            bucket.mean,
            bucket.pct_low,
            bucket.pct_in_range,
            bucket.pct_high,
            bucket.sample_count
        );
    }
}

fn write_meals(out: &mut String, result: &InsightResult) {
    if result.meal_curves.is_empty() {
        return;
    }
    out.push_str("\n## Meal responses\n");
    for summary in &result.meal_categories {
        let _ = write!(
            out,
            "- {}: {} meals, avg {:.0} g carbs, avg peak {:.0} mg/dL",
            summary.category.as_str(),
            summary.curve_count,
            summary.mean_carbs_g,
            summary.mean_peak
        );
        match summary.mean_delta_60 {
            Some(delta) => {
                let _ = writeln!(out, ", avg change after 1h {:+.0} mg/dL", delta);
            }
            None => out.push('\n'),
        }
    }

    let skip = result.meal_curves.len().saturating_sub(MAX_LISTED_MEALS);
    out.push_str("\nRecent meals:\n");
    for curve in &result.meal_curves[skip..] {
        let _ = writeln!(out, "- {}", describe_meal(curve));
    }
}

fn describe_meal(curve: &MealCurve) -> String {
    let event = &curve.event;
    let mut line = format!(
        "{} {} ({}, {:.0} g carbs): baseline {} mg/dL, peak {} mg/dL at +{} min",
        event.timestamp.format("%Y-%m-%d %H:%M UTC"),
        event.name,
        event.category.as_str(),
        event.carbs_g,
        curve.baseline,
        curve.extremum,
        curve.extremum_offset_minutes
    );
    for (label, delta) in [
        ("1h", curve.delta_60),
        ("2h", curve.delta_120),
        ("3h", curve.delta_180),
    ] {
        if let Some(d) = delta {
            let _ = write!(line, ", {} {:+}", label, d);
        }
    }
    line
}

fn write_coefficients(out: &mut String, result: &InsightResult) {
    out.push_str("\n## Estimated ratios\n");
    match result.isf {
        Some(isf) => {
            let _ = writeln!(
                out,
                "- Insulin sensitivity: {:.1} mg/dL per unit (from {} doses)",
                isf,
                result.insulin_curves.len()
            );
        }
        None => out.push_str("- Insulin sensitivity: not enough data\n"),
    }
    match result.icr {
        Some(icr) => {
            let _ = writeln!(out, "- Insulin-to-carb ratio: 1 unit per {:.1} g", icr);
        }
        None => out.push_str("- Insulin-to-carb ratio: not enough data\n"),
    }
}
