//! Advisory rule engine
//!
//! A fixed, ordered list of heuristics over the aggregated statistics and
//! curves. Each rule is evaluated independently and contributes at most one
//! advisory. The thresholds are tuned policy constants.

use crate::metrics::mean_positive_rise_60;
use crate::time_of_day::{RANGE_HIGH, RANGE_LOW};
use crate::types::{Advisory, AdvisoryKind, GlucoseSample, MealCurve, TimeOfDayBucket};
use chrono::{FixedOffset, Timelike};

/// Mean positive +60 min rise that counts as a spike (mg/dL)
pub const SPIKE_RISE_THRESHOLD: f64 = 60.0;

/// 04-08 band mean above this may indicate dawn phenomenon (mg/dL)
pub const DAWN_MEAN_THRESHOLD: f64 = 140.0;

/// Required gap between the 04-08 and 00-04 band means (mg/dL)
pub const DAWN_GAP: f64 = 20.0;

/// 00-04 band low percentage above this flags nocturnal lows
pub const NOCTURNAL_LOW_PCT: u32 = 10;

/// Local hours (inclusive) counted as lunchtime
pub const LUNCH_HOURS: (u32, u32) = (11, 13);

/// Post-lunch peak above this counts as a high (mg/dL)
pub const LUNCH_PEAK_THRESHOLD: i32 = 200;

/// Lunchtime highs needed to fire
pub const LUNCH_HIGH_MIN_COUNT: usize = 3;

/// Samples needed before overall time-in-range is judged
pub const TIR_MIN_SAMPLES: usize = 50;

/// Time-in-range fraction below this is flagged
pub const TIR_LOW_FRACTION: f64 = 0.5;

/// Peak offset window (minutes, inclusive) counted as a late peak
pub const LATE_PEAK_MINUTES: (i64, i64) = (120, 240);

/// Meal curves needed before peak timing is judged
pub const LATE_PEAK_MIN_CURVES: usize = 5;

/// Samples needed before the reassurance message is shown
pub const ON_TRACK_MIN_SAMPLES: usize = 100;

/// Fewer samples than this triggers the insufficient-data notice
pub const INSUFFICIENT_SAMPLES: usize = 30;

/// Inputs the rules look at
pub struct RuleContext<'a> {
    pub samples: &'a [GlucoseSample],
    pub meal_curves: &'a [MealCurve],
    pub buckets: &'a [TimeOfDayBucket],
    pub offset: FixedOffset,
}

impl RuleContext<'_> {
    fn bucket(&self, label: &str) -> Option<&TimeOfDayBucket> {
        self.buckets
            .iter()
            .find(|b| b.label == label && !b.is_empty())
    }
}

type Rule = fn(&RuleContext<'_>) -> Option<Advisory>;

/// Data-driven rules, in evaluation order
const RULES: [Rule; 6] = [
    post_meal_spike,
    dawn_phenomenon,
    nocturnal_lows,
    lunchtime_highs,
    low_time_in_range,
    late_peaking,
];

/// Evaluate every rule and collect the advisories that fired
pub fn evaluate(ctx: &RuleContext<'_>) -> Vec<Advisory> {
    let mut advisories: Vec<Advisory> = RULES.iter().filter_map(|rule| rule(ctx)).collect();

    if advisories.is_empty() && ctx.samples.len() >= ON_TRACK_MIN_SAMPLES {
        advisories.push(advisory(
            AdvisoryKind::OnTrack,
            "No concerning patterns found. Your glucose looks well managed, keep it up.".to_string(),
        ));
    }

    if ctx.samples.len() < INSUFFICIENT_SAMPLES {
        advisories.push(advisory(
            AdvisoryKind::InsufficientData,
            format!(
                "Only {} glucose readings are available. More data is needed for reliable insights.",
                ctx.samples.len()
            ),
        ));
    }

    advisories
}

fn advisory(kind: AdvisoryKind, message: String) -> Advisory {
    Advisory { kind, message }
}

fn post_meal_spike(ctx: &RuleContext<'_>) -> Option<Advisory> {
    let rise = mean_positive_rise_60(ctx.meal_curves)?;
    (rise > SPIKE_RISE_THRESHOLD).then(|| {
        advisory(
            AdvisoryKind::PostMealSpike,
            format!(
                "Glucose rises an average of {:.0} mg/dL one hour after meals. \
                 Consider pre-bolusing earlier or choosing lower-glycemic carbs.",
                rise
            ),
        )
    })
}

/// Fires when the 04-08 band runs high and well above the 00-04 band.
///
/// Both bands must hold samples. An empty 00-04 band has no overnight level to
/// compare against, so the rule stays silent instead of treating it as zero.
fn dawn_phenomenon(ctx: &RuleContext<'_>) -> Option<Advisory> {
    let night = ctx.bucket("00-04")?;
    let dawn = ctx.bucket("04-08")?;
    (dawn.mean > DAWN_MEAN_THRESHOLD && dawn.mean > night.mean + DAWN_GAP).then(|| {
        advisory(
            AdvisoryKind::DawnPhenomenon,
            format!(
                "Early-morning glucose (04-08, avg {:.0} mg/dL) runs well above overnight \
                 levels (00-04, avg {:.0} mg/dL). This may be the dawn phenomenon.",
                dawn.mean, night.mean
            ),
        )
    })
}

fn nocturnal_lows(ctx: &RuleContext<'_>) -> Option<Advisory> {
    let night = ctx.bucket("00-04")?;
    (night.pct_low > NOCTURNAL_LOW_PCT).then(|| {
        advisory(
            AdvisoryKind::NocturnalHypoglycemia,
            format!(
                "{}% of readings between midnight and 4 AM are below {} mg/dL. \
                 Review evening insulin and bedtime snacks.",
                night.pct_low, RANGE_LOW
            ),
        )
    })
}

fn lunchtime_highs(ctx: &RuleContext<'_>) -> Option<Advisory> {
    let (first, last) = LUNCH_HOURS;
    let count = ctx
        .meal_curves
        .iter()
        .filter(|c| {
            let hour = c.event.timestamp.with_timezone(&ctx.offset).hour();
            (first..=last).contains(&hour) && c.extremum > LUNCH_PEAK_THRESHOLD
        })
        .count();

    (count >= LUNCH_HIGH_MIN_COUNT).then(|| {
        advisory(
            AdvisoryKind::LunchtimeHighs,
            format!(
                "{} lunches peaked above {} mg/dL. Lunch may need a larger dose or fewer carbs.",
                count, LUNCH_PEAK_THRESHOLD
            ),
        )
    })
}

fn low_time_in_range(ctx: &RuleContext<'_>) -> Option<Advisory> {
    let total = ctx.samples.len();
    if total < TIR_MIN_SAMPLES {
        return None;
    }
    let in_range = ctx
        .samples
        .iter()
        .filter(|s| (RANGE_LOW..=RANGE_HIGH).contains(&s.value))
        .count();
    let fraction = in_range as f64 / total as f64;

    (fraction < TIR_LOW_FRACTION).then(|| {
        advisory(
            AdvisoryKind::LowTimeInRange,
            format!(
                "Only {:.0}% of readings are within {}-{} mg/dL. Most guidelines target at least 70%.",
                fraction * 100.0,
                RANGE_LOW,
                RANGE_HIGH
            ),
        )
    })
}

fn late_peaking(ctx: &RuleContext<'_>) -> Option<Advisory> {
    let total = ctx.meal_curves.len();
    if total < LATE_PEAK_MIN_CURVES {
        return None;
    }
    let (start, end) = LATE_PEAK_MINUTES;
    let late = ctx
        .meal_curves
        .iter()
        .filter(|c| (start..=end).contains(&c.extremum_offset_minutes))
        .count();

    (late * 2 > total).then(|| {
        advisory(
            AdvisoryKind::LatePeaking,
            format!(
                "{} of {} meals peaked two or more hours after eating. \
                 Slow-digesting meals may need a split or extended bolus.",
                late, total
            ),
        )
    })
}
