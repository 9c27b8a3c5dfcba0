//! Weekly order-volume baselines.
//!
//! Purely advisory: the signal annotates candidates with a "better or
//! worse than usual" note and never gates whether a decision is shown.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Utc};

use crate::domain::order::OrderRecord;

/// Distinct ISO weeks of history required before a baseline is trusted.
pub const MIN_WEEKS_OF_HISTORY: usize = 12;
/// Deviation from the same-week baseline that warrants a note.
pub const DEVIATION_THRESHOLD_PCT: f64 = 10.0;

/// Compare the current ISO week's order count against the average of the
/// same week number in prior years. Returns a context message only when
/// enough history exists and the deviation is at least 10% either way.
pub fn weekly_pace_context(orders: &[OrderRecord], now: DateTime<Utc>) -> Option<String> {
    let mut counts: HashMap<(i32, u32), u32> = HashMap::new();
    for order in orders {
        let week = order.created_at.iso_week();
        *counts.entry((week.year(), week.week())).or_insert(0) += 1;
    }

    if counts.len() < MIN_WEEKS_OF_HISTORY {
        return None;
    }

    let current = now.iso_week();
    let current_count = counts.get(&(current.year(), current.week())).copied().unwrap_or(0);

    let prior_years: Vec<u32> = counts
        .iter()
        .filter(|((year, week), _)| *week == current.week() && *year < current.year())
        .map(|(_, count)| *count)
        .collect();
    if prior_years.is_empty() {
        return None;
    }

    let baseline = f64::from(prior_years.iter().sum::<u32>()) / prior_years.len() as f64;
    if baseline == 0.0 {
        return None;
    }

    let deviation_pct = (f64::from(current_count) - baseline) / baseline * 100.0;
    if deviation_pct.abs() < DEVIATION_THRESHOLD_PCT {
        return None;
    }

    if deviation_pct > 0.0 {
        Some(format!(
            "Order volume is {:.0}% above the usual pace for this time of year.",
            deviation_pct
        ))
    } else {
        Some(format!(
            "Order volume is {:.0}% below the usual pace for this time of year.",
            deviation_pct.abs()
        ))
    }
}
