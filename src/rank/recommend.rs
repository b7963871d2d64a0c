//! # Recommend Heuristic
//!
//! Scores how typical a launch of each app is *right now*, blending three
//! signals:
//!
//! - **today**: the current 1.5 hours against the surrounding ±4 hours
//!   (17 slots, cyclic)
//! - **week**: the same 1.5 hours on every day of the week against the weekly
//!   mean
//! - **rank bonus**: apps near the top of the raw launch count ranking get a
//!   multiplier whose weight depends on the [`RecommendMode`]
//!
//! Slots with too little activity in the current window are damped. Division
//! by zero and other non-finite intermediates contribute 0.

use super::strategy::RankedApp;
use crate::store::RecommendMode;
use crate::usage::{AppUsageRecord, BUCKET_COUNT, DAYS_PER_WEEK, SLOTS_PER_DAY};

/// Half-width of the "today" window, in slots
const TODAY_HALF_WIDTH: i64 = 8;
const TODAY_WEIGHT: f64 = 2.0;
const TODAY_WEIGHT_THRESHOLD: u64 = 5;

const TOTAL_WEIGHT: f64 = 1.5;
const TOTAL_WEIGHT_THRESHOLD: u64 = 12;

const LOW_ACTIVITY_WEIGHT: f64 = 0.4;
const LOW_ACTIVITY_THRESHOLD: u64 = 3;

/// Count ranks below this get no bonus
const RANK_BONUS_SPAN: f64 = 30.0;

fn rank_bonus_weight(mode: RecommendMode) -> f64 {
    match mode {
        RecommendMode::Time => 0.0,
        RecommendMode::Balanced => 1.0,
        RecommendMode::Count => 3.0,
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Score every record for `current_slot`. The output keeps the input order.
pub fn score_recommend(
    records: &[AppUsageRecord],
    current_slot: usize,
    mode: RecommendMode,
) -> Vec<RankedApp> {
    // Stable ranking by raw count; equal counts keep input order
    let mut by_count: Vec<usize> = (0..records.len()).collect();
    by_count.sort_by(|&a, &b| records[b].launched_times().cmp(&records[a].launched_times()));
    let mut count_rank = vec![0; records.len()];
    for (rank, &index) in by_count.iter().enumerate() {
        count_rank[index] = rank;
    }

    records
        .iter()
        .zip(count_rank)
        .map(|(record, rank)| {
            let value = recommend_value(record, current_slot, rank, mode);
            RankedApp::new(record.package_name.clone(), record.last_launched, value)
        })
        .collect()
}

/// Recommend score of a single record
pub fn recommend_value(
    record: &AppUsageRecord,
    current_slot: usize,
    count_rank: usize,
    mode: RecommendMode,
) -> i64 {
    let cur = current_slot as i64;
    let at = |index: i64| record.count_cyclic(index);

    // Today: current 1.5h against the surrounding window
    let today_sum: u64 = (cur - TODAY_HALF_WIDTH..=cur + TODAY_HALF_WIDTH)
        .map(at)
        .fold(0, u64::saturating_add);
    let today_average = today_sum as f64 / (2 * TODAY_HALF_WIDTH + 1) as f64;
    let current_window = [at(cur), at(cur + 1), at(cur - 1)];
    let current_sum = current_window.iter().fold(0u64, |acc, &v| acc.saturating_add(v));
    let current_average = current_sum as f64 / current_window.len() as f64;

    let mut today_score = finite_or_zero(current_average / today_average);
    if today_sum >= TODAY_WEIGHT_THRESHOLD {
        today_score *= TODAY_WEIGHT;
    }

    // Week: the same window on every day against the weekly mean
    let total_sum = record.launched_times();
    let total_average = total_sum as f64 / BUCKET_COUNT as f64;
    let weekly_sum = (0..DAYS_PER_WEEK as i64)
        .map(|day| cur + day * SLOTS_PER_DAY as i64)
        .flat_map(|slot| [at(slot), at(slot + 1), at(slot - 1)])
        .fold(0u64, u64::saturating_add);
    let weekly_average = weekly_sum as f64 / DAYS_PER_WEEK as f64;

    let mut total_score = finite_or_zero(weekly_average / total_average);
    if total_sum >= TOTAL_WEIGHT_THRESHOLD {
        total_score *= TOTAL_WEIGHT;
    }

    let mut value = (today_score + total_score).round();

    let rank_share = ((RANK_BONUS_SPAN - count_rank as f64) / RANK_BONUS_SPAN).max(0.0);
    let rank_bonus = rank_share * rank_bonus_weight(mode) + 1.0;
    value = (value * rank_bonus).round();

    if current_sum < LOW_ACTIVITY_THRESHOLD {
        value = (value * LOW_ACTIVITY_WEIGHT).round();
    }

    finite_or_zero(value) as i64
}
