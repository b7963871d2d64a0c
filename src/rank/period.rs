//! Period strategy: rank by foreground time over the trailing 30 days.
//!
//! Durations come from the host's usage statistics service, which may be
//! gated behind a permission. A denied query yields an empty ranking, which
//! callers must read as "unavailable" rather than "no apps".

use super::strategy::{saturating_i64, RankedApp};
use std::collections::BTreeMap;

/// Length of the trailing query window
pub const PERIOD_WINDOW_DAYS: i64 = 30;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// One usage-statistics interval for a package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageInterval {
    pub start_ms: i64,
    pub end_ms: i64,
    pub foreground_ms: u64,
}

/// Host usage-duration service
pub trait UsageStatsSource: Send + Sync {
    /// Intervals overlapping `[begin_ms, end_ms]`, grouped by package.
    /// `None` when the host denies access.
    fn query(&self, begin_ms: i64, end_ms: i64) -> Option<BTreeMap<String, Vec<UsageInterval>>>;
}

/// Source for hosts without usage statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableUsageStats;

impl UsageStatsSource for UnavailableUsageStats {
    fn query(&self, _begin_ms: i64, _end_ms: i64) -> Option<BTreeMap<String, Vec<UsageInterval>>> {
        None
    }
}

/// Score every package the usage service reports for the window ending at
/// `now_ms`
pub fn score_period(source: &dyn UsageStatsSource, now_ms: i64) -> Vec<RankedApp> {
    let begin_ms = now_ms.saturating_sub(PERIOD_WINDOW_DAYS * MILLIS_PER_DAY);
    let Some(grouped) = source.query(begin_ms, now_ms) else {
        log::debug!("Usage statistics unavailable");
        return Vec::new();
    };

    grouped
        .into_iter()
        .filter(|(package_name, intervals)| !package_name.is_empty() && !intervals.is_empty())
        .map(|(package_name, intervals)| {
            let foreground = intervals
                .iter()
                .fold(0u64, |acc, i| acc.saturating_add(i.foreground_ms));
            let last_used = intervals.iter().map(|i| i.end_ms).max().unwrap_or(0);
            RankedApp::new(package_name, last_used, saturating_i64(foreground))
        })
        .collect()
}
