//! Strategy dispatch.
//!
//! Each widget picks one [`Strategy`] from its settings. A strategy turns the
//! usage records into [`RankedApp`]s carrying a `sort_value`; ordering, ties
//! and filtering are left to the pipeline.

use super::period::{score_period, UsageStatsSource};
use super::recommend::score_recommend;
use crate::store::{RecommendMode, SortMode, WidgetSettings};
use crate::usage::{slot_at, AppUsageRecord};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;

/// One app in a ranked list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedApp {
    pub package_name: String,
    pub last_launched: i64,
    /// Strategy score; larger ranks earlier
    pub sort_value: i64,
    /// Set by the pipeline for apps on the widget's pin list
    pub pinned: bool,
}

impl RankedApp {
    pub fn new(package_name: impl Into<String>, last_launched: i64, sort_value: i64) -> Self {
        Self {
            package_name: package_name.into(),
            last_launched,
            sort_value,
            pinned: false,
        }
    }
}

/// Inputs shared by every strategy
pub struct ScoringContext<'a> {
    pub records: &'a [AppUsageRecord],
    pub now: DateTime<FixedOffset>,
    pub usage_stats: &'a dyn UsageStatsSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Count,
    Period,
    Recent,
    Recommend(RecommendMode),
}

impl Strategy {
    pub fn for_settings(settings: &WidgetSettings) -> Self {
        match settings.sort_mode {
            SortMode::Count => Self::Count,
            SortMode::Period => Self::Period,
            SortMode::Recent => Self::Recent,
            SortMode::Recommend => Self::Recommend(settings.recommend_mode),
        }
    }

    /// Whether this strategy ranks the locally tracked records (as opposed to
    /// an external data source)
    pub fn uses_records(self) -> bool {
        !matches!(self, Self::Period)
    }

    /// Score every candidate. An empty result means "no data available".
    pub fn score(self, ctx: &ScoringContext<'_>) -> Vec<RankedApp> {
        match self {
            Self::Count => score_by(ctx.records, |r| saturating_i64(r.launched_times())),
            Self::Recent => score_by(ctx.records, |r| r.last_launched),
            Self::Recommend(mode) => score_recommend(ctx.records, slot_at(&ctx.now), mode),
            Self::Period => score_period(ctx.usage_stats, ctx.now.timestamp_millis()),
        }
    }
}

fn score_by(records: &[AppUsageRecord], value: impl Fn(&AppUsageRecord) -> i64) -> Vec<RankedApp> {
    records
        .iter()
        .map(|r| RankedApp::new(r.package_name.clone(), r.last_launched, value(r)))
        .collect()
}

pub(crate) fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
