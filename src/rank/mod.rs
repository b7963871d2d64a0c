//! # Ranking Module
//!
//! Scores usage records and assembles the ordered app list a widget shows.
//!
//! ## Strategies
//!
//! | Mode | `sort_value` |
//! |------|--------------|
//! | Count | total launches across all buckets |
//! | Period | foreground milliseconds over the trailing 30 days |
//! | Recent | timestamp of the last counted launch |
//! | Recommend | time-of-day heuristic, see [`recommend`] |
//!
//! ## Architecture
//!
//! ```text
//! rank/
//! ├── strategy.rs   # Strategy table, RankedApp
//! ├── recommend.rs  # Recommend heuristic
//! ├── period.rs     # usage-statistics collaborator + Period strategy
//! └── pipeline.rs   # RankingEngine: filter, pin, fallback
//! ```

mod period;
mod pipeline;
pub mod recommend;
mod strategy;

pub use period::{
    score_period, UnavailableUsageStats, UsageInterval, UsageStatsSource, PERIOD_WINDOW_DAYS,
};
pub use pipeline::RankingEngine;
pub use recommend::{recommend_value, score_recommend};
pub use strategy::{RankedApp, ScoringContext, Strategy};
