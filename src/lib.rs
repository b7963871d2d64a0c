//! LaunchRank - usage tracking and app ranking for home-screen widgets
//!
//! This library records which apps come to the foreground, bucketed into the
//! 336 half-hours of a week, and ranks them for display by raw count, recency,
//! foreground time, or a time-of-day recommendation score.

pub mod config;
pub mod ingest;
pub mod platform;
pub mod rank;
pub mod store;
pub mod usage;
