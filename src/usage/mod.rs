//! # Usage Tracking Module
//!
//! Per-app launch history, counted in recurring half-hour windows of the week.
//!
//! ## Overview
//!
//! Each tracked application owns an [`AppUsageRecord`] holding 336 buckets
//! (7 days × 48 half-hours). A launch observed on Tuesday at 09:40 lands in
//! bucket `2 * 48 + 9 * 2 + 1`. Ranking strategies read these buckets to
//! score apps by raw count, recency, or how typical a launch is for the
//! current time of day.
//!
//! ## Data Format
//!
//! ```json
//! {
//!   "packageName": "com.example.mail",
//!   "lastLaunched": 1650000000000,
//!   "launchedCount": [0, 0, 3, 1, "... 336 entries ..."]
//! }
//! ```

mod clock;
mod record;

pub use clock::{Clock, ManualClock, SystemClock};
pub use record::{
    cyclic_index, decay_value, merge_duplicates, slot_at, slot_index, AppUsageRecord,
    BUCKET_COUNT, DAYS_PER_WEEK, SLOTS_PER_DAY,
};
