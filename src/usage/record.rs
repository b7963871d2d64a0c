//! # Usage Records
//!
//! One [`AppUsageRecord`] per tracked application. Launches are counted in
//! 336 recurring half-hour buckets covering one week:
//!
//! ```text
//! index = day_of_week (0 = Sunday .. 6) * 48 + hour (0..23) * 2 + half_hour (0|1)
//! ```
//!
//! The bucket vector always holds exactly [`BUCKET_COUNT`] entries; short or
//! missing vectors are zero-padded when a record is built or deserialized.

use crate::store::lenient;
use chrono::{DateTime, Datelike, TimeZone, Timelike};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Half-hour slots in one day
pub const SLOTS_PER_DAY: usize = 48;

/// Days in the recurring week
pub const DAYS_PER_WEEK: usize = 7;

/// Number of half-hour buckets per record
pub const BUCKET_COUNT: usize = SLOTS_PER_DAY * DAYS_PER_WEEK;

/// Bucket index for a day of week (0 = Sunday), hour and half-hour flag.
///
/// Returns `None` when any component is out of range.
pub fn slot_index(day_of_week: u32, hour: u32, half: u32) -> Option<usize> {
    if day_of_week > 6 || hour > 23 || half > 1 {
        return None;
    }
    Some((day_of_week * 48 + hour * 2 + half) as usize)
}

/// Bucket index of the half-hour window containing `time` (in its own offset)
pub fn slot_at<Tz: TimeZone>(time: &DateTime<Tz>) -> usize {
    let day = time.weekday().num_days_from_sunday() as usize;
    day * SLOTS_PER_DAY + time.hour() as usize * 2 + (time.minute() / 30) as usize
}

/// Wrap any (possibly negative) index into `0..BUCKET_COUNT`
pub fn cyclic_index(index: i64) -> usize {
    index.rem_euclid(BUCKET_COUNT as i64) as usize
}

/// Apply the retention law to a single bucket value.
///
/// Large counts shrink by a third but never below 5; small counts lose one.
pub fn decay_value(v: u64) -> u64 {
    if v > 6 {
        ((v as f64 * 2.0 / 3.0).round() as u64).max(5)
    } else {
        v.saturating_sub(1)
    }
}

/// Launch history for a single application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppUsageRecord {
    /// Platform package identifier (unique key)
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub package_name: String,
    /// Timestamp of the last counted launch, in ms since the epoch
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub last_launched: i64,
    #[serde(
        rename = "launchedCount",
        default = "zeroed_buckets",
        deserialize_with = "deserialize_buckets"
    )]
    buckets: Vec<u64>,
}

fn zeroed_buckets() -> Vec<u64> {
    vec![0; BUCKET_COUNT]
}

/// Accept any JSON array of numbers; negatives clamp to zero, the length is
/// normalized to [`BUCKET_COUNT`], and anything else yields all zeros.
fn deserialize_buckets<'de, D>(deserializer: D) -> Result<Vec<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let counts = match value {
        Value::Array(items) => items
            .iter()
            .map(|item| lenient::as_u64(item).unwrap_or(0))
            .collect(),
        _ => Vec::new(),
    };
    Ok(normalize_buckets(counts))
}

fn normalize_buckets(mut counts: Vec<u64>) -> Vec<u64> {
    counts.resize(BUCKET_COUNT, 0);
    counts
}

impl AppUsageRecord {
    /// Create a record with no launches counted yet
    pub fn new(package_name: impl Into<String>, last_launched: i64) -> Self {
        Self {
            package_name: package_name.into(),
            last_launched,
            buckets: zeroed_buckets(),
        }
    }

    /// Build a record from an arbitrary-length count vector, padding or
    /// truncating it to [`BUCKET_COUNT`] slots
    pub fn with_counts(
        package_name: impl Into<String>,
        last_launched: i64,
        counts: Vec<u64>,
    ) -> Self {
        Self {
            package_name: package_name.into(),
            last_launched,
            buckets: normalize_buckets(counts),
        }
    }

    pub fn bucket_counts(&self) -> &[u64] {
        &self.buckets
    }

    /// Count stored in `slot`, or `None` when out of range
    pub fn count_at(&self, slot: usize) -> Option<u64> {
        self.buckets.get(slot).copied()
    }

    /// Count at a cyclic index; negative indices wrap from the end of the week
    pub fn count_cyclic(&self, index: i64) -> u64 {
        self.buckets[cyclic_index(index)]
    }

    /// Total launches across all buckets (saturating)
    pub fn launched_times(&self) -> u64 {
        self.buckets.iter().fold(0u64, |acc, v| acc.saturating_add(*v))
    }

    /// Count one launch in `slot`, saturating at the maximum value
    pub fn increment_slot(&mut self, slot: usize) {
        if let Some(count) = self.buckets.get_mut(slot) {
            *count = count.saturating_add(1);
        }
    }

    /// Fold another record's history into this one: the later launch wins and
    /// buckets are summed slot by slot
    pub fn absorb(&mut self, other: &AppUsageRecord) {
        self.last_launched = self.last_launched.max(other.last_launched);
        for (mine, theirs) in self.buckets.iter_mut().zip(&other.buckets) {
            *mine = mine.saturating_add(*theirs);
        }
    }

    /// Forget all history for this app
    pub fn reset(&mut self) {
        self.last_launched = 0;
        self.buckets.iter_mut().for_each(|v| *v = 0);
    }

    /// Apply [`decay_value`] to every bucket
    pub fn decay(&mut self) {
        self.buckets.iter_mut().for_each(|v| *v = decay_value(*v));
    }
}

/// Collapse every record for `package_name` into its first occurrence.
///
/// Returns the number of duplicates that were merged away.
pub fn merge_duplicates(records: &mut Vec<AppUsageRecord>, package_name: &str) -> usize {
    let mut positions = records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.package_name == package_name)
        .map(|(i, _)| i);

    let Some(first) = positions.next() else {
        return 0;
    };
    let duplicates: Vec<usize> = positions.collect();
    if duplicates.is_empty() {
        return 0;
    }

    // Remove back-to-front so earlier indices stay valid
    for &idx in duplicates.iter().rev() {
        let dup = records.remove(idx);
        records[first].absorb(&dup);
    }
    duplicates.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_slot_index_bounds() {
        assert_eq!(slot_index(0, 0, 0), Some(0));
        assert_eq!(slot_index(6, 23, 1), Some(BUCKET_COUNT - 1));
        assert_eq!(slot_index(2, 10, 1), Some(2 * 48 + 21));
        assert_eq!(slot_index(7, 0, 0), None);
        assert_eq!(slot_index(0, 24, 0), None);
        assert_eq!(slot_index(0, 0, 2), None);
    }

    #[test]
    fn test_slot_at_uses_local_fields() {
        // 2024-01-07 is a Sunday
        assert_eq!(slot_at(&at(2024, 1, 7, 0, 0)), 0);
        assert_eq!(slot_at(&at(2024, 1, 7, 0, 29)), 0);
        assert_eq!(slot_at(&at(2024, 1, 7, 0, 30)), 1);
        // Wednesday 13:45
        assert_eq!(slot_at(&at(2024, 1, 10, 13, 45)), 3 * 48 + 27);
        // Saturday 23:59
        assert_eq!(slot_at(&at(2024, 1, 13, 23, 59)), BUCKET_COUNT - 1);
    }

    #[test]
    fn test_cyclic_index_wraps_both_ways() {
        assert_eq!(cyclic_index(-1), BUCKET_COUNT - 1);
        assert_eq!(cyclic_index(-8), BUCKET_COUNT - 8);
        assert_eq!(cyclic_index(BUCKET_COUNT as i64), 0);
        assert_eq!(cyclic_index(BUCKET_COUNT as i64 + 8), 8);
    }

    #[test]
    fn test_decay_law() {
        for v in 0..=6u64 {
            assert_eq!(decay_value(v), v.saturating_sub(1));
        }
        assert_eq!(decay_value(7), 5);
        assert_eq!(decay_value(9), 6);
        assert_eq!(decay_value(10), 7);
        assert_eq!(decay_value(300), 200);
        for v in 0..2_000u64 {
            assert!(decay_value(v) <= v, "decay must not grow {v}");
        }
    }

    #[test]
    fn test_new_record_has_full_zeroed_buckets() {
        let record = AppUsageRecord::new("com.example.app", 42);
        assert_eq!(record.bucket_counts().len(), BUCKET_COUNT);
        assert_eq!(record.launched_times(), 0);
        assert_eq!(record.last_launched, 42);
    }

    #[test]
    fn test_with_counts_pads_and_truncates() {
        let short = AppUsageRecord::with_counts("a", 0, vec![1, 2, 3]);
        assert_eq!(short.bucket_counts().len(), BUCKET_COUNT);
        assert_eq!(short.launched_times(), 6);

        let long = AppUsageRecord::with_counts("b", 0, vec![1; BUCKET_COUNT + 10]);
        assert_eq!(long.bucket_counts().len(), BUCKET_COUNT);
        assert_eq!(long.launched_times(), BUCKET_COUNT as u64);
    }

    #[test]
    fn test_increment_saturates() {
        let mut counts = vec![0; BUCKET_COUNT];
        counts[5] = u64::MAX;
        let mut record = AppUsageRecord::with_counts("a", 0, counts);
        record.increment_slot(5);
        assert_eq!(record.count_at(5), Some(u64::MAX));
        record.increment_slot(6);
        assert_eq!(record.count_at(6), Some(1));
        assert_eq!(record.launched_times(), u64::MAX);
    }

    #[test]
    fn test_count_cyclic() {
        let mut counts = vec![0; BUCKET_COUNT];
        counts[BUCKET_COUNT - 1] = 4;
        counts[0] = 2;
        let record = AppUsageRecord::with_counts("a", 0, counts);
        assert_eq!(record.count_cyclic(-1), 4);
        assert_eq!(record.count_cyclic(BUCKET_COUNT as i64), 2);
    }

    #[test]
    fn test_merge_duplicates_keeps_latest_and_sums() {
        let mut a1 = AppUsageRecord::new("pkg.a", 100);
        a1.increment_slot(3);
        let b = AppUsageRecord::new("pkg.b", 50);
        let mut a2 = AppUsageRecord::new("pkg.a", 300);
        a2.increment_slot(3);
        a2.increment_slot(4);

        let mut records = vec![a1, b, a2];
        assert_eq!(merge_duplicates(&mut records, "pkg.a"), 1);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].package_name, "pkg.a");
        assert_eq!(records[0].last_launched, 300);
        assert_eq!(records[0].count_at(3), Some(2));
        assert_eq!(records[0].count_at(4), Some(1));
        assert_eq!(records[1].package_name, "pkg.b");

        assert_eq!(merge_duplicates(&mut records, "pkg.a"), 0);
        assert_eq!(merge_duplicates(&mut records, "pkg.missing"), 0);
    }

    #[test]
    fn test_deserialize_pads_and_clamps() {
        let json = r#"{"packageName":"com.x","lastLaunched":7,"launchedCount":[3,-2,"4"]}"#;
        let record: AppUsageRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.bucket_counts().len(), BUCKET_COUNT);
        assert_eq!(&record.bucket_counts()[..3], &[3, 0, 4]);
        assert_eq!(record.last_launched, 7);
    }

    #[test]
    fn test_saturated_bucket_survives_roundtrip() {
        let mut record = AppUsageRecord::with_counts("com.x", 0, vec![u64::MAX, 1]);
        record.increment_slot(0);
        let json = serde_json::to_string(&record).unwrap();
        let restored: AppUsageRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.count_at(0), Some(u64::MAX));
        assert_eq!(restored, record);
    }

    #[test]
    fn test_deserialize_missing_fields() {
        let record: AppUsageRecord = serde_json::from_str(r#"{"packageName":"com.x"}"#).unwrap();
        assert_eq!(record.last_launched, 0);
        assert_eq!(record.launched_times(), 0);
        assert_eq!(record.bucket_counts().len(), BUCKET_COUNT);
    }

    #[test]
    fn test_serialize_uses_document_field_names() {
        let record = AppUsageRecord::new("com.x", 1);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["packageName"], "com.x");
        assert_eq!(value["lastLaunched"], 1);
        assert_eq!(value["launchedCount"].as_array().unwrap().len(), BUCKET_COUNT);
    }

    #[test]
    fn test_reset_and_decay() {
        let mut counts = vec![0; BUCKET_COUNT];
        counts[0] = 30;
        counts[1] = 2;
        let mut record = AppUsageRecord::with_counts("a", 99, counts);
        record.decay();
        assert_eq!(record.count_at(0), Some(20));
        assert_eq!(record.count_at(1), Some(1));

        record.reset();
        assert_eq!(record.launched_times(), 0);
        assert_eq!(record.last_launched, 0);
    }
}
