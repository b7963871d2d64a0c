//! End-to-end tests: foreground events through the tracker, into the store,
//! and out through the ranking pipeline

use chrono::DateTime;
use launchrank::config::EngineConfig;
use launchrank::ingest::{IngestOutcome, UsageTracker};
use launchrank::platform::StaticCatalog;
use launchrank::rank::{RankingEngine, UnavailableUsageStats};
use launchrank::store::{DataStore, SortMode, WidgetSettings};
use launchrank::usage::{slot_index, Clock, ManualClock};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const SELF_PACKAGE: &str = "dev.launchrank";

/// Sunday 09:10, bucket 18
fn sunday_morning() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        DateTime::parse_from_rfc3339("2024-01-07T09:10:00+00:00").unwrap(),
    ))
}

fn open_store(temp_dir: &TempDir, clock: Arc<ManualClock>) -> Arc<DataStore> {
    Arc::new(DataStore::open(temp_dir.path(), clock).unwrap())
}

fn engine(store: Arc<DataStore>) -> RankingEngine {
    let catalog = StaticCatalog::new(["com.mail", "com.chat", "com.browser"]);
    RankingEngine::new(
        store,
        Arc::new(catalog),
        Arc::new(UnavailableUsageStats),
        &EngineConfig::default(),
    )
}

fn names(ranked: &[launchrank::rank::RankedApp]) -> Vec<&str> {
    ranked.iter().map(|a| a.package_name.as_str()).collect()
}

#[tokio::test]
async fn test_events_are_counted_and_ranked() {
    let temp_dir = TempDir::new().unwrap();
    let clock = sunday_morning();
    let store = open_store(&temp_dir, Arc::clone(&clock));
    let tracker =
        UsageTracker::with_settings(Arc::clone(&store), SELF_PACKAGE, 500, Duration::from_secs(1))
            .unwrap();

    let t = clock.now_millis();
    let slot = slot_index(0, 9, 0).unwrap();
    assert_eq!(
        tracker.on_foreground_app_changed("com.mail", t),
        IngestOutcome::Counted {
            slot,
            first_launch: true
        }
    );
    assert_eq!(
        tracker.on_foreground_app_changed(SELF_PACKAGE, t + 5_000),
        IngestOutcome::Ignored
    );
    tracker.on_foreground_app_changed("com.chat", t + 10_000);
    tracker.on_foreground_app_changed("com.mail", t + 20_000);
    tracker.on_foreground_app_changed("com.browser", t + 30_000);
    tracker.flush().unwrap();

    let document = store.load();
    assert_eq!(document.record("com.mail").unwrap().count_at(slot), Some(2));
    assert_eq!(document.record("com.chat").unwrap().launched_times(), 1);
    assert!(document.record(SELF_PACKAGE).is_none());

    let ranked = engine(Arc::clone(&store)).rank_widget(0);
    assert_eq!(ranked[0].package_name, "com.mail");
    assert_eq!(ranked[0].sort_value, 2);
    assert_eq!(ranked.len(), 3);
}

#[tokio::test]
async fn test_widget_settings_shape_the_list() {
    let temp_dir = TempDir::new().unwrap();
    let clock = sunday_morning();
    let store = open_store(&temp_dir, Arc::clone(&clock));
    let tracker =
        UsageTracker::with_settings(Arc::clone(&store), SELF_PACKAGE, 500, Duration::from_secs(1))
            .unwrap();

    let t = clock.now_millis();
    for (i, package) in ["com.mail", "com.chat", "com.mail", "com.browser"]
        .iter()
        .enumerate()
    {
        tracker.on_foreground_app_changed(package, t + i as i64 * 60_000);
    }
    tracker.flush().unwrap();

    let mut settings = WidgetSettings::for_widget(5);
    settings.block_apps.insert("com.chat".to_string());
    settings.pinned_apps.insert("com.browser".to_string());
    store.save_widget_settings(settings).unwrap();

    let ranked = engine(Arc::clone(&store)).rank_widget(5);
    assert_eq!(names(&ranked), vec!["com.browser", "com.mail"]);
    assert!(ranked[0].pinned);

    // Widgets without their own entry use the global default
    let ranked = engine(store).rank_widget(9);
    assert_eq!(ranked.len(), 3);
    assert!(ranked.iter().all(|a| !a.pinned));
}

#[tokio::test]
async fn test_recommend_prefers_apps_used_at_this_time() {
    let temp_dir = TempDir::new().unwrap();
    let clock = sunday_morning();
    let store = open_store(&temp_dir, Arc::clone(&clock));
    let tracker =
        UsageTracker::with_settings(Arc::clone(&store), SELF_PACKAGE, 500, Duration::from_secs(1))
            .unwrap();

    // Chat is used a lot in the evening, mail a little in the morning
    clock.set(DateTime::parse_from_rfc3339("2024-01-07T20:00:00+00:00").unwrap());
    let evening = clock.now_millis();
    for i in 0..6 {
        tracker.on_foreground_app_changed("com.chat", evening + i * 60_000);
        tracker.on_foreground_app_changed("com.browser", evening + i * 60_000 + 30_000);
    }
    clock.set(DateTime::parse_from_rfc3339("2024-01-07T09:10:00+00:00").unwrap());
    let morning = clock.now_millis();
    tracker.on_foreground_app_changed("com.mail", morning);
    tracker.on_foreground_app_changed("com.browser", morning + 60_000);
    tracker.on_foreground_app_changed("com.mail", morning + 120_000);
    tracker.flush().unwrap();

    let mut settings = WidgetSettings::for_widget(3);
    settings.sort_mode = SortMode::Count;
    store.save_widget_settings(settings.clone()).unwrap();
    let by_count = engine(Arc::clone(&store)).rank_widget(3);
    assert_eq!(by_count[0].package_name, "com.browser");
    assert_eq!(by_count[1].package_name, "com.chat");

    settings.sort_mode = SortMode::Recommend;
    store.save_widget_settings(settings).unwrap();
    let by_time = engine(store).rank_widget(3);
    assert_eq!(by_time[0].package_name, "com.mail");
    assert_eq!(by_time.last().unwrap().sort_value, 0);
}

#[tokio::test]
async fn test_reset_and_clear_persist() {
    let temp_dir = TempDir::new().unwrap();
    let clock = sunday_morning();
    let store = open_store(&temp_dir, Arc::clone(&clock));
    let tracker =
        UsageTracker::with_settings(Arc::clone(&store), SELF_PACKAGE, 500, Duration::from_secs(1))
            .unwrap();

    let t = clock.now_millis();
    tracker.on_foreground_app_changed("com.mail", t);
    tracker.on_foreground_app_changed("com.chat", t + 1_000);
    tracker.flush().unwrap();

    assert!(tracker.reset_app("com.mail"));
    assert!(!tracker.reset_app("com.unknown"));
    tracker.flush().unwrap();
    let mail = store.load().record("com.mail").cloned().unwrap();
    assert_eq!(mail.launched_times(), 0);
    assert_eq!(mail.last_launched, 0);

    tracker.clear_all();
    tracker.flush().unwrap();
    assert!(store.load().app_infos.is_empty());
}

#[tokio::test]
async fn test_history_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let clock = sunday_morning();
    let t = clock.now_millis();

    {
        let store = open_store(&temp_dir, Arc::clone(&clock));
        let tracker =
            UsageTracker::with_settings(store, SELF_PACKAGE, 500, Duration::from_secs(1)).unwrap();
        tracker.on_foreground_app_changed("com.mail", t);
        tracker.flush().unwrap();
    }

    let store = open_store(&temp_dir, Arc::clone(&clock));
    let tracker =
        UsageTracker::with_settings(Arc::clone(&store), SELF_PACKAGE, 500, Duration::from_secs(1))
            .unwrap();
    assert_eq!(
        tracker.on_foreground_app_changed("com.mail", t + 100),
        IngestOutcome::BurstSuppressed
    );
    assert_eq!(
        tracker.on_foreground_app_changed("com.chat", t + 200),
        IngestOutcome::Counted {
            slot: slot_index(0, 9, 0).unwrap(),
            first_launch: true
        }
    );
}
