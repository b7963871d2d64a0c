//! # Ranking Pipeline
//!
//! [`RankingEngine::get_ranked_apps`] produces the final list a widget shows:
//!
//! 1. Score with the widget's [`Strategy`]
//! 2. Fall back to the previous list if the strategy had no data
//! 3. Drop the tracking app itself and detected home launchers
//! 4. Apply the widget's allow/block filter
//! 5. Drop apps without a launchable entry point
//! 6. Sort by score, then float pinned apps to the front (both stable)
//! 7. Remember the result for step 2

use super::period::UsageStatsSource;
use super::strategy::{RankedApp, ScoringContext, Strategy};
use crate::config::EngineConfig;
use crate::ingest::HomeLaunchers;
use crate::platform::AppCatalog;
use crate::store::{DataStore, WidgetSettings};
use crate::usage::AppUsageRecord;
use chrono::{DateTime, FixedOffset};
use log::debug;
use std::cmp::Reverse;
use std::sync::{Arc, Mutex, PoisonError};

pub struct RankingEngine {
    store: Arc<DataStore>,
    catalog: Arc<dyn AppCatalog>,
    usage_stats: Arc<dyn UsageStatsSource>,
    self_package: String,
    launchers: HomeLaunchers,
    last_loaded: Mutex<Vec<RankedApp>>,
    last_update: Mutex<Option<DateTime<FixedOffset>>>,
}

impl std::fmt::Debug for RankingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RankingEngine")
            .field("self_package", &self.self_package)
            .field("launchers", &self.launchers)
            .finish_non_exhaustive()
    }
}

impl RankingEngine {
    pub fn new(
        store: Arc<DataStore>,
        catalog: Arc<dyn AppCatalog>,
        usage_stats: Arc<dyn UsageStatsSource>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            usage_stats,
            self_package: config.self_package.clone(),
            launchers: HomeLaunchers::from_config(config),
            last_loaded: Mutex::new(Vec::new()),
            last_update: Mutex::new(None),
        }
    }

    /// Ranked apps for a widget, using its stored settings
    pub fn rank_widget(&self, widget_id: i32) -> Vec<RankedApp> {
        let settings = self.store.load_widget_settings(widget_id);
        self.get_ranked_apps(&settings)
    }

    /// Ranked apps for `settings`, scored from the persisted records
    pub fn get_ranked_apps(&self, settings: &WidgetSettings) -> Vec<RankedApp> {
        let document = self.store.load();
        self.rank_records(
            &document.app_infos,
            settings,
            &document.home_launcher_package_name,
        )
    }

    /// Ranked apps for `settings`, scored from `records`, e.g. a tracker's
    /// live records that are not yet persisted
    pub fn rank_records(
        &self,
        records: &[AppUsageRecord],
        settings: &WidgetSettings,
        stored_launcher: &str,
    ) -> Vec<RankedApp> {
        let now = self.store.clock().now();
        *self
            .last_update
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(now);

        let strategy = Strategy::for_settings(settings);
        let installed;
        let records = if strategy.uses_records() && records.is_empty() {
            installed = self.installed_records();
            &installed[..]
        } else {
            records
        };

        let scored = strategy.score(&ScoringContext {
            records,
            now,
            usage_stats: self.usage_stats.as_ref(),
        });
        if scored.is_empty() {
            debug!("{:?} produced nothing, keeping the previous list", strategy);
            return self.last_loaded();
        }

        let launchers = self
            .launchers
            .detected(self.catalog.as_ref(), stored_launcher);
        let mut ranked: Vec<RankedApp> = scored
            .into_iter()
            .filter(|app| app.package_name != self.self_package)
            .filter(|app| !launchers.contains(&app.package_name))
            .filter(|app| settings.admits(&app.package_name))
            .filter(|app| self.catalog.is_launchable(&app.package_name))
            .map(|mut app| {
                app.pinned = settings.pinned_apps.contains(&app.package_name);
                app
            })
            .collect();

        ranked.sort_by_key(|app| Reverse(app.sort_value));
        ranked.sort_by_key(|app| Reverse(app.pinned));

        *self
            .last_loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = ranked.clone();
        ranked
    }

    /// Zero-count records for every installed launchable app
    fn installed_records(&self) -> Vec<AppUsageRecord> {
        self.catalog
            .installed_packages()
            .into_iter()
            .filter(|package_name| self.catalog.is_launchable(package_name))
            .map(|package_name| AppUsageRecord::new(package_name, 0))
            .collect()
    }

    /// The most recently produced list
    pub fn last_loaded(&self) -> Vec<RankedApp> {
        self.last_loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// When a ranking was last requested
    pub fn last_update(&self) -> Option<DateTime<FixedOffset>> {
        *self
            .last_update
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::StaticCatalog;
    use crate::rank::period::{UnavailableUsageStats, UsageInterval};
    use crate::store::{FilterMode, SortMode, StoreDocument};
    use crate::usage::{ManualClock, BUCKET_COUNT};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    struct Fixture {
        _temp_dir: TempDir,
        store: Arc<DataStore>,
    }

    fn fixture() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let start = DateTime::parse_from_rfc3339("2024-01-07T00:00:00+00:00").unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(DataStore::open(temp_dir.path(), clock).unwrap());
        Fixture {
            _temp_dir: temp_dir,
            store,
        }
    }

    fn record(package: &str, count: u64) -> AppUsageRecord {
        let mut counts = vec![0; BUCKET_COUNT];
        counts[0] = count;
        AppUsageRecord::with_counts(package, 0, counts)
    }

    fn engine(store: &Arc<DataStore>, catalog: StaticCatalog) -> RankingEngine {
        RankingEngine::new(
            Arc::clone(store),
            Arc::new(catalog),
            Arc::new(UnavailableUsageStats),
            &EngineConfig::default(),
        )
    }

    fn names(apps: &[RankedApp]) -> Vec<&str> {
        apps.iter().map(|a| a.package_name.as_str()).collect()
    }

    #[test]
    fn test_orders_by_score_descending() {
        let f = fixture();
        let engine = engine(&f.store, StaticCatalog::new(["a", "b", "c"]));
        let records = vec![record("a", 1), record("b", 9), record("c", 4)];

        let ranked = engine.rank_records(&records, &WidgetSettings::default(), "");
        assert_eq!(names(&ranked), ["b", "c", "a"]);
        assert!(engine.last_update().is_some());
    }

    #[test]
    fn test_block_list_excludes_regardless_of_score() {
        let f = fixture();
        let engine = engine(
            &f.store,
            StaticCatalog::new(["com.example.blocked", "com.other"]),
        );
        let records = vec![record("com.example.blocked", 1_000), record("com.other", 1)];
        let mut settings = WidgetSettings::default();
        settings.block_apps.insert("com.example.blocked".to_string());

        let ranked = engine.rank_records(&records, &settings, "");
        assert_eq!(names(&ranked), ["com.other"]);
    }

    #[test]
    fn test_allow_list_keeps_only_allowed() {
        let f = fixture();
        let engine = engine(&f.store, StaticCatalog::new(["a", "b", "c"]));
        let records = vec![record("a", 1), record("b", 2), record("c", 3)];
        let mut settings = WidgetSettings::default();
        settings.filter_mode = FilterMode::AllowList;
        settings.allow_apps.insert("a".to_string());
        settings.allow_apps.insert("c".to_string());

        let ranked = engine.rank_records(&records, &settings, "");
        assert_eq!(names(&ranked), ["c", "a"]);
    }

    #[test]
    fn test_pinned_app_wins_ties_and_keeps_score_order() {
        let f = fixture();
        let engine = engine(&f.store, StaticCatalog::new(["a", "b", "c", "d"]));
        let records = vec![record("a", 5), record("b", 5), record("c", 9), record("d", 1)];
        let mut settings = WidgetSettings::default();
        settings.pinned_apps.insert("b".to_string());
        settings.pinned_apps.insert("d".to_string());

        let ranked = engine.rank_records(&records, &settings, "");
        assert_eq!(names(&ranked), ["b", "d", "c", "a"]);
        assert!(ranked[0].pinned && ranked[1].pinned);
        assert!(!ranked[2].pinned);
    }

    #[test]
    fn test_excludes_self_launcher_and_unlaunchable() {
        let f = fixture();
        let catalog = StaticCatalog::new(["dev.launchrank", "com.home", "com.stored", "com.mail"])
            .with_hidden("com.service")
            .with_home_launcher("com.home");
        let engine = engine(&f.store, catalog);
        let records = vec![
            record("dev.launchrank", 50),
            record("com.home", 40),
            record("com.stored", 30),
            record("com.service", 20),
            record("com.mail", 10),
        ];

        let ranked = engine.rank_records(&records, &WidgetSettings::default(), "com.stored");
        assert_eq!(names(&ranked), ["com.mail"]);
    }

    #[test]
    fn test_empty_strategy_result_returns_previous_list() {
        let f = fixture();
        let engine = engine(&f.store, StaticCatalog::new(["a", "b"]));
        let records = vec![record("a", 1), record("b", 2)];
        let first = engine.rank_records(&records, &WidgetSettings::default(), "");

        let mut period = WidgetSettings::default();
        period.sort_mode = SortMode::Period;
        let fallback = engine.rank_records(&records, &period, "");
        assert_eq!(fallback, first);
        assert_eq!(engine.last_loaded(), first);
    }

    #[test]
    fn test_empty_history_starts_from_installed_apps() {
        let f = fixture();
        let engine = engine(
            &f.store,
            StaticCatalog::new(["com.a", "com.b"]).with_hidden("com.hidden"),
        );

        let ranked = engine.rank_widget(0);
        assert_eq!(names(&ranked), ["com.a", "com.b"]);
        assert!(ranked.iter().all(|a| a.sort_value == 0));
    }

    #[test]
    fn test_rank_widget_uses_stored_settings_and_records() {
        let f = fixture();
        let mut doc = StoreDocument::default();
        doc.app_infos.push(AppUsageRecord::new("com.old", 100));
        doc.app_infos.push(AppUsageRecord::new("com.new", 900));
        let mut settings = WidgetSettings::for_widget(4);
        settings.sort_mode = SortMode::Recent;
        doc.widget_settings.insert(4, settings);
        f.store.save(&mut doc).unwrap();

        let engine = engine(&f.store, StaticCatalog::new(["com.old", "com.new"]));
        assert_eq!(names(&engine.rank_widget(4)), ["com.new", "com.old"]);
        // Unknown widget falls back to the default (Count): a tie keeps input order
        assert_eq!(names(&engine.rank_widget(9)), ["com.old", "com.new"]);
    }

    struct FixedUsage;

    impl UsageStatsSource for FixedUsage {
        fn query(&self, _begin: i64, end: i64) -> Option<BTreeMap<String, Vec<UsageInterval>>> {
            let mut data = BTreeMap::new();
            for (package, foreground_ms) in [("com.a", 5_000), ("com.b", 50_000)] {
                data.insert(
                    package.to_string(),
                    vec![UsageInterval {
                        start_ms: end - 10_000,
                        end_ms: end,
                        foreground_ms,
                    }],
                );
            }
            Some(data)
        }
    }

    #[test]
    fn test_period_ranks_by_foreground_time() {
        let f = fixture();
        let engine = RankingEngine::new(
            Arc::clone(&f.store),
            Arc::new(StaticCatalog::new(["com.a", "com.b"])),
            Arc::new(FixedUsage),
            &EngineConfig::default(),
        );
        let mut settings = WidgetSettings::default();
        settings.sort_mode = SortMode::Period;

        let ranked = engine.get_ranked_apps(&settings);
        assert_eq!(names(&ranked), ["com.b", "com.a"]);
        assert_eq!(ranked[0].sort_value, 50_000);
    }
}
