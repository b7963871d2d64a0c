//! Widget refresh on return to the home screen.
//!
//! Whenever the foreground app is a home launcher, rendered widgets should
//! show a fresh ranking. Broadcasts are rate limited so a user bouncing
//! between apps does not trigger a redraw storm.

use crate::config::EngineConfig;
use crate::platform::{AppCatalog, WidgetNotifier};
use crate::usage::Clock;
use log::debug;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

/// Launchers recognized without any detection
pub const KNOWN_HOME_LAUNCHERS: [&str; 2] = [
    "com.google.android.apps.nexuslauncher",
    "com.sec.android.app.launcher",
];

/// Every package id that counts as a home launcher
#[derive(Debug, Clone, Default)]
pub struct HomeLaunchers {
    configured: BTreeSet<String>,
}

impl HomeLaunchers {
    pub fn new<I, S>(configured: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            configured: configured.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.extra_home_launchers.iter().cloned())
    }

    /// Launchers actually detected on this device: the catalog's default
    /// launcher, the one stored in the document, and configured extras
    pub fn detected(&self, catalog: &dyn AppCatalog, stored: &str) -> BTreeSet<String> {
        let mut launchers = self.configured.clone();
        launchers.extend(catalog.home_launcher());
        if !stored.is_empty() {
            launchers.insert(stored.to_string());
        }
        launchers
    }

    pub fn is_home_launcher(
        &self,
        package_name: &str,
        catalog: &dyn AppCatalog,
        stored: &str,
    ) -> bool {
        KNOWN_HOME_LAUNCHERS.contains(&package_name)
            || self.detected(catalog, stored).contains(package_name)
    }
}

/// Sends rate-limited refresh broadcasts when a launcher comes to the front
pub struct WidgetRefresher {
    notifier: Arc<dyn WidgetNotifier>,
    catalog: Arc<dyn AppCatalog>,
    clock: Arc<dyn Clock>,
    launchers: HomeLaunchers,
    interval_ms: i64,
    last_sent: Mutex<Option<i64>>,
}

impl std::fmt::Debug for WidgetRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetRefresher")
            .field("launchers", &self.launchers)
            .field("interval_ms", &self.interval_ms)
            .finish_non_exhaustive()
    }
}

impl WidgetRefresher {
    pub fn new(
        notifier: Arc<dyn WidgetNotifier>,
        catalog: Arc<dyn AppCatalog>,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            notifier,
            catalog,
            clock,
            launchers: HomeLaunchers::from_config(config),
            interval_ms: config.refresh_interval_ms(),
            last_sent: Mutex::new(None),
        }
    }

    /// Inspect one foreground change; returns `true` if a refresh was sent.
    ///
    /// `stored_launcher` is the document's `homeLauncherPackageName`.
    pub fn on_foreground_app_changed(&self, package_name: &str, stored_launcher: &str) -> bool {
        if package_name.is_empty()
            || !self
                .launchers
                .is_home_launcher(package_name, self.catalog.as_ref(), stored_launcher)
        {
            return false;
        }

        let now = self.clock.now_millis();
        let mut last_sent = self.last_sent.lock().unwrap_or_else(PoisonError::into_inner);
        if last_sent.is_some_and(|at| now <= at.saturating_add(self.interval_ms)) {
            debug!("Home screen refresh skipped, last one was too recent");
            return false;
        }

        *last_sent = Some(now);
        drop(last_sent);
        debug!("Home screen detected ({}), refreshing widgets", package_name);
        self.notifier.refresh_widgets();
        true
    }
}
