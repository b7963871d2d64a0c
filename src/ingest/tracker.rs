//! # Foreground Event Ingestion
//!
//! [`UsageTracker::on_foreground_app_changed`] turns the raw stream of
//! foreground-app changes into bucket increments:
//!
//! 1. Empty ids, the tracker's own package and an exact repeat of the previous
//!    foreground package are ignored.
//! 2. Duplicate records for the package are merged first.
//! 3. A package seen for the first time gets a fresh record.
//! 4. A known package launched within the burst window of its last counted
//!    launch is dropped.
//! 5. Otherwise the bucket for the *current wall-clock* slot is incremented
//!    and `last_launched` takes the event timestamp.
//!
//! The in-memory record set changes immediately; the durable write goes
//! through a [`DebouncedWriter`].

use super::debounce::{DebouncedWriter, FlushFn};
use crate::config::EngineConfig;
use crate::store::DataStore;
use crate::usage::{merge_duplicates, slot_at, AppUsageRecord};
use anyhow::Result;
use log::{debug, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// What happened to one foreground event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Empty id, own package, or the same app as the previous event
    Ignored,
    /// Within the burst window of the package's last counted launch
    BurstSuppressed,
    /// Launch counted in `slot`
    Counted { slot: usize, first_launch: bool },
}

#[derive(Debug, Default)]
struct TrackerState {
    /// Lazily loaded from the store on first use
    records: Option<Vec<AppUsageRecord>>,
    last_foreground: Option<String>,
    /// Decay timestamp the in-memory records already reflect
    seen_decay_at: i64,
    dirty: bool,
}

struct Shared {
    store: Arc<DataStore>,
    state: Mutex<TrackerState>,
    flush_lock: Mutex<()>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records, loading them on first access
    fn records<'a>(&self, state: &'a mut TrackerState) -> &'a mut Vec<AppUsageRecord> {
        if state.records.is_none() {
            state.seen_decay_at = self.store.last_decay_at();
            state.records = Some(self.store.load().app_infos);
        }
        state.records.get_or_insert_with(Vec::new)
    }

    /// Write the in-memory records into the persisted document
    fn flush(&self) -> Result<()> {
        let _serialized = self.flush_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let decay_epoch = self.store.last_decay_at();
        let snapshot = {
            let mut state = self.state();
            let state = &mut *state;
            if !state.dirty {
                return Ok(());
            }
            let Some(records) = state.records.as_mut() else {
                return Ok(());
            };
            // Someone else's save decayed the stored copy since we loaded
            if state.seen_decay_at != decay_epoch {
                records.iter_mut().for_each(AppUsageRecord::decay);
                state.seen_decay_at = decay_epoch;
            }
            state.dirty = false;
            records.clone()
        };

        let mut document = self.store.load();
        document.app_infos = snapshot;
        let report = match self.store.save(&mut document) {
            Ok(report) => report,
            Err(e) => {
                self.state().dirty = true;
                return Err(e);
            }
        };

        if report.decayed {
            let mut state = self.state();
            if let Some(records) = state.records.as_mut() {
                records.iter_mut().for_each(AppUsageRecord::decay);
            }
            state.seen_decay_at = self.store.last_decay_at();
        }
        debug!("Persisted {} usage records", document.app_infos.len());
        Ok(())
    }
}

/// Owner of the live usage records
pub struct UsageTracker {
    shared: Arc<Shared>,
    writer: DebouncedWriter,
    self_package: String,
    burst_window_ms: u64,
}

impl std::fmt::Debug for UsageTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageTracker")
            .field("self_package", &self.self_package)
            .field("burst_window_ms", &self.burst_window_ms)
            .field("writer", &self.writer)
            .finish_non_exhaustive()
    }
}

impl UsageTracker {
    /// Create a tracker writing through `store`. Must run inside a tokio
    /// runtime, which hosts the debounced writes.
    pub fn new(store: Arc<DataStore>, config: &EngineConfig) -> Result<Self> {
        Self::with_settings(
            store,
            config.self_package.clone(),
            config.burst_window_ms,
            config.write_debounce(),
        )
    }

    pub fn with_settings(
        store: Arc<DataStore>,
        self_package: impl Into<String>,
        burst_window_ms: u64,
        write_debounce: Duration,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            store,
            state: Mutex::new(TrackerState::default()),
            flush_lock: Mutex::new(()),
        });
        let flush_target = Arc::clone(&shared);
        let flush: FlushFn = Arc::new(move || flush_target.flush());

        Ok(Self {
            shared,
            writer: DebouncedWriter::new(write_debounce, flush)?,
            self_package: self_package.into(),
            burst_window_ms,
        })
    }

    /// Feed one foreground-app change
    pub fn on_foreground_app_changed(
        &self,
        package_name: &str,
        timestamp_ms: i64,
    ) -> IngestOutcome {
        if package_name.is_empty() || package_name == self.self_package {
            return IngestOutcome::Ignored;
        }

        let mut state = self.shared.state();
        if state.last_foreground.as_deref() == Some(package_name) {
            debug!("Ignoring repeat foreground event for {}", package_name);
            return IngestOutcome::Ignored;
        }
        state.last_foreground = Some(package_name.to_string());

        let records = self.shared.records(&mut state);
        let merged = merge_duplicates(records, package_name);
        if merged > 0 {
            warn!("Merged {} duplicate records for {}", merged, package_name);
        }

        let slot = slot_at(&self.shared.store.clock().now());
        let position = records.iter().position(|r| r.package_name == package_name);
        let outcome = match position {
            Some(index) => {
                let record = &mut records[index];
                if record.last_launched.abs_diff(timestamp_ms) < self.burst_window_ms {
                    debug!("Dropping burst duplicate for {}", package_name);
                    if merged > 0 {
                        state.dirty = true;
                        drop(state);
                        self.writer.schedule();
                    }
                    return IngestOutcome::BurstSuppressed;
                }
                record.increment_slot(slot);
                record.last_launched = timestamp_ms;
                IngestOutcome::Counted {
                    slot,
                    first_launch: false,
                }
            }
            None => {
                let mut record = AppUsageRecord::new(package_name, timestamp_ms);
                record.increment_slot(slot);
                records.push(record);
                IngestOutcome::Counted {
                    slot,
                    first_launch: true,
                }
            }
        };
        debug!("Counted launch of {} in slot {}", package_name, slot);

        state.dirty = true;
        drop(state);
        self.writer.schedule();
        outcome
    }

    /// Zero one app's history. Returns `false` if the app is unknown.
    pub fn reset_app(&self, package_name: &str) -> bool {
        let mut state = self.shared.state();
        let records = self.shared.records(&mut state);
        let mut found = false;
        for record in records.iter_mut().filter(|r| r.package_name == package_name) {
            record.reset();
            found = true;
        }
        if found {
            state.dirty = true;
            drop(state);
            self.writer.schedule();
        }
        found
    }

    /// Forget every app's history
    pub fn clear_all(&self) {
        let mut state = self.shared.state();
        state.records = Some(Vec::new());
        state.last_foreground = None;
        state.dirty = true;
        drop(state);
        self.writer.schedule();
    }

    /// Snapshot of the live records
    pub fn records(&self) -> Vec<AppUsageRecord> {
        let mut state = self.shared.state();
        self.shared.records(&mut state).clone()
    }

    /// Drop in-memory state so the next access re-reads the store, e.g.
    /// after an import replaced the document. Unwritten changes are lost.
    pub fn reload(&self) {
        let mut state = self.shared.state();
        state.records = None;
        state.last_foreground = None;
        state.dirty = false;
    }

    /// Write pending changes now instead of waiting for the debounce window
    pub fn flush(&self) -> Result<()> {
        self.writer.flush_now()
    }

    pub fn has_pending_write(&self) -> bool {
        self.writer.is_pending()
    }

    pub fn store(&self) -> &Arc<DataStore> {
        &self.shared.store
    }
}
