//! # Document Storage
//!
//! Persists the [`StoreDocument`] as a single JSON file.
//!
//! ## Storage Location
//!
//! ```text
//! ~/.local/share/launchrank/
//! ├── store.json          # current document
//! ├── store.json.bak      # last payload that parsed successfully
//! ├── store.json.corrupt  # last payload that did not parse at all
//! └── store.meta.json     # decay bookkeeping
//! ```
//!
//! ## Reads
//!
//! [`DataStore::load`] never fails. Missing or unreadable files yield the
//! default document. Loaded documents are cached for a short TTL so several
//! widgets rendering at once share one deserialization; every write drops the
//! cache.
//!
//! ## Writes
//!
//! [`DataStore::save`] decays every usage record first when the retention
//! interval has elapsed since the last decay, then replaces the file
//! atomically (temp file + rename).

use super::document::{StoreDocument, WidgetSettings, CURRENT_DATA_VERSION, DEFAULT_WIDGET_ID};
use super::legacy::{self, SourceFormat};
use crate::usage::Clock;
use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Name of the document file inside the data directory
pub const STORE_FILE_NAME: &str = "store.json";

/// Default read cache lifetime
pub const DEFAULT_CACHE_TTL_MS: i64 = 1_000;

/// Default minimum time between two decays
pub const DEFAULT_DECAY_INTERVAL_DAYS: i64 = 7;

/// Payloads shorter than this are never worth backing up
const BACKUP_MIN_PAYLOAD_LEN: usize = 100;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Outcome of a successful [`DataStore::save`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SaveReport {
    /// The retention transform ran before this write
    pub decayed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecayMeta {
    last_decay_at: i64,
}

#[derive(Debug, Clone)]
struct CachedDocument {
    loaded_at: i64,
    document: StoreDocument,
}

/// File-backed owner of the persisted document
pub struct DataStore {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
    cache_ttl_ms: i64,
    decay_interval_ms: i64,
    cache: Mutex<Option<CachedDocument>>,
    last_decay_at: Mutex<Option<i64>>,
}

impl std::fmt::Debug for DataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStore")
            .field("dir", &self.dir)
            .field("cache_ttl_ms", &self.cache_ttl_ms)
            .field("decay_interval_ms", &self.decay_interval_ms)
            .finish_non_exhaustive()
    }
}

impl DataStore {
    /// Open (and create if needed) a store rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;

        Ok(Self {
            dir,
            clock,
            cache_ttl_ms: DEFAULT_CACHE_TTL_MS,
            decay_interval_ms: DEFAULT_DECAY_INTERVAL_DAYS * MILLIS_PER_DAY,
            cache: Mutex::new(None),
            last_decay_at: Mutex::new(None),
        })
    }

    pub fn with_cache_ttl_ms(mut self, ttl_ms: i64) -> Self {
        self.cache_ttl_ms = ttl_ms.max(0);
        self
    }

    pub fn with_decay_interval_days(mut self, days: i64) -> Self {
        self.decay_interval_ms = days.max(0).saturating_mul(MILLIS_PER_DAY);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn document_path(&self) -> PathBuf {
        self.dir.join(STORE_FILE_NAME)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.dir.join(format!("{STORE_FILE_NAME}.bak"))
    }

    pub fn corrupt_path(&self) -> PathBuf {
        self.dir.join(format!("{STORE_FILE_NAME}.corrupt"))
    }

    fn meta_path(&self) -> PathBuf {
        self.dir.join("store.meta.json")
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Current document, served from the read cache while it is fresh
    pub fn load(&self) -> StoreDocument {
        let now = self.clock.now_millis();
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(cached) = cache.as_ref() {
            let age = now - cached.loaded_at;
            if (0..self.cache_ttl_ms).contains(&age) {
                return cached.document.clone();
            }
        }

        let document = self.read_document();
        *cache = Some(CachedDocument {
            loaded_at: now,
            document: document.clone(),
        });
        document
    }

    /// Drop the read cache so the next [`load`](Self::load) hits the disk
    pub fn invalidate_cache(&self) {
        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn read_document(&self) -> StoreDocument {
        let path = self.document_path();
        if !path.exists() {
            debug!("No document at {}, starting fresh", path.display());
            return StoreDocument::default();
        }

        // Anything we cannot use is moved aside before a save can replace it
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to read document {}: {}", path.display(), e);
                self.quarantine(&path);
                return StoreDocument::default();
            }
        };
        let payload = match String::from_utf8(bytes) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Discarding non-UTF-8 document {}: {}", path.display(), e);
                self.quarantine(&path);
                return StoreDocument::default();
            }
        };

        match legacy::parse_document(&payload) {
            Ok((document, format)) => {
                if format != SourceFormat::Versioned {
                    info!("Converted {:?} document at {}", format, path.display());
                }
                self.write_backup(&payload);
                document
            }
            Err(e) => {
                warn!("Discarding unreadable document {}: {:#}", path.display(), e);
                self.quarantine(&path);
                StoreDocument::default()
            }
        }
    }

    fn write_backup(&self, payload: &str) {
        if payload.len() <= BACKUP_MIN_PAYLOAD_LEN {
            return;
        }
        let backup = self.backup_path();
        if fs::read_to_string(&backup).is_ok_and(|existing| existing == payload) {
            return;
        }
        if let Err(e) = fs::write(&backup, payload) {
            warn!("Failed to write backup {}: {}", backup.display(), e);
        }
    }

    fn quarantine(&self, path: &Path) {
        let target = self.corrupt_path();
        if let Err(e) = fs::rename(path, &target) {
            warn!(
                "Failed to move {} aside to {}: {}",
                path.display(),
                target.display(),
                e
            );
        }
    }

    /// Timestamp of the last decay, initialized to "now" on first use
    pub fn last_decay_at(&self) -> i64 {
        let mut slot = self
            .last_decay_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(at) = *slot {
            return at;
        }

        let at = match self.read_meta() {
            Ok(Some(meta)) => meta.last_decay_at,
            Ok(None) => {
                let now = self.clock.now_millis();
                if let Err(e) = self.write_meta_file(now) {
                    warn!("Failed to initialize decay bookkeeping: {:#}", e);
                }
                now
            }
            Err(e) => {
                warn!("Unreadable decay bookkeeping, restarting the interval: {:#}", e);
                self.clock.now_millis()
            }
        };
        *slot = Some(at);
        at
    }

    fn read_meta(&self) -> Result<Option<DecayMeta>> {
        let path = self.meta_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let meta = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(meta))
    }

    fn write_meta_file(&self, last_decay_at: i64) -> Result<()> {
        let contents = serde_json::to_string(&DecayMeta { last_decay_at })
            .context("Failed to serialize decay bookkeeping")?;
        write_atomically(&self.meta_path(), &contents)
    }

    fn write_meta(&self, last_decay_at: i64) -> Result<()> {
        self.write_meta_file(last_decay_at)?;
        *self
            .last_decay_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(last_decay_at);
        Ok(())
    }

    /// Persist `document`, decaying its usage records first when due.
    ///
    /// The decay is applied to `document` itself so the caller's copy
    /// matches what was written.
    pub fn save(&self, document: &mut StoreDocument) -> Result<SaveReport> {
        let now = self.clock.now_millis();
        let decayed = now - self.last_decay_at() > self.decay_interval_ms;
        if decayed {
            info!("Decaying launch counts of {} apps", document.app_infos.len());
            document.reduce_launched_counts();
        }

        self.persist(document)?;
        if decayed {
            self.write_meta(now)?;
        }
        Ok(SaveReport { decayed })
    }

    fn persist(&self, document: &mut StoreDocument) -> Result<()> {
        document.ensure_default_widget();
        if document.data_version() < CURRENT_DATA_VERSION {
            document.set_data_version(CURRENT_DATA_VERSION);
        }

        let contents = serde_json::to_string(document).context("Failed to serialize document")?;
        write_atomically(&self.document_path(), &contents)?;
        self.invalidate_cache();
        Ok(())
    }

    /// Apply the retention transform right away, regardless of the interval
    pub fn decay_now(&self) -> Result<StoreDocument> {
        let mut document = self.load();
        document.reduce_launched_counts();
        self.persist(&mut document)?;
        self.write_meta(self.clock.now_millis())?;
        info!("Decayed launch counts of {} apps", document.app_infos.len());
        Ok(document)
    }

    pub fn load_widget_settings(&self, widget_id: i32) -> WidgetSettings {
        self.load().widget_settings_for(widget_id)
    }

    pub fn save_widget_settings(&self, settings: WidgetSettings) -> Result<()> {
        let mut document = self.load();
        document
            .widget_settings
            .insert(settings.widget_id, settings);
        self.save(&mut document)?;
        Ok(())
    }

    /// Remove one widget's own settings. The global default is never removed.
    pub fn erase_widget_settings(&self, widget_id: i32) -> Result<bool> {
        if widget_id == DEFAULT_WIDGET_ID {
            warn!("Refusing to erase the default widget settings");
            return Ok(false);
        }
        let mut document = self.load();
        let removed = document.widget_settings.remove(&widget_id).is_some();
        if removed {
            self.save(&mut document)?;
        }
        Ok(removed)
    }

    /// Remove every widget's own settings, keeping only the global default
    pub fn erase_all_specific_widget_settings(&self) -> Result<usize> {
        let mut document = self.load();
        let before = document.widget_settings.len();
        document
            .widget_settings
            .retain(|id, _| *id == DEFAULT_WIDGET_ID);
        let removed = before - document.widget_settings.len();
        if removed > 0 {
            self.save(&mut document)?;
        }
        Ok(removed)
    }

    /// The current document as pretty-printed JSON
    pub fn export(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.load()).context("Failed to serialize document")
    }

    pub fn export_to(&self, path: &Path) -> Result<()> {
        let contents = self.export()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write export file: {}", path.display()))
    }

    /// Replace the current document with an imported payload of any supported
    /// generation. Widget settings the import lacks are kept from the current
    /// document.
    pub fn import(&self, payload: &str) -> Result<StoreDocument> {
        let (mut imported, format) =
            legacy::parse_document(payload).context("Failed to parse imported document")?;
        if imported == StoreDocument::default() {
            bail!("Imported document holds no data");
        }

        let current = self.load();
        for (widget_id, settings) in current.widget_settings {
            imported.widget_settings.entry(widget_id).or_insert(settings);
        }

        self.save(&mut imported)?;
        info!(
            "Imported {:?} document with {} apps and {} widget configurations",
            format,
            imported.app_infos.len(),
            imported.widget_settings.len()
        );
        Ok(imported)
    }

    pub fn import_from(&self, path: &Path) -> Result<StoreDocument> {
        let payload = fs::read_to_string(path)
            .with_context(|| format!("Failed to read import file: {}", path.display()))?;
        self.import(&payload)
    }
}

fn write_atomically(path: &Path, contents: &str) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, contents)
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
