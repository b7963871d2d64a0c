//! # Store Module
//!
//! The persisted document, its on-disk home, and the readers for every
//! payload generation that has shipped.
//!
//! ## Architecture
//!
//! ```text
//! store/
//! ├── document.rs   # StoreDocument, WidgetSettings, mode enums
//! ├── legacy.rs     # format detection chain + forward migrations
//! ├── lenient.rs    # per-field deserialization fallbacks
//! └── storage.rs    # DataStore: file I/O, read cache, backups, decay
//! ```

mod document;
mod legacy;
pub(crate) mod lenient;
mod storage;

pub use document::{
    AppIconStyle, FilterMode, RecommendMode, SortMode, SortingDirection, StoreDocument,
    WidgetSettings, CURRENT_DATA_VERSION, DEFAULT_WIDGET_ID,
};
pub use legacy::{migrate, parse_document, parse_legacy_app_entry, SourceFormat};
pub use storage::{
    DataStore, SaveReport, DEFAULT_CACHE_TTL_MS, DEFAULT_DECAY_INTERVAL_DAYS, STORE_FILE_NAME,
};
