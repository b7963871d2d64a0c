//! # Ingestion Module
//!
//! Turns foreground-app change events into usage history.
//!
//! ## Architecture
//!
//! ```text
//! ingest/
//! ├── tracker.rs    # UsageTracker: event filtering + bucket increments
//! ├── debounce.rs   # DebouncedWriter: coalesced persistence writes
//! └── refresh.rs    # WidgetRefresher: redraw widgets on return home
//! ```

mod debounce;
mod refresh;
mod tracker;

pub use debounce::{DebouncedWriter, FlushFn};
pub use refresh::{HomeLaunchers, WidgetRefresher, KNOWN_HOME_LAUNCHERS};
pub use tracker::{IngestOutcome, UsageTracker};
