//! Coalescing one-shot writes.
//!
//! Every [`DebouncedWriter::schedule`] call (re)arms a timer and supersedes
//! the previous one. The timer fires one window after the *first* request
//! still waiting, so a steady stream of requests cannot postpone the write
//! forever. The callback reads the live state at fire time, so nothing
//! scheduled while a write is pending is lost.

use anyhow::{Context, Result};
use log::{debug, error};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;

/// Callback performing the actual write
pub type FlushFn = Arc<dyn Fn() -> Result<()> + Send + Sync>;

struct Inner {
    window: Duration,
    flush: FlushFn,
    /// Bumped by every request; a timer only fires if it is still the latest
    generation: AtomicU64,
    /// When the oldest unwritten request arrived
    first_request: Mutex<Option<Instant>>,
    in_flight: AtomicBool,
    completed: AtomicU64,
}

impl Inner {
    fn first_request(&self) -> MutexGuard<'_, Option<Instant>> {
        self.first_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self) -> Result<()> {
        *self.first_request() = None;
        let result = (self.flush)();
        self.completed.fetch_add(1, Ordering::SeqCst);
        result
    }
}

pub struct DebouncedWriter {
    inner: Arc<Inner>,
    runtime: Handle,
}

impl std::fmt::Debug for DebouncedWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebouncedWriter")
            .field("window", &self.inner.window)
            .field("pending", &self.is_pending())
            .finish_non_exhaustive()
    }
}

impl DebouncedWriter {
    /// Create a writer bound to the current tokio runtime
    pub fn new(window: Duration, flush: FlushFn) -> Result<Self> {
        let runtime = Handle::try_current().context("Debounced writes need a tokio runtime")?;
        Ok(Self {
            inner: Arc::new(Inner {
                window,
                flush,
                generation: AtomicU64::new(0),
                first_request: Mutex::new(None),
                in_flight: AtomicBool::new(false),
                completed: AtomicU64::new(0),
            }),
            runtime,
        })
    }

    /// Request a write; supersedes any request still waiting out its window
    pub fn schedule(&self) {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let deadline = {
            let mut first_request = self.inner.first_request();
            *first_request.get_or_insert_with(Instant::now) + self.inner.window
        };

        let inner = Arc::clone(&self.inner);
        self.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            loop {
                if inner.generation.load(Ordering::SeqCst) != generation {
                    return;
                }
                if inner
                    .in_flight
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    break;
                }
                // Another write is still running; try again after it
                tokio::time::sleep(inner.window).await;
            }

            debug!("Debounced write firing");
            if let Err(e) = inner.run() {
                error!("Debounced write failed: {:#}", e);
            }
            inner.in_flight.store(false, Ordering::SeqCst);
        });
    }

    /// Cancel any waiting request and write immediately
    pub fn flush_now(&self) -> Result<()> {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.run()
    }

    /// A request is waiting for its window to pass
    pub fn is_pending(&self) -> bool {
        self.inner.first_request().is_some()
    }

    /// Number of flushes run so far, scheduled or immediate
    pub fn completed_writes(&self) -> u64 {
        self.inner.completed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_writer(window_ms: u64) -> (DebouncedWriter, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let flush: FlushFn = Arc::new(move || -> Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let writer = DebouncedWriter::new(Duration::from_millis(window_ms), flush).unwrap();
        (writer, calls)
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_within_window_coalesce() {
        let (writer, calls) = counting_writer(1_000);

        writer.schedule();
        tokio::time::sleep(Duration::from_millis(300)).await;
        writer.schedule();
        tokio::time::sleep(Duration::from_millis(300)).await;
        writer.schedule();
        assert!(writer.is_pending());

        // One window after the first request, not the last
        tokio::time::sleep(Duration::from_millis(399)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!writer.is_pending());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_steady_requests_still_write() {
        let (writer, calls) = counting_writer(1_000);

        // A request every 400ms for 4s; writes land at 1.0s, 2.2s and 3.4s
        for _ in 0..10 {
            writer.schedule();
            tokio::time::sleep(Duration::from_millis(400)).await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(writer.is_pending());

        tokio::time::sleep(Duration::from_millis(1_001)).await;
        assert!(!writer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_windows_write_separately() {
        let (writer, calls) = counting_writer(1_000);

        writer.schedule();
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        writer.schedule();
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(writer.completed_writes(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_now_cancels_pending_timer() {
        let (writer, calls) = counting_writer(1_000);

        writer.schedule();
        writer.flush_now().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!writer.is_pending());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_is_logged_not_fatal() {
        let flush: FlushFn = Arc::new(|| -> Result<()> { anyhow::bail!("disk full") });
        let writer = DebouncedWriter::new(Duration::from_millis(10), flush).unwrap();

        writer.schedule();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(writer.completed_writes(), 1);

        writer.schedule();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(writer.completed_writes(), 2);
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let flush: FlushFn = Arc::new(|| -> Result<()> { Ok(()) });
        assert!(DebouncedWriter::new(Duration::from_millis(10), flush).is_err());
    }
}
