//! Progress-callback trait for per-page ingestion events.
//!
//! Inject an [`Arc<dyn IngestProgressCallback>`] via
//! [`crate::config::IngestConfigBuilder::progress_callback`] to receive
//! events as [`crate::ingest::split_document`] and
//! [`crate::ingest::extract_blocks`] walk through a document.
//!
//! Callers can forward events to a channel, a log, or a terminal progress
//! bar without the library knowing how the host application reports them.
//!
//! # Example
//!
//! ```rust
//! use edgequake_docprep::{IngestConfig, IngestProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl IngestProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, _page_num: usize, _total_pages: usize, _detail: &str) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//! let config = IngestConfig::builder()
//!     .progress_callback(counter as Arc<dyn IngestProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the ingestion stage as it processes each page.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Rendering runs on a blocking worker thread, so
/// implementations must be `Send + Sync`.
pub trait IngestProgressCallback: Send + Sync {
    /// Called once after the document is opened.
    fn on_ingest_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called before a page is rendered.
    ///
    /// * `page_num` — 1-indexed page number of the input document
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page is done.
    ///
    /// * `detail` — short human-readable outcome (`"split"`, `"whole"`,
    ///   `"12 blocks"`)
    fn on_page_complete(&self, page_num: usize, total_pages: usize, detail: &str) {
        let _ = (page_num, total_pages, detail);
    }

    /// Called when a page hit a non-fatal error.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after all pages have been attempted.
    fn on_ingest_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl IngestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::IngestConfig`].
pub type ProgressCallback = Arc<dyn IngestProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        started_total: AtomicUsize,
        starts: AtomicUsize,
        details: Mutex<Vec<String>>,
        errors: AtomicUsize,
        succeeded: AtomicUsize,
    }

    impl IngestProgressCallback for TrackingCallback {
        fn on_ingest_start(&self, total_pages: usize) {
            self.started_total.store(total_pages, Ordering::SeqCst);
        }

        fn on_page_start(&self, _page_num: usize, _total_pages: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_complete(&self, _page_num: usize, _total_pages: usize, detail: &str) {
            self.details.lock().unwrap().push(detail.to_string());
        }

        fn on_page_error(&self, _page_num: usize, _total_pages: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_ingest_complete(&self, _total_pages: usize, success_count: usize) {
            self.succeeded.store(success_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_ingest_start(2);
        cb.on_page_start(1, 2);
        cb.on_page_complete(1, 2, "split");
        cb.on_page_error(2, 2, "no text layer");
        cb.on_ingest_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_ingest_start(3);
        tracker.on_page_start(1, 3);
        tracker.on_page_complete(1, 3, "split");
        tracker.on_page_start(2, 3);
        tracker.on_page_complete(2, 3, "whole");
        tracker.on_page_start(3, 3);
        tracker.on_page_error(3, 3, "text layer missing");
        tracker.on_ingest_complete(3, 2);

        assert_eq!(tracker.started_total.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 3);
        assert_eq!(*tracker.details.lock().unwrap(), vec!["split", "whole"]);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.succeeded.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_ingest_start(10);
        cb.on_page_complete(1, 10, "3 blocks");
    }
}
