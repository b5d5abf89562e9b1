//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the orchestrator walks the document. Callers can forward them
//! to a channel, a log, or a terminal progress bar without the library
//! knowing how the host application communicates.
//!
//! Pages are processed sequentially, so callbacks are never invoked
//! concurrently for one run.
//!
//! # Example
//!
//! ```rust
//! use catalog_extract::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct ItemCounter {
//!     items: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for ItemCounter {
//!     fn on_page_complete(&self, _page: usize, _total: usize, items: usize) {
//!         self.items.fetch_add(items, Ordering::SeqCst);
//!     }
//! }
//!
//! let counter = Arc::new(ItemCounter { items: AtomicUsize::new(0) });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the orchestrator as it processes each page.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once after the document is loaded.
    ///
    /// `pages` is the number of pages that will be read (after `max_pages`).
    fn on_run_start(&self, pages: usize) {
        let _ = pages;
    }

    /// Called just before the extraction chain runs for a page.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called after the extraction chain for a page; `items` may be 0.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, items: usize) {
        let _ = (page_num, total_pages, items);
    }

    /// Called for a page that batch mode leaves out of the working set.
    fn on_page_skipped(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called once after the last page.
    fn on_run_complete(&self, processed_pages: usize, items: usize) {
        let _ = (processed_pages, items);
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
