//! Progress-callback trait for per-document batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive events
//! as the batch walks the input directory. The `rx2json` binary uses this to
//! drive its progress bar and the `Processing [i/N]` / `Skipping` /
//! `Saved to` lines; library callers can forward events anywhere.
//!
//! # Example
//!
//! ```rust
//! use edgequake_rx2json::{BatchConfig, BatchProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountSkips(AtomicUsize);
//!
//! impl BatchProgressCallback for CountSkips {
//!     fn on_document_skipped(&self, _index: usize, _total: usize, filename: &str) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("already done: {filename}");
//!     }
//! }
//!
//! let config = BatchConfig::builder()
//!     .progress_callback(Arc::new(CountSkips(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::BatchReport;
use std::path::Path;
use std::sync::Arc;

/// Called by the batch as it processes each document.
///
/// `index` is 1-based and counts every listed document, skipped ones
/// included, so `index/total` matches the position in the listing. All
/// methods default to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once after the input directory has been listed.
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// The document's output already exists; nothing will be sent.
    fn on_document_skipped(&self, index: usize, total: usize, filename: &str) {
        let _ = (index, total, filename);
    }

    /// Work on a document begins.
    fn on_document_start(&self, index: usize, total: usize, filename: &str, mime_type: &str) {
        let _ = (index, total, filename, mime_type);
    }

    /// A PDF has been rasterised into `total_pages` pages.
    fn on_pages_ready(&self, filename: &str, total_pages: usize) {
        let _ = (filename, total_pages);
    }

    /// A request for one page (per-page backend) is about to be sent.
    fn on_page_start(&self, filename: &str, page_number: usize, total_pages: usize) {
        let _ = (filename, page_number, total_pages);
    }

    /// The document's output file has been written.
    fn on_document_saved(&self, index: usize, total: usize, filename: &str, output_path: &Path) {
        let _ = (index, total, filename, output_path);
    }

    /// The document could not be prepared; no output was written.
    fn on_document_failed(&self, index: usize, total: usize, filename: &str, error: &str) {
        let _ = (index, total, filename, error);
    }

    /// Called once after every document has been visited.
    fn on_batch_complete(&self, report: &BatchReport) {
        let _ = report;
    }
}

/// A no-op implementation, the default when no callback is configured.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
