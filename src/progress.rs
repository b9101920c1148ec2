//! Progress-callback trait for batch processing events.
//!
//! Attach an [`Arc<dyn BatchProgressCallback>`] with
//! [`crate::process::DocumentPipeline::with_progress`] to observe documents
//! as a batch works through them.
//!
//! # Why callbacks instead of channels?
//!
//! The callback is the least-invasive integration point: a host can forward
//! events to a terminal progress bar, a metrics counter or a queue without the
//! library knowing how it communicates. The trait is `Send + Sync` because
//! documents in a batch are processed concurrently.
//!
//! # Example
//!
//! ```rust
//! use ade_ingest::progress::BatchProgressCallback;
//! use ade_ingest::output::DocumentOutcome;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct Counter(AtomicUsize);
//!
//! impl BatchProgressCallback for Counter {
//!     fn on_document_complete(&self, outcome: &DocumentOutcome) {
//!         let done = self.0.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{done}: {} → {:?}", outcome.source, outcome.status);
//!     }
//! }
//! ```

use crate::output::DocumentOutcome;
use std::sync::Arc;

/// Called by the pipeline as a batch progresses.
///
/// All methods default to no-ops so implementors only override what they
/// need. `on_document_start` and `on_document_complete` may be called
/// concurrently for different keys.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before any document is touched.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called when work on `key` begins.
    fn on_document_start(&self, key: &str) {
        let _ = key;
    }

    /// Called with the final outcome of each document, whatever its status.
    fn on_document_complete(&self, outcome: &DocumentOutcome) {
        let _ = outcome;
    }

    /// Called once after every document has an outcome.
    fn on_batch_complete(&self, succeeded: usize, skipped: usize, failed: usize) {
        let _ = (succeeded, skipped, failed);
    }
}

/// Used by [`crate::process::DocumentPipeline`] until a callback is attached.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
