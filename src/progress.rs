//! Progress-callback trait for run events.
//!
//! Inject an [`Arc<dyn RedactionProgressCallback>`] via
//! [`crate::config::RedactionConfigBuilder::progress_callback`] to receive
//! events as the pipeline submits the extraction job, polls it, and scans
//! each line. The CLI uses it to drive a spinner; a service host could
//! forward the same events to a metrics sink or a job record.
//!
//! # Example
//!
//! ```rust
//! use pii_redactor::{RedactionConfig, RedactionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct FlagCounter {
//!     flagged: AtomicUsize,
//! }
//!
//! impl RedactionProgressCallback for FlagCounter {
//!     fn on_line_scanned(&self, _index: usize, _total: usize, entity_count: usize) {
//!         if entity_count > 0 {
//!             self.flagged.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//!
//! let counter = Arc::new(FlagCounter { flagged: AtomicUsize::new(0) });
//! let config = RedactionConfig::builder()
//!     .progress_callback(counter as Arc<dyn RedactionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::model::{DocumentRef, JobStatus};
use std::sync::Arc;

/// Called by the pipeline as a run advances.
///
/// All methods default to no-ops. With `detection_concurrency > 1`,
/// `on_line_scanned` may be called from several tasks at once, so shared
/// state needs `Mutex`/atomics.
pub trait RedactionProgressCallback: Send + Sync {
    /// The extraction job was accepted.
    fn on_job_submitted(&self, doc: &DocumentRef, job_id: &str) {
        let _ = (doc, job_id);
    }

    /// One status poll returned.
    ///
    /// # Arguments
    /// * `attempt`: 1-indexed poll number
    /// * `status`:  status reported by this poll
    fn on_poll(&self, job_id: &str, attempt: u32, status: JobStatus) {
        let _ = (job_id, attempt, status);
    }

    /// Scanning is about to start over `total_lines` lines.
    fn on_scan_start(&self, total_lines: usize) {
        let _ = total_lines;
    }

    /// One line came back from entity detection.
    ///
    /// # Arguments
    /// * `index`:        0-indexed position among the scanned lines
    /// * `total`:        number of lines to scan
    /// * `entity_count`: entities found; the line is flagged when > 0
    fn on_line_scanned(&self, index: usize, total: usize, entity_count: usize) {
        let _ = (index, total, entity_count);
    }

    /// The run finished, successfully or not.
    fn on_run_complete(&self, success: bool, message: &str) {
        let _ = (success, message);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl RedactionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::RedactionConfig`].
pub type ProgressCallback = Arc<dyn RedactionProgressCallback>;
