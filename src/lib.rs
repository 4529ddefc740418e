//! # pii-redactor
//!
//! Mask personally identifiable information in text extracted from stored
//! documents.
//!
//! A run is triggered by a storage notification naming a bucket and key.
//! The document goes to an asynchronous text-extraction service, the
//! resulting `LINE` blocks are checked by an entity-detection service, and
//! every flagged line is replaced with a same-length run of `*` in the
//! extraction payload. The redacted payload is stored back under
//! `redacted/<original key>` in the same bucket.
//!
//! ## Pipeline Overview
//!
//! ```text
//! notification
//!  │
//!  ├─ 1. Trigger   extract (bucket, key), URL-decode the key
//!  ├─ 2. Extract   start job, poll until SUCCEEDED / FAILED (bounded)
//!  ├─ 3. Scan      detect entities per LINE block, order preserved
//!  ├─ 4. Redact    mask flagged lines in the payload
//!  └─ 5. Persist   write redacted/<key>
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pii_redactor::{run, HttpEntityDetection, HttpTextExtraction, LocalObjectStore};
//! use pii_redactor::{RedactionConfig, Services};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RedactionConfig::default();
//!     let services = Services::new(
//!         Arc::new(LocalObjectStore::new("./buckets")),
//!         Arc::new(HttpTextExtraction::new("http://localhost:9000", 30)?),
//!         Arc::new(HttpEntityDetection::new("http://localhost:9001", 30)?),
//!     );
//!     let event = serde_json::json!({
//!         "Records": [{"s3": {"bucket": {"name": "docs"}, "object": {"key": "scan.png"}}}]
//!     });
//!     let result = run(&event, &services, &config).await;
//!     println!("{}", result.to_lambda_response());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pii-redact` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod clients;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod services;
pub mod store;
pub mod stream;
pub mod testing;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use clients::{HttpEntityDetection, HttpTextExtraction};
pub use config::{MaskScope, RedactionConfig, RedactionConfigBuilder, RedactionMode};
pub use coordinator::{run, run_document, run_str, run_sync, scan_document, RunOutput};
pub use error::{RedactError, ServiceError};
pub use model::{
    BlockKind, DocumentRef, ExtractionJob, ExtractionResult, JobStatus, PiiEntity, Relationship,
    TextBlock,
};
pub use output::{RunResult, RunState, RunStats};
pub use pipeline::redactor::{mask, redact};
pub use pipeline::scanner::ScannedLine;
pub use progress::{NoopProgressCallback, ProgressCallback, RedactionProgressCallback};
pub use services::{EntityDetectionService, ObjectStore, Services, TextExtractionService};
pub use store::LocalObjectStore;
pub use stream::{scan_stream, LineStream};
