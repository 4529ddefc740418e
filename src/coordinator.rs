//! Run coordination: trigger → poll → scan → redact → persist.
//!
//! A run walks the state machine
//!
//! ```text
//! Start ─▶ Submitted ─▶ Polling ─┬─▶ Scanning ─▶ Redacting ─▶ Persisting ─▶ Done
//!                                ├─▶ FailedExtraction
//!                                └─▶ Error            (any fault, any stage)
//! ```
//!
//! [`run`] is the handler-style entry point: it never returns `Err`, it
//! folds every failure into a [`RunResult`]. [`run_document`] is the
//! fallible core for library callers that already hold a [`DocumentRef`].
//! In both, the artifact is written only after every earlier stage
//! succeeded, so a failed run never leaves a partial object behind.

use crate::config::RedactionConfig;
use crate::error::RedactError;
use crate::model::{DocumentRef, ExtractionResult};
use crate::output::{RunResult, RunState, RunStats};
use crate::pipeline::{poller, redactor, scanner, trigger};
use crate::pipeline::scanner::ScannedLine;
use crate::services::{names, Services};
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// A successful run's artifact.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Key the redacted document was written under.
    pub output_key: String,
    /// The persisted redacted document.
    pub redacted: String,
    pub stats: RunStats,
}

/// Handle one storage notification end to end.
///
/// # Returns
/// * 200 with the output key once the redacted document is stored
/// * 400 if the notification lacks a bucket or key (no service is called)
/// * 500 if the extraction job failed or any stage raised a fault
pub async fn run(event: &Value, services: &Services, config: &RedactionConfig) -> RunResult {
    let result = match trigger::parse_notification(event) {
        Ok(doc) => {
            let mut run = Run::new(services, config);
            let outcome = run.execute(&doc).await;
            match outcome {
                Ok(out) => RunResult::success(out.output_key, out.stats),
                Err(e) => run.into_failure(e),
            }
        }
        Err(e) => {
            warn!("Rejecting trigger: {}", e);
            RunResult::failure(e.status_code(), RunState::Error, e.to_string(), RunStats::default())
        }
    };

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(result.is_success(), &result.message);
    }
    result
}

/// [`run`] for a notification held as JSON text.
pub async fn run_str(event: &str, services: &Services, config: &RedactionConfig) -> RunResult {
    match serde_json::from_str::<Value>(event) {
        Ok(v) => run(&v, services, config).await,
        Err(e) => {
            let e = RedactError::TriggerMalformed {
                reason: format!("notification is not valid JSON: {e}"),
            };
            RunResult::failure(e.status_code(), RunState::Error, e.to_string(), RunStats::default())
        }
    }
}

/// Redact one document and store the result.
///
/// # Errors
/// * [`RedactError::ExtractionFailed`] if the job ends in `FAILED`
/// * [`RedactError::PollTimeout`] / [`RedactError::Cancelled`] from polling
/// * [`RedactError::ServiceFault`] if any service call fails
pub async fn run_document(
    doc: &DocumentRef,
    services: &Services,
    config: &RedactionConfig,
) -> Result<RunOutput, RedactError> {
    Run::new(services, config).execute(doc).await
}

/// Synchronous wrapper around [`run`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_sync(event: &Value, services: &Services, config: &RedactionConfig) -> RunResult {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt.block_on(run(event, services, config)),
        Err(e) => {
            let e = RedactError::Internal(format!("Failed to create tokio runtime: {e}"));
            RunResult::failure(e.status_code(), RunState::Error, e.to_string(), RunStats::default())
        }
    }
}

/// Extract and scan a document without redacting or storing anything.
pub async fn scan_document(
    doc: &DocumentRef,
    services: &Services,
    config: &RedactionConfig,
) -> Result<Vec<ScannedLine>, RedactError> {
    let mut run = Run::new(services, config);
    let result = run.extract(doc).await?;
    run.scan(&result).await
}

// ── Internal state machine ───────────────────────────────────────────────

struct Run<'a> {
    services: &'a Services,
    config: &'a RedactionConfig,
    state: RunState,
    stats: RunStats,
    started: Instant,
}

impl<'a> Run<'a> {
    fn new(services: &'a Services, config: &'a RedactionConfig) -> Self {
        Self {
            services,
            config,
            state: RunState::Start,
            stats: RunStats::default(),
            started: Instant::now(),
        }
    }

    fn advance(&mut self, next: RunState) {
        debug_assert!(
            !self.state.is_terminal(),
            "run already ended in {:?}",
            self.state
        );
        debug!("Run state {:?} → {:?}", self.state, next);
        self.state = next;
    }

    async fn execute(&mut self, doc: &DocumentRef) -> Result<RunOutput, RedactError> {
        info!("Starting redaction run for {}", doc);

        // ── Step 1: Extract text ─────────────────────────────────────────
        let result = self.extract(doc).await?;

        // ── Step 2: Scan lines ───────────────────────────────────────────
        let lines = self.scan(&result).await?;

        // ── Step 3: Redact ───────────────────────────────────────────────
        self.advance(RunState::Redacting);
        let redacted = redactor::render_redacted(&result, &lines, self.config)?;

        // ── Step 4: Persist ──────────────────────────────────────────────
        self.advance(RunState::Persisting);
        let output_key = doc.redacted_key(&self.config.output_prefix);
        self.services
            .store
            .put(
                &doc.bucket,
                &output_key,
                redacted.clone().into_bytes(),
                "application/json",
            )
            .await
            .map_err(|e| RedactError::service(names::OBJECT_STORE, "put", e))?;

        self.advance(RunState::Done);
        self.stats.total_duration_ms = self.started.elapsed().as_millis() as u64;
        info!(
            "Run complete: {}/{} lines flagged, saved {}/{} in {}ms",
            self.stats.lines_flagged,
            self.stats.lines_scanned,
            doc.bucket,
            output_key,
            self.stats.total_duration_ms
        );

        Ok(RunOutput {
            output_key,
            redacted,
            stats: self.stats.clone(),
        })
    }

    /// Submit and poll; a FAILED job becomes [`RedactError::ExtractionFailed`].
    async fn extract(&mut self, doc: &DocumentRef) -> Result<ExtractionResult, RedactError> {
        let job = poller::submit(&self.services.extraction, doc, self.config).await?;
        self.stats.job_id = Some(job.job_id.clone());
        self.advance(RunState::Submitted);

        self.advance(RunState::Polling);
        let outcome =
            match poller::await_completion(&self.services.extraction, job, self.config).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    if let RedactError::PollTimeout { attempts, .. }
                    | RedactError::Cancelled { attempts, .. } = &e
                    {
                        self.stats.poll_attempts = *attempts;
                    }
                    return Err(e);
                }
            };

        self.stats.poll_attempts = outcome.attempts;
        self.stats.extraction_duration_ms = outcome.elapsed_ms;

        match outcome.result {
            Some(result) => {
                debug!(
                    "Job {} returned {} blocks, {} lines",
                    outcome.job.job_id,
                    result.blocks.len(),
                    result.line_count()
                );
                Ok(result)
            }
            None => Err(RedactError::ExtractionFailed {
                job_id: outcome.job.job_id,
                message: outcome.status_message,
            }),
        }
    }

    async fn scan(&mut self, result: &ExtractionResult) -> Result<Vec<ScannedLine>, RedactError> {
        self.advance(RunState::Scanning);
        let scan_start = Instant::now();
        self.stats.total_blocks = result.blocks.len();

        let lines = scanner::scan(&self.services.detection, &result.blocks, self.config).await?;

        self.stats.lines_scanned = lines.len();
        self.stats.lines_flagged = lines.iter().filter(|l| l.is_flagged()).count();
        self.stats.entities_found = lines.iter().map(|l| l.entities.len()).sum();
        self.stats.scan_duration_ms = scan_start.elapsed().as_millis() as u64;
        debug!(
            "Scanned {} lines, {} flagged, {} entities",
            self.stats.lines_scanned, self.stats.lines_flagged, self.stats.entities_found
        );
        Ok(lines)
    }

    fn into_failure(mut self, e: RedactError) -> RunResult {
        let state = match e {
            RedactError::ExtractionFailed { .. } => RunState::FailedExtraction,
            _ => RunState::Error,
        };
        self.advance(state);
        self.stats.total_duration_ms = self.started.elapsed().as_millis() as u64;
        error!("Run failed: {}", e);
        RunResult::failure(e.status_code(), state, e.to_string(), self.stats)
    }
}
