//! Job submission and status polling.
//!
//! Text extraction is asynchronous: `start` returns a job id immediately and
//! the blocks only become available once a later `poll` reports a terminal
//! status. This stage submits exactly one job and polls on a fixed interval.
//!
//! ## Bounds
//!
//! Polling stops at whichever comes first:
//!
//! * a terminal status (`SUCCEEDED` or `FAILED`);
//! * `max_poll_attempts` polls;
//! * `poll_deadline_secs` of wall-clock time since submission;
//! * the configured [`CancellationToken`] firing.
//!
//! A `FAILED` job is reported, not resubmitted. The status alone does not
//! say whether the cause was the input or the service.

use crate::config::RedactionConfig;
use crate::error::RedactError;
use crate::model::{DocumentRef, ExtractionJob, ExtractionResult, JobStatus};
use crate::services::{names, TextExtractionService};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What the poller observed once the job went terminal.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    /// The job with its terminal status.
    pub job: ExtractionJob,
    /// Full terminal payload; only present when the job succeeded.
    pub result: Option<ExtractionResult>,
    /// Status message reported alongside a failure, if any.
    pub status_message: Option<String>,
    /// Number of status polls issued.
    pub attempts: u32,
    /// Time from submission to the terminal poll.
    pub elapsed_ms: u64,
}

impl PollOutcome {
    pub fn succeeded(&self) -> bool {
        self.job.status == JobStatus::Succeeded
    }
}

/// Submit a text-extraction job for `doc` and poll it to a terminal status.
///
/// # Errors
/// * [`RedactError::ServiceFault`] if `start` or any `poll` call fails
/// * [`RedactError::PollTimeout`] if the attempt or time budget runs out
/// * [`RedactError::Cancelled`] if the config's cancellation token fires
pub async fn submit_and_await(
    extraction: &Arc<dyn TextExtractionService>,
    doc: &DocumentRef,
    config: &RedactionConfig,
) -> Result<PollOutcome, RedactError> {
    let job = submit(extraction, doc, config).await?;
    await_completion(extraction, job, config).await
}

/// Start exactly one extraction job for `doc`.
pub async fn submit(
    extraction: &Arc<dyn TextExtractionService>,
    doc: &DocumentRef,
    config: &RedactionConfig,
) -> Result<ExtractionJob, RedactError> {
    let job_id = extraction
        .start(doc)
        .await
        .map_err(|e| RedactError::service(names::TEXT_EXTRACTION, "start", e))?;
    info!("Started text extraction job {} for {}", job_id, doc);

    if let Some(ref cb) = config.progress_callback {
        cb.on_job_submitted(doc, &job_id);
    }
    Ok(ExtractionJob::submitted(job_id))
}

/// Poll an already submitted job until it is terminal or a bound is hit.
pub async fn await_completion(
    extraction: &Arc<dyn TextExtractionService>,
    mut job: ExtractionJob,
    config: &RedactionConfig,
) -> Result<PollOutcome, RedactError> {
    let started = Instant::now();
    let interval = config.poll_interval();
    let deadline = config.poll_deadline();
    let token = config.cancellation.as_ref();

    for attempt in 1..=config.max_poll_attempts {
        if token.is_some_and(CancellationToken::is_cancelled) {
            return Err(RedactError::Cancelled {
                job_id: job.job_id,
                attempts: attempt - 1,
            });
        }

        let response = extraction
            .poll(&job.job_id)
            .await
            .map_err(|e| RedactError::service(names::TEXT_EXTRACTION, "poll", e))?;
        job.status = response.job_status;
        info!("Job {}: status {} (poll {})", job.job_id, job.status, attempt);

        if let Some(ref cb) = config.progress_callback {
            cb.on_poll(&job.job_id, attempt, job.status);
        }

        if job.status.is_terminal() {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            debug!("Job {} terminal after {}ms", job.job_id, elapsed_ms);
            let status_message = response.status_message.clone();
            let result = (job.status == JobStatus::Succeeded).then_some(response);
            return Ok(PollOutcome {
                job,
                result,
                status_message,
                attempts: attempt,
                elapsed_ms,
            });
        }

        if attempt == config.max_poll_attempts {
            break;
        }

        if let Some(limit) = deadline {
            if started.elapsed() + interval > limit {
                warn!(
                    "Job {}: next poll would pass the {}s deadline",
                    job.job_id,
                    limit.as_secs()
                );
                return Err(timeout(job.job_id, attempt, started));
            }
        }

        if !wait(interval, token).await {
            warn!("Job {}: cancelled while polling", job.job_id);
            return Err(RedactError::Cancelled {
                job_id: job.job_id,
                attempts: attempt,
            });
        }
    }

    warn!(
        "Job {}: no terminal status after {} polls",
        job.job_id, config.max_poll_attempts
    );
    Err(timeout(job.job_id, config.max_poll_attempts, started))
}

fn timeout(job_id: String, attempts: u32, started: Instant) -> RedactError {
    RedactError::PollTimeout {
        job_id,
        attempts,
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}

/// Sleep for `interval`; returns `false` if cancelled first.
async fn wait(interval: Duration, token: Option<&CancellationToken>) -> bool {
    match token {
        Some(token) => tokio::select! {
            _ = sleep(interval) => true,
            _ = token.cancelled() => false,
        },
        None => {
            sleep(interval).await;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TextBlock;
    use crate::testing::ScriptedExtraction;

    fn doc() -> DocumentRef {
        DocumentRef::new("docs", "scan.png")
    }

    fn config(max_attempts: u32) -> RedactionConfig {
        RedactionConfig::builder()
            .poll_interval_ms(5_000)
            .max_poll_attempts(max_attempts)
            .poll_deadline_secs(None)
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_succeeded() {
        let svc = Arc::new(ScriptedExtraction::succeeding_after(
            2,
            vec![TextBlock::line("hello")],
        ));
        let extraction: Arc<dyn TextExtractionService> = svc.clone();

        let outcome = submit_and_await(&extraction, &doc(), &config(10))
            .await
            .unwrap();

        assert!(outcome.succeeded());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.result.unwrap().blocks.len(), 1);
        assert_eq!(svc.start_calls(), 1, "exactly one job per run");
        assert_eq!(svc.poll_calls(), 3);
        // Two waits of 5s between three polls.
        assert!(
            (10_000..10_100).contains(&outcome.elapsed_ms),
            "elapsed {}ms",
            outcome.elapsed_ms
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_job_returns_status_only() {
        let svc = Arc::new(ScriptedExtraction::failing_after(1, "bad input"));
        let extraction: Arc<dyn TextExtractionService> = svc.clone();

        let outcome = submit_and_await(&extraction, &doc(), &config(10))
            .await
            .unwrap();

        assert_eq!(outcome.job.status, JobStatus::Failed);
        assert!(outcome.result.is_none());
        assert_eq!(outcome.status_message.as_deref(), Some("bad input"));
        assert_eq!(svc.start_calls(), 1, "failed jobs are not resubmitted");
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_budget_bounds_polling() {
        let svc = Arc::new(ScriptedExtraction::never_finishing());
        let extraction: Arc<dyn TextExtractionService> = svc.clone();

        let err = submit_and_await(&extraction, &doc(), &config(4))
            .await
            .unwrap_err();

        match err {
            RedactError::PollTimeout { attempts, .. } => assert_eq!(attempts, 4),
            other => panic!("expected PollTimeout, got {other:?}"),
        }
        assert_eq!(svc.poll_calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_bounds_polling() {
        let svc = Arc::new(ScriptedExtraction::never_finishing());
        let extraction: Arc<dyn TextExtractionService> = svc.clone();
        let cfg = RedactionConfig::builder()
            .poll_interval_ms(5_000)
            .max_poll_attempts(1_000)
            .poll_deadline_secs(Some(12))
            .build()
            .unwrap();

        let err = submit_and_await(&extraction, &doc(), &cfg).await.unwrap_err();

        assert!(matches!(err, RedactError::PollTimeout { .. }));
        // Polls at t=0, 5, 10; a fourth at t=15 would pass the deadline.
        assert_eq!(svc.poll_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_polling() {
        let svc = Arc::new(ScriptedExtraction::never_finishing());
        let extraction: Arc<dyn TextExtractionService> = svc.clone();
        let token = CancellationToken::new();
        let cfg = RedactionConfig::builder()
            .max_poll_attempts(1_000)
            .cancellation(token.clone())
            .build()
            .unwrap();

        let canceller = tokio::spawn(async move {
            sleep(Duration::from_secs(7)).await;
            token.cancel();
        });

        let err = submit_and_await(&extraction, &doc(), &cfg).await.unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, RedactError::Cancelled { attempts: 2, .. }), "{err}");
        assert_eq!(svc.poll_calls(), 2);
    }

    #[tokio::test]
    async fn poll_fault_is_service_fault() {
        let svc = Arc::new(ScriptedExtraction::never_finishing().with_poll_error("throttled"));
        let extraction: Arc<dyn TextExtractionService> = svc.clone();

        let err = submit_and_await(&extraction, &doc(), &config(3))
            .await
            .unwrap_err();

        assert!(
            matches!(err, RedactError::ServiceFault { operation: "poll", .. }),
            "{err}"
        );
        assert_eq!(svc.start_calls(), 1);
    }

    #[tokio::test]
    async fn start_fault_is_service_fault() {
        let extraction: Arc<dyn TextExtractionService> =
            Arc::new(ScriptedExtraction::rejecting_start("quota exceeded"));

        let err = submit_and_await(&extraction, &doc(), &config(3))
            .await
            .unwrap_err();

        match err {
            RedactError::ServiceFault {
                service, operation, ..
            } => {
                assert_eq!(service, names::TEXT_EXTRACTION);
                assert_eq!(operation, "start");
            }
            other => panic!("expected ServiceFault, got {other:?}"),
        }
    }
}
