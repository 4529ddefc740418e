//! Error types for the pii-redactor library.
//!
//! Two error types reflect the two layers a run talks to:
//!
//! * [`ServiceError`]: a single call to an external collaborator (object
//!   store, text extraction, entity detection) failed. Returned by the
//!   traits in [`crate::services`].
//!
//! * [`RedactError`]: **fatal** for the run. Every `ServiceError` surfaces
//!   as [`RedactError::ServiceFault`], tagged with the service and operation
//!   that raised it, and the coordinator turns the whole thing into a
//!   failure [`crate::output::RunResult`].
//!
//! Nothing is retried inside the library. Redelivery policy belongs to
//! whatever delivered the trigger.

use thiserror::Error;

/// All fatal errors for one redaction run.
#[derive(Debug, Error)]
pub enum RedactError {
    // ── Trigger errors ────────────────────────────────────────────────────
    /// The inbound notification is missing the bucket or key.
    #[error("Malformed trigger notification: {reason}")]
    TriggerMalformed { reason: String },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The text-extraction job reached the FAILED terminal state.
    #[error("Text extraction job '{job_id}' failed{}", detail_suffix(.message))]
    ExtractionFailed {
        job_id: String,
        message: Option<String>,
    },

    /// The job did not reach a terminal state within the poll budget.
    #[error("Text extraction job '{job_id}' still running after {attempts} polls ({elapsed_ms}ms)")]
    PollTimeout {
        job_id: String,
        attempts: u32,
        elapsed_ms: u64,
    },

    /// The caller cancelled the run while it was polling.
    #[error("Run cancelled while waiting for job '{job_id}' after {attempts} polls")]
    Cancelled { job_id: String, attempts: u32 },

    // ── Collaborator errors ───────────────────────────────────────────────
    /// A call to an external service raised a fault.
    #[error("{service} {operation} failed: {source}")]
    ServiceFault {
        service: &'static str,
        operation: &'static str,
        #[source]
        source: ServiceError,
    },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The redacted document could not be serialised.
    #[error("Failed to serialise redacted document: {0}")]
    Serialization(#[from] serde_json::Error),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RedactError {
    /// Wrap a collaborator error with the service/operation that raised it.
    pub fn service(service: &'static str, operation: &'static str, source: ServiceError) -> Self {
        RedactError::ServiceFault {
            service,
            operation,
            source,
        }
    }

    /// HTTP-style status code reported in the run result.
    ///
    /// Only a malformed trigger is the caller's fault; everything else is
    /// reported as a server-side failure.
    pub fn status_code(&self) -> u16 {
        match self {
            RedactError::TriggerMalformed { .. } | RedactError::InvalidConfig(_) => 400,
            _ => 500,
        }
    }
}

fn detail_suffix(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(": {m}"))
        .unwrap_or_default()
}

/// An error from one call to an external collaborator.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Connection refused, DNS failure, timeout, etc.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },

    /// The response body could not be decoded.
    #[error("undecodable response: {0}")]
    Decode(String),

    /// The requested object does not exist.
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Local filesystem error (local object store).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else a service implementation wants to report.
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ServiceError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            ServiceError::Status {
                code: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            ServiceError::Transport(e.to_string())
        }
    }
}
