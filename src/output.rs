//! Run results.
//!
//! [`RunResult`] is what a run hands back to whatever triggered it: a status
//! code plus a human-readable message naming the output key or the failure
//! cause. It never carries a partial artifact.

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Final state reached by the run's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Start,
    Submitted,
    Polling,
    Scanning,
    Redacting,
    Persisting,
    Done,
    FailedExtraction,
    Error,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Done | RunState::FailedExtraction | RunState::Error
        )
    }
}

/// Counters collected during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Extraction job id, once submitted.
    pub job_id: Option<String>,
    /// Status polls issued.
    pub poll_attempts: u32,
    /// Total blocks in the terminal payload.
    pub total_blocks: usize,
    /// `LINE` blocks scanned.
    pub lines_scanned: usize,
    /// Lines with at least one entity.
    pub lines_flagged: usize,
    /// Entities across all lines.
    pub entities_found: usize,
    /// Submit to terminal poll.
    pub extraction_duration_ms: u64,
    /// Detection pass.
    pub scan_duration_ms: u64,
    /// Whole run.
    pub total_duration_ms: u64,
}

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// 200 on success, 400 for a malformed trigger, 500 otherwise.
    pub status_code: u16,
    pub message: String,
    pub state: RunState,
    /// Key of the persisted artifact; only set on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
    pub stats: RunStats,
}

impl RunResult {
    pub fn success(output_key: String, stats: RunStats) -> Self {
        Self {
            status_code: 200,
            message: format!("Redacted document saved to {output_key}"),
            state: RunState::Done,
            output_key: Some(output_key),
            stats,
        }
    }

    pub fn failure(status_code: u16, state: RunState, message: String, stats: RunStats) -> Self {
        Self {
            status_code,
            message,
            state,
            output_key: None,
            stats,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }

    /// `{"statusCode": …, "body": "<json string>"}`, the shape a function
    /// host expects back from a handler.
    pub fn to_lambda_response(&self) -> serde_json::Value {
        json!({
            "statusCode": self.status_code,
            "body": serde_json::Value::String(self.message.clone()).to_string(),
        })
    }
}
