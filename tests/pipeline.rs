//! Integration tests for complete redaction runs.
//!
//! Every run here goes through the public entry points with the in-memory
//! service doubles from `pii_redactor::testing`, so no network access is
//! needed.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use pii_redactor::testing::{MemoryObjectStore, RuleDetection, ScriptedExtraction};
use pii_redactor::{
    run, run_document, DocumentRef, ExtractionResult, JobStatus, LocalObjectStore, MaskScope,
    RedactError, RedactionConfig, RedactionMode, RedactionProgressCallback, RunState, Services,
    TextBlock,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn notification(bucket: &str, key: &str) -> Value {
    json!({
        "Records": [{
            "eventName": "ObjectCreated:Put",
            "s3": {"bucket": {"name": bucket}, "object": {"key": key}}
        }]
    })
}

fn invoice_blocks() -> Vec<TextBlock> {
    vec![
        TextBlock::new(pii_redactor::BlockKind::Page, "").with_id("p1"),
        TextBlock::line("Name: John Smith").with_id("l1"),
        TextBlock::line("Invoice #4471").with_id("l2"),
    ]
}

fn config() -> RedactionConfig {
    RedactionConfig::builder()
        .poll_interval_ms(5)
        .build()
        .unwrap()
}

struct Harness {
    store: Arc<MemoryObjectStore>,
    extraction: Arc<ScriptedExtraction>,
    detection: Arc<RuleDetection>,
    services: Services,
}

/// Route library logs through the test harness; `RUST_LOG=debug` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn harness(extraction: ScriptedExtraction, detection: RuleDetection) -> Harness {
    init_tracing();
    let store = Arc::new(MemoryObjectStore::new());
    let extraction = Arc::new(extraction);
    let detection = Arc::new(detection);
    let services = Services::new(store.clone(), extraction.clone(), detection.clone());
    Harness {
        store,
        extraction,
        detection,
        services,
    }
}

fn stored_payload(store: &MemoryObjectStore, bucket: &str, key: &str) -> ExtractionResult {
    let body = store
        .object_string(bucket, key)
        .unwrap_or_else(|| panic!("nothing stored under {bucket}/{key}"));
    serde_json::from_str(&body).unwrap()
}

// ── Happy path ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn flagged_line_is_masked_and_stored() {
    let h = harness(
        ScriptedExtraction::succeeding_after(2, invoice_blocks()),
        RuleDetection::new().with_entity("John Smith", "NAME"),
    );

    let result = run(&notification("docs", "invoices/a.png"), &h.services, &config()).await;

    assert_eq!(result.status_code, 200, "{}", result.message);
    assert_eq!(result.state, RunState::Done);
    assert_eq!(result.output_key.as_deref(), Some("redacted/invoices/a.png"));
    assert!(result.message.contains("redacted/invoices/a.png"));
    assert_eq!(result.stats.poll_attempts, 3);
    assert_eq!(result.stats.lines_scanned, 2);
    assert_eq!(result.stats.lines_flagged, 1);

    let payload = stored_payload(&h.store, "docs", "redacted/invoices/a.png");
    assert_eq!(payload.job_status, JobStatus::Succeeded);
    assert_eq!(payload.blocks[1].text(), "*".repeat(16));
    assert_eq!(payload.blocks[2].text(), "Invoice #4471");

    let raw = h.store.object_string("docs", "redacted/invoices/a.png").unwrap();
    assert!(!raw.contains("John"));
    assert_eq!(
        h.store.object("docs", "redacted/invoices/a.png").unwrap().content_type,
        "application/json"
    );
}

#[tokio::test]
async fn every_line_is_sent_to_detection_in_order() {
    let h = harness(
        ScriptedExtraction::succeeding_after(0, invoice_blocks()),
        RuleDetection::new(),
    );

    let cfg = RedactionConfig::builder()
        .poll_interval_ms(5)
        .language_code("de")
        .build()
        .unwrap();
    run(&notification("docs", "a.png"), &h.services, &cfg).await;

    assert_eq!(
        h.detection.calls(),
        vec![
            ("Name: John Smith".to_string(), "de".to_string()),
            ("Invoice #4471".to_string(), "de".to_string()),
        ]
    );
}

#[tokio::test]
async fn clean_document_is_stored_unchanged() {
    let h = harness(
        ScriptedExtraction::succeeding_after(0, invoice_blocks()),
        RuleDetection::new(),
    );

    let result = run(&notification("docs", "a.png"), &h.services, &config()).await;

    assert!(result.is_success());
    let payload = stored_payload(&h.store, "docs", "redacted/a.png");
    assert_eq!(payload.blocks, invoice_blocks());
}

#[tokio::test]
async fn rerun_overwrites_with_identical_output() {
    let h = harness(
        ScriptedExtraction::succeeding_after(0, invoice_blocks()),
        RuleDetection::new().with_entity("John Smith", "NAME"),
    );
    let event = notification("docs", "a.png");

    run(&event, &h.services, &config()).await;
    let first = h.store.object_string("docs", "redacted/a.png").unwrap();
    run(&event, &h.services, &config()).await;
    let second = h.store.object_string("docs", "redacted/a.png").unwrap();

    assert_eq!(first, second);
    assert_eq!(h.store.put_calls(), 2);
    assert_eq!(h.store.keys("docs"), vec!["redacted/a.png".to_string()]);
}

#[tokio::test]
async fn encoded_key_is_decoded_before_submission() {
    let h = harness(
        ScriptedExtraction::succeeding_after(0, vec![]),
        RuleDetection::new(),
    );

    let result = run(&notification("docs", "scans/my+form%281%29.png"), &h.services, &config()).await;

    assert!(result.is_success());
    assert_eq!(
        h.extraction.started_documents(),
        vec![DocumentRef::new("docs", "scans/my form(1).png")]
    );
    assert_eq!(h.store.keys("docs"), vec!["redacted/scans/my form(1).png".to_string()]);
}

// ── Modes and scopes ─────────────────────────────────────────────────────────

#[tokio::test]
async fn serialized_mode_masks_the_same_line() {
    let h = harness(
        ScriptedExtraction::succeeding_after(0, invoice_blocks()),
        RuleDetection::new().with_entity("John Smith", "NAME"),
    );
    let cfg = RedactionConfig::builder()
        .poll_interval_ms(5)
        .redaction_mode(RedactionMode::Serialized)
        .build()
        .unwrap();

    let out = run_document(&DocumentRef::new("docs", "a.png"), &h.services, &cfg)
        .await
        .unwrap();

    let payload: ExtractionResult = serde_json::from_str(&out.redacted).unwrap();
    assert_eq!(payload.blocks[1].text(), "*".repeat(16));
    assert_eq!(payload.blocks[2].text(), "Invoice #4471");
}

#[tokio::test]
async fn entity_scope_keeps_the_label() {
    let h = harness(
        ScriptedExtraction::succeeding_after(0, invoice_blocks()),
        RuleDetection::new().with_entity("John Smith", "NAME"),
    );
    let cfg = RedactionConfig::builder()
        .poll_interval_ms(5)
        .mask_scope(MaskScope::Entity)
        .build()
        .unwrap();

    let out = run_document(&DocumentRef::new("docs", "a.png"), &h.services, &cfg)
        .await
        .unwrap();

    let payload: ExtractionResult = serde_json::from_str(&out.redacted).unwrap();
    assert_eq!(payload.blocks[1].text(), "Name: **********");
}

#[tokio::test]
async fn concurrent_detection_matches_sequential_output() {
    let blocks: Vec<TextBlock> = (0..20)
        .map(|i| {
            let text = if i % 3 == 0 {
                format!("Contact Jane Roe #{i}")
            } else {
                format!("Line {i}")
            };
            TextBlock::line(text).with_id(format!("l{i}"))
        })
        .collect();

    let mut outputs = Vec::new();
    for concurrency in [1, 8] {
        let h = harness(
            ScriptedExtraction::succeeding_after(0, blocks.clone()),
            RuleDetection::new().with_entity("Jane Roe", "NAME"),
        );
        let cfg = RedactionConfig::builder()
            .poll_interval_ms(5)
            .detection_concurrency(concurrency)
            .build()
            .unwrap();
        let out = run_document(&DocumentRef::new("docs", "a.png"), &h.services, &cfg)
            .await
            .unwrap();
        assert_eq!(out.stats.lines_flagged, 7);
        outputs.push(out.redacted);
    }

    assert_eq!(outputs[0], outputs[1]);
}

// ── Failures ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_extraction_reports_500_and_stores_nothing() {
    let h = harness(
        ScriptedExtraction::failing_after(1, "unsupported document format"),
        RuleDetection::new(),
    );

    let result = run(&notification("docs", "a.png"), &h.services, &config()).await;

    assert_eq!(result.status_code, 500);
    assert_eq!(result.state, RunState::FailedExtraction);
    assert!(result.message.contains("unsupported document format"), "{}", result.message);
    assert!(result.output_key.is_none());
    assert_eq!(h.detection.call_count(), 0);
    assert_eq!(h.store.put_calls(), 0);
    assert!(h.store.keys("docs").is_empty());
}

#[tokio::test]
async fn malformed_trigger_calls_no_service() {
    let h = harness(
        ScriptedExtraction::succeeding_after(0, invoice_blocks()),
        RuleDetection::new(),
    );

    let event = json!({"Records": [{"s3": {"bucket": {"name": "docs"}, "object": {}}}]});
    let result = run(&event, &h.services, &config()).await;

    assert_eq!(result.status_code, 400);
    assert_eq!(result.state, RunState::Error);
    assert_eq!(h.extraction.start_calls(), 0);
    assert_eq!(h.extraction.poll_calls(), 0);
    assert_eq!(h.detection.call_count(), 0);
    assert_eq!(h.store.put_calls(), 0);

    let response = result.to_lambda_response();
    assert_eq!(response["statusCode"], 400);
}

#[tokio::test]
async fn poll_budget_is_enforced() {
    let h = harness(ScriptedExtraction::never_finishing(), RuleDetection::new());
    let cfg = RedactionConfig::builder()
        .poll_interval_ms(1)
        .max_poll_attempts(4)
        .build()
        .unwrap();

    let err = run_document(&DocumentRef::new("docs", "a.png"), &h.services, &cfg)
        .await
        .unwrap_err();

    assert!(matches!(err, RedactError::PollTimeout { attempts: 4, .. }), "{err}");
    assert_eq!(h.extraction.start_calls(), 1);
    assert_eq!(h.extraction.poll_calls(), 4);
    assert_eq!(h.store.put_calls(), 0);
}

#[tokio::test]
async fn cancelled_run_stores_nothing() {
    let h = harness(ScriptedExtraction::never_finishing(), RuleDetection::new());
    let token = CancellationToken::new();
    token.cancel();
    let cfg = RedactionConfig::builder()
        .poll_interval_ms(5)
        .cancellation(token)
        .build()
        .unwrap();

    let result = run(&notification("docs", "a.png"), &h.services, &cfg).await;

    assert_eq!(result.status_code, 500);
    assert_eq!(result.state, RunState::Error);
    assert_eq!(result.stats.job_id.as_deref(), Some("job-0001"));
    assert_eq!(result.stats.poll_attempts, 0);
    assert_eq!(h.store.put_calls(), 0);
}

#[tokio::test]
async fn poll_fault_reports_500_and_stores_nothing() {
    let h = harness(
        ScriptedExtraction::succeeding_after(0, invoice_blocks()).with_poll_error("throttled"),
        RuleDetection::new(),
    );

    let result = run(&notification("docs", "a.png"), &h.services, &config()).await;

    assert_eq!(result.status_code, 500);
    assert_eq!(result.state, RunState::Error);
    assert!(result.message.contains("text-extraction poll"), "{}", result.message);
    assert!(result.message.contains("throttled"));
    assert_eq!(result.stats.job_id.as_deref(), Some("job-0001"));
    assert_eq!(h.extraction.start_calls(), 1);
    assert_eq!(h.detection.call_count(), 0);
    assert_eq!(h.store.put_calls(), 0);
}

#[tokio::test]
async fn start_fault_names_the_service() {
    let h = harness(
        ScriptedExtraction::rejecting_start("quota exceeded"),
        RuleDetection::new(),
    );

    let result = run(&notification("docs", "a.png"), &h.services, &config()).await;

    assert_eq!(result.status_code, 500);
    assert!(result.message.contains("text-extraction start"), "{}", result.message);
    assert!(result.message.contains("quota exceeded"));
}

// ── Progress events ──────────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl RedactionProgressCallback for Recorder {
    fn on_job_submitted(&self, doc: &DocumentRef, job_id: &str) {
        self.events.lock().unwrap().push(format!("submitted {doc} {job_id}"));
    }

    fn on_poll(&self, _job_id: &str, attempt: u32, status: JobStatus) {
        self.events.lock().unwrap().push(format!("poll {attempt} {status}"));
    }

    fn on_scan_start(&self, total_lines: usize) {
        self.events.lock().unwrap().push(format!("scan {total_lines}"));
    }

    fn on_line_scanned(&self, index: usize, _total: usize, entity_count: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("line {index} {entity_count}"));
    }

    fn on_run_complete(&self, success: bool, _message: &str) {
        self.events.lock().unwrap().push(format!("done {success}"));
    }
}

#[tokio::test]
async fn progress_events_follow_the_run() {
    let h = harness(
        ScriptedExtraction::succeeding_after(1, invoice_blocks()),
        RuleDetection::new().with_entity("John Smith", "NAME"),
    );
    let recorder = Arc::new(Recorder::default());
    let cfg = RedactionConfig::builder()
        .poll_interval_ms(5)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    run(&notification("docs", "a.png"), &h.services, &cfg).await;

    assert_eq!(
        *recorder.events.lock().unwrap(),
        vec![
            "submitted docs/a.png job-0001",
            "poll 1 IN_PROGRESS",
            "poll 2 SUCCEEDED",
            "scan 2",
            "line 0 1",
            "line 1 0",
            "done true",
        ]
    );
}

// ── Local object store ───────────────────────────────────────────────────────

#[tokio::test]
async fn local_store_receives_the_redacted_file() {
    let dir = tempfile::tempdir().unwrap();
    let services = Services::new(
        Arc::new(LocalObjectStore::new(dir.path())),
        Arc::new(ScriptedExtraction::succeeding_after(0, invoice_blocks())),
        Arc::new(RuleDetection::new().with_entity("John Smith", "NAME")),
    );

    let result = run(&notification("docs", "scans/my+form.png"), &services, &config()).await;
    assert!(result.is_success(), "{}", result.message);

    let path = dir.path().join("docs/redacted/scans/my form.png");
    let body = std::fs::read_to_string(&path).unwrap();
    let payload: ExtractionResult = serde_json::from_str(&body).unwrap();
    assert_eq!(payload.blocks[1].text(), "****************");
}
