// In-memory collaborators for tests and dry runs.
//
// Each double records the calls it receives so tests can assert on how many
// service round-trips a run made.

use crate::error::ServiceError;
use crate::model::{DocumentRef, ExtractionResult, JobStatus, PiiEntity, TextBlock};
use crate::services::{EntityDetectionService, ObjectStore, TextExtractionService};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// =============================================================================
// Scripted Text Extraction
// =============================================================================

/// Extraction service that replays a fixed sequence of poll responses.
///
/// Once the script is exhausted the last response repeats.
pub struct ScriptedExtraction {
    script: Vec<ExtractionResult>,
    start_error: Option<String>,
    poll_error: Option<String>,
    started: Arc<Mutex<Vec<DocumentRef>>>,
    polls: Arc<Mutex<usize>>,
}

impl ScriptedExtraction {
    pub fn new(script: Vec<ExtractionResult>) -> Self {
        Self {
            script,
            start_error: None,
            poll_error: None,
            started: Arc::new(Mutex::new(Vec::new())),
            polls: Arc::new(Mutex::new(0)),
        }
    }

    /// `in_progress` polls report IN_PROGRESS, then SUCCEEDED with `blocks`.
    pub fn succeeding_after(in_progress: usize, blocks: Vec<TextBlock>) -> Self {
        Self::finishing_with(
            in_progress,
            ExtractionResult::new(JobStatus::Succeeded, blocks),
        )
    }

    /// `in_progress` polls report IN_PROGRESS, then FAILED with `message`.
    pub fn failing_after(in_progress: usize, message: &str) -> Self {
        Self::finishing_with(in_progress, ExtractionResult::failed(message))
    }

    /// `in_progress` polls report IN_PROGRESS, then `terminal` is returned.
    pub fn finishing_with(in_progress: usize, terminal: ExtractionResult) -> Self {
        let mut script = vec![ExtractionResult::pending(JobStatus::InProgress); in_progress];
        script.push(terminal);
        Self::new(script)
    }

    /// Reports IN_PROGRESS forever.
    pub fn never_finishing() -> Self {
        Self::new(vec![ExtractionResult::pending(JobStatus::InProgress)])
    }

    /// `start` fails with `message`.
    pub fn rejecting_start(message: &str) -> Self {
        let mut s = Self::never_finishing();
        s.start_error = Some(message.to_string());
        s
    }

    /// Every `poll` fails with `message`.
    pub fn with_poll_error(mut self, message: &str) -> Self {
        self.poll_error = Some(message.to_string());
        self
    }

    pub fn start_calls(&self) -> usize {
        self.started.lock().unwrap().len()
    }

    pub fn started_documents(&self) -> Vec<DocumentRef> {
        self.started.lock().unwrap().clone()
    }

    pub fn poll_calls(&self) -> usize {
        *self.polls.lock().unwrap()
    }
}

#[async_trait]
impl TextExtractionService for ScriptedExtraction {
    async fn start(&self, doc: &DocumentRef) -> Result<String, ServiceError> {
        if let Some(ref msg) = self.start_error {
            return Err(ServiceError::Other(msg.clone()));
        }
        let mut started = self.started.lock().unwrap();
        started.push(doc.clone());
        Ok(format!("job-{:04}", started.len()))
    }

    async fn poll(&self, _job_id: &str) -> Result<ExtractionResult, ServiceError> {
        if let Some(ref msg) = self.poll_error {
            return Err(ServiceError::Other(msg.clone()));
        }
        let mut polls = self.polls.lock().unwrap();
        let idx = (*polls).min(self.script.len().saturating_sub(1));
        *polls += 1;
        self.script
            .get(idx)
            .cloned()
            .ok_or_else(|| ServiceError::Other("empty poll script".into()))
    }
}

// =============================================================================
// Rule-based Entity Detection
// =============================================================================

struct Rule {
    needle: String,
    entity_type: String,
}

/// Detection service that reports an entity wherever a configured substring
/// occurs, with character offsets.
#[derive(Default)]
pub struct RuleDetection {
    rules: Vec<Rule>,
    delays: Vec<(String, Duration)>,
    error: Option<String>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl RuleDetection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag `needle` as an entity of `entity_type`.
    pub fn with_entity(mut self, needle: &str, entity_type: &str) -> Self {
        self.rules.push(Rule {
            needle: needle.to_string(),
            entity_type: entity_type.to_string(),
        });
        self
    }

    /// Delay the answer for any text containing `needle`.
    pub fn with_delay(mut self, needle: &str, delay: Duration) -> Self {
        self.delays.push((needle.to_string(), delay));
        self
    }

    /// Every call fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// `(text, language_code)` of every call, in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl EntityDetectionService for RuleDetection {
    async fn detect(
        &self,
        text: &str,
        language_code: &str,
    ) -> Result<Vec<PiiEntity>, ServiceError> {
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), language_code.to_string()));

        if let Some(ref msg) = self.error {
            return Err(ServiceError::Other(msg.clone()));
        }

        if let Some((_, delay)) = self.delays.iter().find(|(n, _)| text.contains(n.as_str())) {
            tokio::time::sleep(*delay).await;
        }

        let mut entities = Vec::new();
        for rule in &self.rules {
            for (byte_idx, _) in text.match_indices(rule.needle.as_str()) {
                let begin = text[..byte_idx].chars().count();
                let end = begin + rule.needle.chars().count();
                entities.push(
                    PiiEntity::new(rule.entity_type.clone(), rule.needle.clone())
                        .with_offsets(begin, end),
                );
            }
        }
        Ok(entities)
    }
}

// =============================================================================
// In-memory Object Store
// =============================================================================

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
}

/// Object store backed by a map keyed on `(bucket, key)`.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Arc<Mutex<BTreeMap<(String, String), StoredObject>>>,
    put_error: Option<String>,
    puts: Arc<Mutex<usize>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `put` fails with `message`.
    pub fn failing_puts(message: &str) -> Self {
        Self {
            put_error: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn object_string(&self, bucket: &str, key: &str) -> Option<String> {
        self.object(bucket, key)
            .map(|o| String::from_utf8_lossy(&o.body).into_owned())
    }

    /// All keys stored in `bucket`, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    pub fn put_calls(&self) -> usize {
        *self.puts.lock().unwrap()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ServiceError> {
        self.object(bucket, key)
            .map(|o| o.body)
            .ok_or_else(|| ServiceError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ServiceError> {
        *self.puts.lock().unwrap() += 1;
        if let Some(ref msg) = self.put_error {
            return Err(ServiceError::Other(msg.clone()));
        }
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rule_detection_reports_char_offsets() {
        let det = RuleDetection::new().with_entity("Zoë", "NAME");
        let found = det.detect("Née: Zoë", "en").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].span(), Some((5, 8)));
        assert_eq!(det.calls(), vec![("Née: Zoë".to_string(), "en".to_string())]);
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryObjectStore::new();
        store.put("b", "k", b"abc".to_vec(), "text/plain").await.unwrap();
        assert_eq!(store.get("b", "k").await.unwrap(), b"abc");
        assert!(matches!(
            store.get("b", "missing").await,
            Err(ServiceError::NotFound { .. })
        ));
        assert_eq!(store.keys("b"), vec!["k".to_string()]);
    }

    #[tokio::test]
    async fn scripted_extraction_repeats_last_response() {
        let svc = ScriptedExtraction::succeeding_after(1, vec![]);
        assert_eq!(svc.poll("j").await.unwrap().job_status, JobStatus::InProgress);
        assert_eq!(svc.poll("j").await.unwrap().job_status, JobStatus::Succeeded);
        assert_eq!(svc.poll("j").await.unwrap().job_status, JobStatus::Succeeded);
        assert_eq!(svc.poll_calls(), 3);
    }
}
