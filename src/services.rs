//! Traits for the external collaborators a run talks to.
//!
//! These are infrastructure seams only. The pipeline stages in
//! [`crate::pipeline`] depend on the traits, never on a concrete client, so
//! a run can be driven by the HTTP clients in [`crate::clients`], the
//! filesystem store in [`crate::store`], or the doubles in
//! [`crate::testing`].

use crate::error::ServiceError;
use crate::model::{DocumentRef, ExtractionResult, PiiEntity};
use async_trait::async_trait;
use std::sync::Arc;

/// Durable key/value blob storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object's bytes.
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ServiceError>;

    /// Store `body` under `key`, replacing any existing object.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ServiceError>;
}

/// Asynchronous OCR.
#[async_trait]
pub trait TextExtractionService: Send + Sync {
    /// Start a text-detection job for the document; returns the job id.
    async fn start(&self, doc: &DocumentRef) -> Result<String, ServiceError>;

    /// Report the job's status, with blocks once it has succeeded.
    async fn poll(&self, job_id: &str) -> Result<ExtractionResult, ServiceError>;
}

/// PII entity detection over short strings.
#[async_trait]
pub trait EntityDetectionService: Send + Sync {
    async fn detect(&self, text: &str, language_code: &str)
        -> Result<Vec<PiiEntity>, ServiceError>;
}

/// The three collaborators of a run, as shareable handles.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn ObjectStore>,
    pub extraction: Arc<dyn TextExtractionService>,
    pub detection: Arc<dyn EntityDetectionService>,
}

impl Services {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        extraction: Arc<dyn TextExtractionService>,
        detection: Arc<dyn EntityDetectionService>,
    ) -> Self {
        Self {
            store,
            extraction,
            detection,
        }
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("store", &"<dyn ObjectStore>")
            .field("extraction", &"<dyn TextExtractionService>")
            .field("detection", &"<dyn EntityDetectionService>")
            .finish()
    }
}

/// Service names used when tagging [`crate::error::RedactError::ServiceFault`].
pub mod names {
    pub const OBJECT_STORE: &str = "object-store";
    pub const TEXT_EXTRACTION: &str = "text-extraction";
    pub const ENTITY_DETECTION: &str = "entity-detection";
}
