//! JSON-over-HTTP clients for the extraction and detection services.
//!
//! Both talk to a configurable base URL:
//!
//! | Call | Request | Response |
//! |------|---------|----------|
//! | start  | `POST {base}/jobs` `{"DocumentLocation":{"S3Object":{"Bucket","Name"}}}` | `{"JobId"}` |
//! | poll   | `GET {base}/jobs/{id}` | `{"JobStatus","StatusMessage"?,"Blocks"?}` |
//! | detect | `POST {base}/detect` `{"Text","LanguageCode"}` | `{"Entities":[…]}` |
//!
//! Non-2xx answers become [`ServiceError::Status`] with the response body;
//! nothing is retried here.

use crate::error::ServiceError;
use crate::model::{DocumentRef, ExtractionResult, PiiEntity};
use crate::services::{EntityDetectionService, TextExtractionService};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

fn build_client(timeout_secs: u64) -> Result<reqwest::Client, ServiceError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ServiceError::Transport(format!("failed to create HTTP client: {e}")))
}

fn join(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Turn a non-success response into [`ServiceError::Status`].
async fn check(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::Status {
        code: status.as_u16(),
        body,
    })
}

// ── Text extraction ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StartRequest<'a> {
    document_location: DocumentLocation<'a>,
}

#[derive(Debug, Serialize)]
struct DocumentLocation<'a> {
    #[serde(rename = "S3Object")]
    s3_object: S3Object<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct S3Object<'a> {
    bucket: &'a str,
    name: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StartResponse {
    job_id: String,
}

/// HTTP client for the text-extraction service.
#[derive(Debug, Clone)]
pub struct HttpTextExtraction {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTextExtraction {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self, ServiceError> {
        Ok(Self {
            base_url: base_url.into(),
            client: build_client(timeout_secs)?,
        })
    }
}

#[async_trait]
impl TextExtractionService for HttpTextExtraction {
    async fn start(&self, doc: &DocumentRef) -> Result<String, ServiceError> {
        let body = StartRequest {
            document_location: DocumentLocation {
                s3_object: S3Object {
                    bucket: &doc.bucket,
                    name: &doc.key,
                },
            },
        };
        let response = self
            .client
            .post(join(&self.base_url, "jobs"))
            .json(&body)
            .send()
            .await?;
        let parsed: StartResponse = check(response).await?.json().await?;
        debug!("Extraction service accepted job {}", parsed.job_id);
        Ok(parsed.job_id)
    }

    async fn poll(&self, job_id: &str) -> Result<ExtractionResult, ServiceError> {
        let encoded = urlencoding::encode(job_id);
        let response = self
            .client
            .get(join(&self.base_url, &format!("jobs/{encoded}")))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }
}

// ── Entity detection ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DetectRequest<'a> {
    text: &'a str,
    language_code: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DetectResponse {
    #[serde(default)]
    entities: Vec<PiiEntity>,
}

/// HTTP client for the entity-detection service.
#[derive(Debug, Clone)]
pub struct HttpEntityDetection {
    base_url: String,
    client: reqwest::Client,
}

impl HttpEntityDetection {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self, ServiceError> {
        Ok(Self {
            base_url: base_url.into(),
            client: build_client(timeout_secs)?,
        })
    }
}

#[async_trait]
impl EntityDetectionService for HttpEntityDetection {
    async fn detect(
        &self,
        text: &str,
        language_code: &str,
    ) -> Result<Vec<PiiEntity>, ServiceError> {
        let response = self
            .client
            .post(join(&self.base_url, "detect"))
            .json(&DetectRequest {
                text,
                language_code,
            })
            .send()
            .await?;
        let parsed: DetectResponse = check(response).await?.json().await?;
        Ok(parsed.entities)
    }
}
