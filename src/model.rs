//! Domain types shared by every pipeline stage.
//!
//! The serialised field names (`JobStatus`, `Blocks`, `BlockType`, `Text`, …)
//! follow the payload the text-extraction service returns, so a redacted
//! [`ExtractionResult`] can be written back in the same shape it arrived in.
//! Fields this crate does not interpret are kept in `extra` maps and survive
//! a deserialise → redact → serialise round trip untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Default prefix for redacted output keys.
pub const DEFAULT_OUTPUT_PREFIX: &str = "redacted/";

// ── DocumentRef ──────────────────────────────────────────────────────────

/// Location of the source object that triggered a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    pub bucket: String,
    pub key: String,
}

impl DocumentRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Output key for the redacted artifact, e.g. `redacted/scans/a.pdf`.
    pub fn redacted_key(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.key)
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

// ── Job status ───────────────────────────────────────────────────────────

/// Status of an asynchronous text-extraction job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Submitted,
    InProgress,
    /// `PARTIAL_SUCCESS` still carries usable blocks, so it counts as success.
    #[serde(alias = "PARTIAL_SUCCESS")]
    Succeeded,
    Failed,
}

impl JobStatus {
    /// `true` once no further transition can happen.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Submitted => "SUBMITTED",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A submitted extraction job and its last observed status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionJob {
    pub job_id: String,
    pub status: JobStatus,
}

impl ExtractionJob {
    pub fn submitted(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Submitted,
        }
    }
}

// ── Blocks ───────────────────────────────────────────────────────────────

/// Kind of a recognised text block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BlockKind {
    Page,
    Line,
    Word,
    /// Any block type this crate does not interpret (tables, key-values, …).
    Other(String),
}

impl From<String> for BlockKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "PAGE" => BlockKind::Page,
            "LINE" => BlockKind::Line,
            "WORD" => BlockKind::Word,
            _ => BlockKind::Other(s),
        }
    }
}

impl From<BlockKind> for String {
    fn from(k: BlockKind) -> Self {
        match k {
            BlockKind::Page => "PAGE".into(),
            BlockKind::Line => "LINE".into(),
            BlockKind::Word => "WORD".into(),
            BlockKind::Other(s) => s,
        }
    }
}

/// Link from one block to others (`CHILD` links a line to its words).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "Ids", default)]
    pub ids: Vec<String>,
}

/// One unit of recognised text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    #[serde(rename = "Id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "BlockType")]
    pub kind: BlockKind,

    /// `None` when the payload carried no `Text` field at all.
    #[serde(rename = "Text", default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(rename = "Confidence", default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    #[serde(rename = "Page", default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    #[serde(rename = "Relationships", default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<Relationship>,

    /// Geometry and any other fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TextBlock {
    /// Build a block with only a kind and text; empty text leaves `Text` unset.
    pub fn new(kind: BlockKind, text: impl Into<String>) -> Self {
        let text: String = text.into();
        Self {
            id: None,
            kind,
            text: (!text.is_empty()).then_some(text),
            confidence: None,
            page: None,
            relationships: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn line(text: impl Into<String>) -> Self {
        Self::new(BlockKind::Line, text)
    }

    pub fn word(text: impl Into<String>) -> Self {
        Self::new(BlockKind::Word, text)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Attach `CHILD` links to the given block ids.
    pub fn with_children<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relationships.push(Relationship {
            kind: "CHILD".into(),
            ids: ids.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// The block's text, or `""` if it has none.
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }

    pub fn is_line(&self) -> bool {
        self.kind == BlockKind::Line
    }

    /// Ids of the blocks this block links to with `CHILD`.
    pub fn child_ids(&self) -> impl Iterator<Item = &str> {
        self.relationships
            .iter()
            .filter(|r| r.kind == "CHILD")
            .flat_map(|r| r.ids.iter().map(String::as_str))
    }
}

// ── Terminal payload ─────────────────────────────────────────────────────

/// Full payload of a polled job.
///
/// `blocks` is only populated once the job has succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    #[serde(rename = "JobStatus")]
    pub job_status: JobStatus,

    #[serde(rename = "StatusMessage", default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,

    #[serde(rename = "DocumentMetadata", default, skip_serializing_if = "Option::is_none")]
    pub document_metadata: Option<Value>,

    #[serde(rename = "Blocks", default)]
    pub blocks: Vec<TextBlock>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExtractionResult {
    pub fn new(job_status: JobStatus, blocks: Vec<TextBlock>) -> Self {
        Self {
            job_status,
            status_message: None,
            document_metadata: None,
            blocks,
            extra: Map::new(),
        }
    }

    /// Payload for a job that has not finished yet.
    pub fn pending(job_status: JobStatus) -> Self {
        Self::new(job_status, Vec::new())
    }

    pub fn failed(message: impl Into<String>) -> Self {
        let mut r = Self::new(JobStatus::Failed, Vec::new());
        r.status_message = Some(message.into());
        r
    }

    /// Number of `LINE` blocks in the payload.
    pub fn line_count(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_line()).count()
    }
}

// ── Entities ─────────────────────────────────────────────────────────────

/// A PII entity found in one line.
///
/// Offsets are character offsets into the scanned text, when the detection
/// service reports them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiiEntity {
    #[serde(rename = "Type")]
    pub entity_type: String,

    #[serde(rename = "Text", default, skip_serializing_if = "String::is_empty")]
    pub text: String,

    #[serde(rename = "Score", default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    #[serde(rename = "BeginOffset", default, skip_serializing_if = "Option::is_none")]
    pub begin_offset: Option<usize>,

    #[serde(rename = "EndOffset", default, skip_serializing_if = "Option::is_none")]
    pub end_offset: Option<usize>,
}

impl PiiEntity {
    pub fn new(entity_type: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            text: text.into(),
            score: None,
            begin_offset: None,
            end_offset: None,
        }
    }

    pub fn with_offsets(mut self, begin: usize, end: usize) -> Self {
        self.begin_offset = Some(begin);
        self.end_offset = Some(end);
        self
    }

    /// Character span `[begin, end)` when both offsets are known and ordered.
    pub fn span(&self) -> Option<(usize, usize)> {
        match (self.begin_offset, self.end_offset) {
            (Some(b), Some(e)) if b < e => Some((b, e)),
            _ => None,
        }
    }

    /// Fill `text` from the offsets when the service only returned a span.
    pub(crate) fn resolve_text(&mut self, line: &str) {
        if !self.text.is_empty() {
            return;
        }
        if let Some((b, e)) = self.span() {
            self.text = line.chars().skip(b).take(e - b).collect();
        }
    }
}
