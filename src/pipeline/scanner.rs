//! Line scanning: one entity-detection query per `LINE` block.
//!
//! Only `LINE` blocks are scanned; words, pages, tables and everything else
//! are skipped and never redacted on their own. A line is *flagged* when the
//! detection service returns at least one entity. Entity types are not
//! filtered.
//!
//! Queries can be dispatched with bounded concurrency
//! (`detection_concurrency`); results always come back in block order.

use crate::config::RedactionConfig;
use crate::error::RedactError;
use crate::model::{PiiEntity, TextBlock};
use crate::services::{names, EntityDetectionService};
use crate::stream::scan_stream;
use futures::TryStreamExt;
use serde::Serialize;
use std::sync::Arc;

/// A `LINE` block together with the entities detected in it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScannedLine {
    /// Position of the block in the job's block list.
    pub block_index: usize,
    pub block: TextBlock,
    pub entities: Vec<PiiEntity>,
}

impl ScannedLine {
    pub fn is_flagged(&self) -> bool {
        !self.entities.is_empty()
    }

    pub fn text(&self) -> &str {
        self.block.text()
    }
}

/// `LINE` blocks with their positions, in block order.
pub fn line_blocks(blocks: &[TextBlock]) -> Vec<(usize, TextBlock)> {
    blocks
        .iter()
        .enumerate()
        .filter(|(_, b)| b.is_line())
        .map(|(i, b)| (i, b.clone()))
        .collect()
}

/// Scan every `LINE` block in `blocks`, returning one entry per line.
///
/// Stops at the first detection fault.
pub async fn scan(
    detection: &Arc<dyn EntityDetectionService>,
    blocks: &[TextBlock],
    config: &RedactionConfig,
) -> Result<Vec<ScannedLine>, RedactError> {
    scan_stream(Arc::clone(detection), blocks, config)
        .try_collect()
        .await
}

/// Run detection for a single line.
///
/// Blank lines cannot hold PII and are answered locally without a call.
pub(crate) async fn scan_line(
    detection: &dyn EntityDetectionService,
    block_index: usize,
    block: TextBlock,
    language_code: &str,
) -> Result<ScannedLine, RedactError> {
    if block.text().trim().is_empty() {
        return Ok(ScannedLine {
            block_index,
            block,
            entities: Vec::new(),
        });
    }

    let mut entities = detection
        .detect(block.text(), language_code)
        .await
        .map_err(|e| RedactError::service(names::ENTITY_DETECTION, "detect", e))?;
    for e in &mut entities {
        e.resolve_text(block.text());
    }

    Ok(ScannedLine {
        block_index,
        block,
        entities,
    })
}

/// Literal text of every flagged line, in order.
pub fn flagged_texts(lines: &[ScannedLine]) -> Vec<String> {
    lines
        .iter()
        .filter(|l| l.is_flagged())
        .map(|l| l.text().to_string())
        .collect()
}
