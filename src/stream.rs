//! Streaming line scan: yield each scanned line as soon as it is ready.
//!
//! [`crate::pipeline::scanner::scan`] collects everything before returning.
//! [`scan_stream`] exposes the same pass as a lazy, finite, single-pass
//! `Stream` so a caller can show progress, stop early, or feed lines into
//! its own sink. Nothing is sent to the detection service until the stream
//! is polled.
//!
//! Lines are emitted in block order even when `detection_concurrency > 1`:
//! the fan-out uses `buffered`, not `buffer_unordered`.

use crate::config::RedactionConfig;
use crate::error::RedactError;
use crate::model::TextBlock;
use crate::pipeline::scanner::{line_blocks, scan_line, ScannedLine};
use crate::services::EntityDetectionService;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::debug;

/// A boxed stream of scanned lines.
pub type LineStream = Pin<Box<dyn Stream<Item = Result<ScannedLine, RedactError>> + Send>>;

/// Scan the `LINE` blocks of `blocks`, streaming results in block order.
pub fn scan_stream(
    detection: Arc<dyn EntityDetectionService>,
    blocks: &[TextBlock],
    config: &RedactionConfig,
) -> LineStream {
    let lines = line_blocks(blocks);
    let total = lines.len();
    debug!(
        "Scanning {} of {} blocks with concurrency {}",
        total,
        blocks.len(),
        config.detection_concurrency
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_scan_start(total);
    }

    let language_code = config.language_code.clone();
    let callback = config.progress_callback.clone();

    let s = stream::iter(lines.into_iter().enumerate().map(
        move |(line_no, (block_index, block))| {
            let detection = Arc::clone(&detection);
            let language_code = language_code.clone();
            let callback = callback.clone();
            async move {
                let line = scan_line(detection.as_ref(), block_index, block, &language_code).await?;
                if let Some(ref cb) = callback {
                    cb.on_line_scanned(line_no, total, line.entities.len());
                }
                Ok::<_, RedactError>(line)
            }
        },
    ))
    .buffered(config.detection_concurrency);

    Box::pin(s)
}
