//! Redaction: mask flagged lines and produce the output artifact.
//!
//! Two strategies, selected by [`RedactionMode`]:
//!
//! * **Structured** (default). The `Text` of each flagged `LINE` block, and of
//!   the `WORD` blocks it links to as children, is replaced in memory; the
//!   payload is serialised afterwards. Other fields are never touched, even
//!   if they happen to contain the same characters.
//!
//! * **Serialized**. The payload is serialised first and every literal
//!   occurrence of each flagged line is replaced in the JSON text via
//!   [`redact`]. Any other field that contains the same string is masked too.
//!
//! Every mask has the same number of characters as the text it hides, so
//! line lengths and layout survive redaction.

use crate::config::{MaskScope, RedactionConfig, RedactionMode};
use crate::error::RedactError;
use crate::model::{BlockKind, ExtractionResult, PiiEntity};
use crate::pipeline::scanner::ScannedLine;
use std::collections::HashMap;
use tracing::debug;

/// Default mask character.
pub const MASK_CHAR: char = '*';

/// A mask with one `mask_char` per character of `text`.
pub fn mask(text: &str, mask_char: char) -> String {
    std::iter::repeat(mask_char)
        .take(text.chars().count())
        .collect()
}

/// Replace every occurrence of each flagged line in `serialized_job` with a
/// same-length `*` mask.
///
/// Re-applying with the same inputs returns the same output.
pub fn redact<S: AsRef<str>>(serialized_job: &str, flagged_lines: &[S]) -> String {
    redact_with(serialized_job, flagged_lines, MASK_CHAR)
}

/// [`redact`] with a custom mask character.
pub fn redact_with<S: AsRef<str>>(
    serialized_job: &str,
    flagged_lines: &[S],
    mask_char: char,
) -> String {
    let pairs: Vec<(String, String)> = flagged_lines
        .iter()
        .map(|l| {
            let l = l.as_ref();
            (l.to_string(), mask(l, mask_char))
        })
        .collect();
    replace_all(serialized_job, pairs)
}

/// Replace each `(original, replacement)` pair everywhere in a JSON text.
///
/// Originals are matched in their JSON-escaped form, since that is how a
/// line containing `"` or `\` appears once serialised. Longer originals are
/// applied first so a flagged line that is a substring of another flagged
/// line cannot leave the longer one half-masked.
fn replace_all(serialized: &str, mut pairs: Vec<(String, String)>) -> String {
    pairs.retain(|(original, _)| !original.is_empty());
    pairs.sort_by(|a, b| {
        b.0.chars()
            .count()
            .cmp(&a.0.chars().count())
            .then_with(|| a.0.cmp(&b.0))
    });
    pairs.dedup_by(|a, b| a.0 == b.0);

    let mut out = serialized.to_string();
    for (original, replacement) in &pairs {
        let needle = json_escape(original);
        let with = json_escape(replacement);
        out = out.replace(&needle, &with);
    }
    out
}

/// The body of `s` as a JSON string literal, without the quotes.
fn json_escape(s: &str) -> String {
    let quoted = serde_json::Value::String(s.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

/// Mask only the characters inside `spans` (character offsets, end-exclusive).
pub fn mask_spans(text: &str, spans: &[(usize, usize)], mask_char: char) -> String {
    text.chars()
        .enumerate()
        .map(|(i, c)| {
            if spans.iter().any(|&(b, e)| i >= b && i < e) {
                mask_char
            } else {
                c
            }
        })
        .collect()
}

/// Character spans of `entities` inside `line`.
///
/// Reported offsets are trusted when they fit the line; otherwise every
/// occurrence of the entity text is used. Returns `None` when some entity
/// cannot be located at all.
fn entity_spans(line: &str, entities: &[PiiEntity]) -> Option<Vec<(usize, usize)>> {
    let len = line.chars().count();
    let mut spans = Vec::new();
    for entity in entities {
        if let Some((b, e)) = entity.span().filter(|&(_, e)| e <= len) {
            spans.push((b, e));
            continue;
        }
        if entity.text.is_empty() {
            return None;
        }
        let found: Vec<(usize, usize)> = line
            .match_indices(entity.text.as_str())
            .map(|(byte_idx, m)| {
                let b = line[..byte_idx].chars().count();
                (b, b + m.chars().count())
            })
            .collect();
        if found.is_empty() {
            return None;
        }
        spans.extend(found);
    }
    Some(spans)
}

/// Masked replacement for one flagged line under `scope`.
pub fn masked_line(line: &ScannedLine, scope: MaskScope, mask_char: char) -> String {
    let text = line.text();
    match scope {
        MaskScope::Line => mask(text, mask_char),
        MaskScope::Entity => match entity_spans(text, &line.entities) {
            Some(spans) => mask_spans(text, &spans, mask_char),
            None => {
                debug!("Entity span not found in line {}; masking whole line", line.block_index);
                mask(text, mask_char)
            }
        },
    }
}

/// Return a copy of `result` with every flagged line masked in place.
///
/// `WORD` children of a flagged line are masked too, so the word-level view
/// does not leak what the line-level view hides. Under [`MaskScope::Entity`]
/// only the words overlapping an entity span are masked.
pub fn redact_blocks(
    result: &ExtractionResult,
    lines: &[ScannedLine],
    scope: MaskScope,
    mask_char: char,
) -> ExtractionResult {
    let mut out = result.clone();
    let by_id: HashMap<String, usize> = out
        .blocks
        .iter()
        .enumerate()
        .filter_map(|(i, b)| b.id.clone().map(|id| (id, i)))
        .collect();

    for line in lines.iter().filter(|l| l.is_flagged()) {
        let Some(block) = out.blocks.get_mut(line.block_index) else {
            continue;
        };
        if block.text != line.block.text {
            continue;
        }
        block.text = Some(masked_line(line, scope, mask_char));

        let spans = match scope {
            MaskScope::Line => None,
            MaskScope::Entity => entity_spans(line.text(), &line.entities),
        };
        let children: Vec<usize> = line
            .block
            .child_ids()
            .filter_map(|id| by_id.get(id).copied())
            .collect();
        mask_child_words(&mut out, line.text(), &children, spans.as_deref(), mask_char);
    }
    out
}

/// Mask the `WORD` blocks at `children`, locating each word in `line_text`
/// left to right. With `spans == None` every word is masked.
fn mask_child_words(
    out: &mut ExtractionResult,
    line_text: &str,
    children: &[usize],
    spans: Option<&[(usize, usize)]>,
    mask_char: char,
) {
    let mut cursor = 0usize;
    for &idx in children {
        let word = &mut out.blocks[idx];
        if word.kind != BlockKind::Word {
            continue;
        }
        let Some(text) = word.text.as_deref().filter(|t| !t.is_empty()) else {
            continue;
        };
        let located = line_text[cursor..].find(text).map(|rel| {
            let byte_start = cursor + rel;
            let b = line_text[..byte_start].chars().count();
            cursor = byte_start + text.len();
            (b, b + text.chars().count())
        });
        let hit = match (spans, located) {
            (None, _) | (Some(_), None) => true,
            (Some(spans), Some((wb, we))) => spans.iter().any(|&(b, e)| b < we && wb < e),
        };
        if hit {
            word.text = Some(mask(text, mask_char));
        }
    }
}

/// Produce the serialised redacted artifact for a succeeded job.
pub fn render_redacted(
    result: &ExtractionResult,
    lines: &[ScannedLine],
    config: &RedactionConfig,
) -> Result<String, RedactError> {
    match config.redaction_mode {
        RedactionMode::Structured => {
            let redacted = redact_blocks(result, lines, config.mask_scope, config.mask_char);
            serialize(&redacted, config.pretty_output)
        }
        RedactionMode::Serialized => {
            let serialized = serialize(result, config.pretty_output)?;
            let pairs = lines
                .iter()
                .filter(|l| l.is_flagged())
                .map(|l| {
                    (
                        l.text().to_string(),
                        masked_line(l, config.mask_scope, config.mask_char),
                    )
                })
                .collect();
            Ok(replace_all(&serialized, pairs))
        }
    }
}

fn serialize(result: &ExtractionResult, pretty: bool) -> Result<String, RedactError> {
    let s = if pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    Ok(s)
}
