//! Correction application: merges parsed records back into the block
//! sequence and runs the location/author consistency rules.
//!
//! Free-form natural language drives everything here, so partial matches,
//! competing city mentions, and already-well-formed authors are all expected
//! inputs. The one hard guarantee: a malformed record never corrupts data.
//! Its position keeps the original block, and the batch continues.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use pipeline::{BlockId, BlockKind, ContentBlock};

use crate::extract::extract;
use crate::gazetteer::find_city;
use crate::parse::CorrectionRecord;

/// Platforms whose testimonies carry no author location: the attribution is
/// the platform itself, so a trailing city would be fabricated data.
const NO_LOCATION_PLATFORMS: &[(&str, &str)] = &[
    ("youtube", "YouTube"),
    ("tiktok", "TikTok"),
    ("kwai", "Kwai"),
    ("shorts", "Shorts"),
    ("reels", "Reels"),
];

/// Trailing `, <location>` suffix on an author line, with or without a
/// region code.
static LOCATION_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*[^,]+$").expect("static suffix pattern"));

fn strip_location_suffix(author: &str) -> String {
    // A bare trailing comma is not matched by the suffix pattern; drop it too
    // so the canonical suffix never doubles the separator.
    LOCATION_SUFFIX
        .replace(author, "")
        .trim()
        .trim_end_matches(',')
        .trim_end()
        .to_owned()
}

/// Suffix after the author's last comma, if any (the candidate location).
fn author_suffix(author: &str) -> Option<&str> {
    author.rsplit_once(',').map(|(_, suffix)| suffix.trim())
}

fn platform_in(context: &str) -> Option<&'static str> {
    let lowered = context.to_lowercase();
    NO_LOCATION_PLATFORMS
        .iter()
        .find(|(needle, _)| lowered.contains(needle))
        .map(|(_, display)| *display)
}

/// Runs the consistency rules over one record.
///
/// Platform rule first: a no-location platform in `context` strips the
/// author's trailing location (substituting a generic platform-attributed
/// author if stripping empties the line) and suppresses the coherence rule.
/// Otherwise the coherence rule appends the canonical suffix of the first
/// gazetteer city mentioned in the quote, unless the author already names it.
pub fn normalize(record: &CorrectionRecord) -> CorrectionRecord {
    let mut out = record.clone();

    if let Some(platform) = platform_in(&record.context) {
        let stripped = strip_location_suffix(&record.author);
        out.author = if stripped.is_empty() {
            format!("Usuário do {platform}")
        } else {
            stripped
        };
        return out;
    }

    if let Some(city) = find_city(&record.quote) {
        let already_named = author_suffix(&record.author)
            .map(|suffix| suffix.to_lowercase().contains(city.needle))
            .unwrap_or(false);
        if !already_named {
            let base = strip_location_suffix(&record.author);
            out.author = if base.is_empty() {
                city.canonical.to_owned()
            } else {
                format!("{base}, {}", city.canonical)
            };
        }
    }

    out
}

fn corrected_block(original: &ContentBlock, record: CorrectionRecord) -> ContentBlock {
    let id = original
        .id
        .clone()
        .or_else(|| BlockId::new(format!("testimony-{}", Uuid::new_v4())));
    ContentBlock {
        id,
        kind: BlockKind::Corrected,
        position: original.position,
        content: json!({
            "quote": record.quote,
            "author": record.author,
            "vehicle": record.vehicle,
            "context": record.context,
        }),
    }
}

/// Replaces each eligible position with its normalized correction.
///
/// `records` is positional, one per eligible draft in extraction order. A
/// `None` record (unparseable line) or a missing trailing record leaves that
/// position's original block untouched; non-eligible positions are never
/// touched.
pub fn apply(blocks: &[ContentBlock], records: &[Option<CorrectionRecord>]) -> Vec<ContentBlock> {
    let eligible = extract(blocks);
    let mut out: Vec<ContentBlock> = blocks.to_vec();

    for (slot, (index, original)) in eligible.into_iter().enumerate() {
        match records.get(slot) {
            Some(Some(record)) => {
                out[index] = corrected_block(original, normalize(record));
            }
            Some(None) => {
                warn!(position = index, "malformed correction record; keeping original block");
            }
            None => {
                warn!(position = index, "no correction record for draft; keeping original block");
            }
        }
    }

    out
}
