//! Draft extraction: which blocks of a document are eligible for correction.

use pipeline::{BlockKind, ContentBlock};

/// Returns the eligible blocks in original order, each paired with its index
/// in the input sequence.
///
/// Eligible kinds are `Draft` and `RecentlyPublished` (the grace window during
/// which already-live content may still be corrected). `Corrected` blocks are
/// excluded unconditionally: correction is one-way and must never be
/// reapplied to already-normalized content. Every other kind is ignored.
///
/// An empty result means "nothing to do", not an error.
pub fn extract(blocks: &[ContentBlock]) -> Vec<(usize, &ContentBlock)> {
    blocks
        .iter()
        .enumerate()
        .filter(|(_, block)| {
            matches!(block.kind, BlockKind::Draft | BlockKind::RecentlyPublished)
        })
        .collect()
}
