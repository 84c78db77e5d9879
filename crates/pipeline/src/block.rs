//! Content blocks: the addressable sub-elements of a published document.
//!
//! Blocks are identified by position within an ordered sequence owned by the
//! parent document. The corrector replaces blocks in place, preserving order
//! and position metadata.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::BlockId;

/// Discriminator deciding what the correction sweep may do with a block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockKind {
    /// Eligible for correction.
    Draft,
    /// Already live, but inside the grace window during which it may still be
    /// corrected. Eligible.
    RecentlyPublished,
    /// Already normalized. Correction is one-way: never eligible again.
    Corrected,
    /// Any other block kind (images, spec tables, ...). Ignored by the sweep.
    #[serde(untagged)]
    Other(String),
}

/// One addressable sub-element of a content document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    /// Stable id, when the source document carries one. The corrector
    /// preserves it; a replacement for an id-less block gets a synthesized id.
    pub id: Option<BlockId>,
    /// What the sweep may do with this block.
    pub kind: BlockKind,
    /// Position within the parent document's ordered sequence.
    pub position: u32,
    /// Kind-specific body (testimony fields, image metadata, ...).
    pub content: Value,
}
