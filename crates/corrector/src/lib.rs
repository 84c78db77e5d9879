//! Testimony corrector for the Autopress pipeline.
//!
//! Pure text transformation, no I/O: which blocks are eligible
//! ([`extract`]), what to ask the service ([`prompt`]), how to read its
//! answer ([`parse`]), and how to merge the answer back under the
//! location/author consistency rules ([`apply`]).
//!
//! ## Architectural Layer
//!
//! **Business logic.** The orchestrator sequences these functions around the
//! generation-service call; nothing here touches the network or the store.

pub mod apply;
pub mod extract;
pub mod gazetteer;
pub mod parse;
pub mod prompt;

pub use apply::{apply, normalize};
pub use extract::extract;
pub use gazetteer::{find_city, CityEntry};
pub use parse::{normalize_record, parse_corrections, CorrectionRecord};
pub use prompt::{build, build_generation, PromptContext};
