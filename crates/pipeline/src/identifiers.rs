//! Newtype domain identifiers.
//!
//! Every domain concept that has an identity is represented as a distinct newtype
//! wrapping a primitive. This prevents accidentally interchanging, for example,
//! a [`JobName`] with a [`LimiterKey`] even though both are `String` under the
//! hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies one unit of generation or correction work.
///
/// Generated when the selection step creates the item; stable across every
/// retry and status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentItemId(Uuid);

impl ContentItemId {
    /// Generates a new random item identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a [`ContentItemId`] from an existing UUID (e.g. read from the store).
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for ContentItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers: String-backed
// ---------------------------------------------------------------------------

string_id! {
    /// Identifies an addressable sub-element (block) within a content document.
    ///
    /// Original block ids are preserved through correction; blocks without one
    /// get a synthesized id when the corrected replacement is assembled.
    BlockId
}

string_id! {
    /// Identifies a scheduled job by name (e.g. `"correct-testimonials"`).
    ///
    /// The per-job lease uses the job name as its key, so two invocations of
    /// the same job never run concurrently.
    JobName
}

string_id! {
    /// Key under which calls to an external service share one cooldown window.
    ///
    /// Every job that calls the generation service with the same key is
    /// serialized against the same rate-limit gate.
    LimiterKey
}

string_id! {
    /// A content category slug (e.g. `"suv-eletrico"`), used to restrict batch
    /// selection.
    CategorySlug
}

string_id! {
    /// Identifies the external model used for a generation attempt
    /// (e.g. `"gemini-1.5-pro"`).
    ModelId
}

string_id! {
    /// Reference to the public content store entry created when an item is
    /// published. Set exactly once per item.
    PublishedReference
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_ids_reject_empty_values() {
        assert!(JobName::new("").is_none());
        assert!(JobName::new("correct-testimonials").is_some());
    }

    #[test]
    fn item_id_round_trips_through_uuid() {
        let id = ContentItemId::new_random();
        assert_eq!(ContentItemId::from_uuid(id.as_uuid()), id);
    }
}
