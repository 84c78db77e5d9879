//! Response parsing: NDJSON correction records, dual-shape tolerant.
//!
//! The service answers with newline-delimited JSON, one record per corrected
//! draft, in extraction order. Two shapes occur in the wild: the four fields
//! flat on the object, or nested under a `content` key. The fallback is
//! resolved once here, at the parsing boundary, into one canonical record;
//! downstream code never repeats the lookup.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical corrected-testimony record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionRecord {
    /// The corrected testimony text.
    pub quote: String,
    /// Attribution line, possibly carrying a trailing `, City-RegionCode`.
    pub author: String,
    /// Vehicle the testimony is about.
    pub vehicle: String,
    /// Where the testimony was collected (e.g. `"comentário no YouTube"`).
    pub context: String,
}

fn field(obj: &Value, name: &str) -> Option<String> {
    obj.get(name).and_then(Value::as_str).map(str::to_owned)
}

/// Normalizes one parsed JSON value into a [`CorrectionRecord`].
///
/// Field presence, not shape, determines success: the flat object is tried
/// first, then the object under `content`. Returns `None` when any of the
/// four fields is missing in both shapes.
pub fn normalize_record(value: &Value) -> Option<CorrectionRecord> {
    let candidates = [Some(value), value.get("content")];
    for obj in candidates.into_iter().flatten() {
        if let (Some(quote), Some(author), Some(vehicle), Some(context)) = (
            field(obj, "quote"),
            field(obj, "author"),
            field(obj, "vehicle"),
            field(obj, "context"),
        ) {
            return Some(CorrectionRecord { quote, author, vehicle, context });
        }
    }
    None
}

/// Parses the raw response body into per-position records.
///
/// One entry per non-empty line, in order; a line that fails to parse or
/// normalize yields `None` at its position so the caller can keep the
/// original block there (per-position isolation). Markdown code fences that
/// some models wrap around output are skipped.
pub fn parse_corrections(raw: &str) -> Vec<Option<CorrectionRecord>> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("```"))
        .map(|line| {
            serde_json::from_str::<Value>(line)
                .ok()
                .as_ref()
                .and_then(normalize_record)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flat_and_nested_shapes_normalize_identically() {
        let flat = json!({
            "quote": "consumo excelente",
            "author": "Ana P., Curitiba-PR",
            "vehicle": "HB20",
            "context": "comentário no blog"
        });
        let nested = json!({ "id": "b1", "content": flat.clone() });
        assert_eq!(normalize_record(&flat), normalize_record(&nested));
        assert!(normalize_record(&flat).is_some());
    }

    #[test]
    fn missing_field_fails_the_record_in_both_shapes() {
        let no_quote = json!({
            "author": "Ana P.",
            "vehicle": "HB20",
            "context": "blog"
        });
        assert!(normalize_record(&no_quote).is_none());
        assert!(normalize_record(&json!({ "content": no_quote })).is_none());
    }

    #[test]
    fn bad_lines_yield_none_without_aborting_the_batch() {
        let raw = concat!(
            "{\"quote\":\"q1\",\"author\":\"a1\",\"vehicle\":\"v\",\"context\":\"c\"}\n",
            "{\"author\":\"a2\",\"vehicle\":\"v\",\"context\":\"c\"}\n",
            "not json at all\n",
            "{\"content\":{\"quote\":\"q4\",\"author\":\"a4\",\"vehicle\":\"v\",\"context\":\"c\"}}\n",
        );
        let records = parse_corrections(raw);
        assert_eq!(records.len(), 4);
        assert!(records[0].is_some());
        assert!(records[1].is_none());
        assert!(records[2].is_none());
        assert_eq!(records[3].as_ref().unwrap().quote, "q4");
    }

    #[test]
    fn code_fences_and_blank_lines_are_skipped() {
        let raw = "```json\n{\"quote\":\"q\",\"author\":\"a\",\"vehicle\":\"v\",\"context\":\"c\"}\n\n```";
        let records = parse_corrections(raw);
        assert_eq!(records.len(), 1);
        assert!(records[0].is_some());
    }
}
