//! JSON extraction from free-form model text.
//!
//! Models wrap JSON in prose, markdown fences, or both. Extraction is a
//! two-phase parse: locate the outermost balanced-brace span, then
//! strict-parse it. Scanning resumes at the next `{` when a candidate fails,
//! so the first syntactically valid object wins.

use crate::pipeline::model::ModelError;

/// Extract the first valid JSON object embedded in `text`.
pub fn extract_json_object(text: &str) -> Result<serde_json::Value, ModelError> {
    let bytes = text.as_bytes();
    let mut search_from = 0;

    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        match balanced_span(bytes, start) {
            Some(end) => {
                let candidate = &text[start..=end];
                if let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate) {
                    if value.is_object() {
                        return Ok(value);
                    }
                }
                // Unparseable span; retry from the next opening brace.
                search_from = start + 1;
            }
            None => break,
        }
    }

    Err(ModelError::MalformedOutput(format!(
        "no valid JSON object in model response ({} chars)",
        text.len()
    )))
}

/// Check that a response contains an extractable JSON object. Used as the
/// router-level response check so malformed output triggers fallback.
pub fn check_contains_json(text: &str) -> Result<(), ModelError> {
    extract_json_object(text).map(|_| ())
}

/// Find the closing brace matching the `{` at `start`, string- and
/// escape-aware. Returns `None` if the text ends before the span closes.
fn balanced_span(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}
