//! Job-post label derivation from the message snippet

use regex::Regex;

use crate::gmail::decode_html_entities;

/// Derive a folder-safe job-post label from `snippet`
///
/// Capture group 1 of `pattern` is sanitized; `placeholder` is returned when
/// the pattern does not match or nothing usable survives sanitizing.
pub fn derive_job_post(snippet: &str, pattern: &Regex, placeholder: &str) -> String {
    let snippet = decode_html_entities(snippet);
    pattern
        .captures(&snippet)
        .and_then(|caps| caps.get(1))
        .and_then(|m| sanitize_label(m.as_str()))
        .unwrap_or_else(|| placeholder.to_string())
}

/// Keep word characters, `-`, `_` and `.`; join the remaining words with `_`
pub fn sanitize_label(raw: &str) -> Option<String> {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.') || c.is_whitespace())
        .collect();
    let label = kept.split_whitespace().collect::<Vec<_>>().join("_");

    if label.is_empty() || label.chars().all(|c| c == '.') {
        return None;
    }
    Some(label)
}
