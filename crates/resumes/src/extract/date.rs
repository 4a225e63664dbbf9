//! Date header parsing

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use std::sync::LazyLock;

use crate::models::Timestamp;

static PARENTHETICAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\([^)]*\)\s*").expect("valid parenthetical regex"));

/// Parse a `Date` header value and express it in `offset`
///
/// Anything after the first `;` is ignored and parenthetical annotations such
/// as `(IST)` or `(UTC)` are removed before parsing as RFC 2822.
pub fn parse_email_date(raw: &str, offset: FixedOffset) -> Option<Timestamp> {
    let head = raw.split(';').next().unwrap_or_default();
    let cleaned = PARENTHETICAL.replace_all(head, " ");
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    if cleaned.is_empty() {
        return None;
    }

    DateTime::parse_from_rfc2822(&cleaned)
        .or_else(|_| DateTime::parse_from_rfc3339(&cleaned))
        .ok()
        .map(|at| at.with_timezone(&offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(19800).unwrap()
    }

    #[test]
    fn test_parses_with_timezone_annotation() {
        let at = parse_email_date("Mon, 13 Nov 2023 10:30:00 +0000 (UTC)", ist()).unwrap();
        assert_eq!(at.to_rfc3339(), "2023-11-13T16:00:00+05:30");
    }

    #[test]
    fn test_parses_plain_rfc2822() {
        let at = parse_email_date("Tue, 2 Jan 2024 08:15:00 +0530", ist()).unwrap();
        assert_eq!(at.to_rfc3339(), "2024-01-02T08:15:00+05:30");
    }

    #[test]
    fn test_ignores_text_after_semicolon() {
        let at = parse_email_date("Tue, 2 Jan 2024 08:15:00 +0000; extra", ist()).unwrap();
        assert_eq!(at.to_rfc3339(), "2024-01-02T13:45:00+05:30");
    }

    #[test]
    fn test_unparsable_date() {
        assert!(parse_email_date("yesterday afternoon", ist()).is_none());
        assert!(parse_email_date("", ist()).is_none());
        assert!(parse_email_date("(IST)", ist()).is_none());
    }
}
