//! Hyperlink scanning in HTML bodies

use regex::Regex;
use std::sync::LazyLock;

use crate::gmail::decode_html_entities;

static ANCHOR_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("valid anchor regex")
});

/// All `href` values of `<a>` elements, in document order
pub fn anchor_hrefs(html: &str) -> impl Iterator<Item = String> + '_ {
    ANCHOR_HREF.captures_iter(html).filter_map(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|m| decode_html_entities(m.as_str().trim()))
    })
}

/// First anchor whose `href` contains `marker`
pub fn find_link(html: &str, marker: &str) -> Option<String> {
    anchor_hrefs(html).find(|href| href.contains(marker))
}
