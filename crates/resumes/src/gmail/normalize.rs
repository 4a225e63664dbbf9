//! Helpers for reading Gmail message payloads

use base64::prelude::*;

use super::api::{MessagePart, MessagePayload};

const HTML_MIME: &str = "text/html";
const ALTERNATIVE_MIME: &str = "multipart/alternative";

/// Extract a header value by name (case-insensitive)
pub fn extract_header(payload: &MessagePayload, name: &str) -> Option<String> {
    payload.headers.as_ref()?.iter().find_map(|h| {
        if h.name.eq_ignore_ascii_case(name) {
            Some(h.value.clone())
        } else {
            None
        }
    })
}

/// Locate and decode the HTML body of a message
///
/// The top-level body wins when it is HTML, or when the message is not
/// multipart at all. Otherwise the parts are searched by MIME type, looking
/// one level into `multipart/alternative` containers.
pub fn find_html_body(payload: &MessagePayload) -> Option<String> {
    let top_level_data = payload.body.as_ref().and_then(|b| b.data.as_deref());

    if let Some(data) = top_level_data
        && (is_mime(payload.mime_type.as_deref(), HTML_MIME) || payload.parts.is_none())
    {
        return decode_base64_body(data);
    }

    let parts = payload.parts.as_ref()?;
    for part in parts {
        if let Some(data) = html_data(part) {
            return decode_base64_body(data);
        }

        if is_mime(part.mime_type.as_deref(), ALTERNATIVE_MIME)
            && let Some(data) = part.parts.iter().flatten().find_map(html_data)
        {
            return decode_base64_body(data);
        }
    }

    None
}

/// Body data of a `text/html` part, if it has any
fn html_data(part: &MessagePart) -> Option<&str> {
    if !is_mime(part.mime_type.as_deref(), HTML_MIME) {
        return None;
    }
    part.body.as_ref()?.data.as_deref()
}

fn is_mime(mime_type: Option<&str>, expected: &str) -> bool {
    mime_type.is_some_and(|m| m.eq_ignore_ascii_case(expected) || m.starts_with(expected))
}

/// Decode base64-encoded body data
///
/// Gmail uses URL-safe base64 but padding can vary, so several decoders are
/// tried. Invalid UTF-8 sequences are replaced rather than rejected.
pub fn decode_base64_body(data: &str) -> Option<String> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE};

    let decoders: &[&base64::engine::GeneralPurpose] =
        &[&BASE64_URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD, &STANDARD_NO_PAD];

    let data = data.trim();
    decoders
        .iter()
        .find_map(|decoder| decoder.decode(data).ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

/// Decode the HTML entities Gmail leaves in snippets and attribute values
pub fn decode_html_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
