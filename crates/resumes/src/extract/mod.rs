//! Message extraction
//!
//! Turns a notification email into the three facts a download needs: when it
//! was received, where the resume lives and which job post it belongs to.
//! The result is either complete or absent.

mod date;
mod job_post;
mod link;

pub use date::parse_email_date;
pub use job_post::{derive_job_post, sanitize_label};
pub use link::{anchor_hrefs, find_link};

use anyhow::{Context, Result};
use chrono::FixedOffset;
use log::{debug, warn};
use regex::Regex;

use crate::gmail::api::GmailMessage;
use crate::gmail::{MailApi, extract_header, find_html_body};
use crate::models::{RunWindow, ThreadId, Timestamp};

/// Everything needed to download and log one resume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedResume {
    pub received_at: Timestamp,
    pub resume_url: String,
    pub job_post: String,
}

/// Configurable extraction heuristics
#[derive(Debug, Clone)]
pub struct ExtractionRules {
    link_marker: String,
    job_post_pattern: Regex,
    placeholder: String,
}

impl ExtractionRules {
    /// `job_post_pattern` must contain at least one capture group
    pub fn new(link_marker: &str, job_post_pattern: &str, placeholder: &str) -> Result<Self> {
        let job_post_pattern = Regex::new(job_post_pattern)
            .with_context(|| format!("Invalid job post pattern: {}", job_post_pattern))?;
        if job_post_pattern.captures_len() < 2 {
            anyhow::bail!("Job post pattern needs a capture group for the job title");
        }
        if link_marker.is_empty() {
            anyhow::bail!("Link marker must not be empty");
        }
        let placeholder = sanitize_label(placeholder)
            .context("Placeholder job post must contain at least one usable character")?;

        Ok(Self {
            link_marker: link_marker.to_string(),
            job_post_pattern,
            placeholder,
        })
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }
}

/// Extracts resume details from notification messages
pub struct Extractor {
    rules: ExtractionRules,
    offset: FixedOffset,
}

impl Extractor {
    pub fn new(rules: ExtractionRules, offset: FixedOffset) -> Self {
        Self { rules, offset }
    }

    /// Fetch the message for `thread_id` and extract from it
    ///
    /// `Err` only reports the fetch itself; every content problem is `Ok(None)`.
    pub fn extract(
        &self,
        api: &dyn MailApi,
        thread_id: &ThreadId,
        window: &RunWindow,
    ) -> Result<Option<ExtractedResume>> {
        let message = api
            .get_message(thread_id)
            .with_context(|| format!("Failed to fetch message for thread {}", thread_id))?;
        Ok(self.extract_from_message(&message, window))
    }

    /// Extract from an already fetched message
    pub fn extract_from_message(
        &self,
        message: &GmailMessage,
        window: &RunWindow,
    ) -> Option<ExtractedResume> {
        let thread = message.thread_id.as_str();

        let Some(payload) = message.payload.as_ref() else {
            warn!("Thread {}: message has no payload, skipping", thread);
            return None;
        };

        let Some(date_header) = extract_header(payload, "Date") else {
            warn!("Thread {}: no Date header, skipping", thread);
            return None;
        };

        let Some(received_at) = parse_email_date(&date_header, self.offset) else {
            warn!("Thread {}: unparsable date '{}', skipping", thread, date_header);
            return None;
        };

        if !window.contains(&received_at) {
            debug!("Thread {}: received {} outside {}, skipping", thread, received_at, window);
            return None;
        }

        let Some(html) = find_html_body(payload) else {
            warn!("Thread {}: no HTML body, skipping", thread);
            return None;
        };

        let Some(resume_url) = find_link(&html, &self.rules.link_marker) else {
            warn!("Thread {}: no resume link found, skipping", thread);
            return None;
        };

        let job_post = derive_job_post(
            &message.snippet,
            &self.rules.job_post_pattern,
            &self.rules.placeholder,
        );

        Some(ExtractedResume {
            received_at,
            resume_url,
            job_post,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncSettings;
    use crate::gmail::api::{Header, MessageBody, MessagePart, MessagePayload};
    use crate::models::parse_hour_stamp;
    use base64::prelude::*;

    const SNIPPET: &str = "Acme has a new applicant for Backend Engineer (Hybrid), view";
    const HTML: &str = r#"<a href="https://www.linkedin.com/jobs/download_resume?x=1">Resume</a>"#;

    fn extractor() -> Extractor {
        let settings = SyncSettings::default();
        Extractor::new(
            settings.extraction_rules().unwrap(),
            settings.offset().unwrap(),
        )
    }

    fn window() -> RunWindow {
        let offset = FixedOffset::east_opt(19800).unwrap();
        RunWindow::new(
            parse_hour_stamp("01 01 2024 00", offset).unwrap(),
            parse_hour_stamp("31 01 2024 00", offset).unwrap(),
        )
        .unwrap()
    }

    fn message(date: Option<&str>, parts: Vec<MessagePart>) -> GmailMessage {
        let headers = date
            .map(|d| {
                vec![Header {
                    name: "Date".to_string(),
                    value: d.to_string(),
                }]
            })
            .unwrap_or_default();
        GmailMessage {
            id: "t1".to_string(),
            thread_id: "t1".to_string(),
            snippet: SNIPPET.to_string(),
            payload: Some(MessagePayload {
                headers: Some(headers),
                mime_type: Some("multipart/alternative".to_string()),
                parts: Some(parts),
                ..MessagePayload::default()
            }),
        }
    }

    fn part(mime: &str, content: &str) -> MessagePart {
        MessagePart {
            mime_type: Some(mime.to_string()),
            body: Some(MessageBody {
                size: None,
                data: Some(BASE64_URL_SAFE.encode(content)),
            }),
            ..MessagePart::default()
        }
    }

    #[test]
    fn test_complete_extraction() {
        let msg = message(
            Some("Mon, 15 Jan 2024 09:00:00 +0000 (UTC)"),
            vec![part("text/plain", "plain"), part("text/html", HTML)],
        );
        let extracted = extractor().extract_from_message(&msg, &window()).unwrap();

        assert_eq!(extracted.job_post, "Backend_Engineer");
        assert_eq!(
            extracted.resume_url,
            "https://www.linkedin.com/jobs/download_resume?x=1"
        );
        assert_eq!(extracted.received_at.to_rfc3339(), "2024-01-15T14:30:00+05:30");
    }

    #[test]
    fn test_missing_html_part_yields_none() {
        let msg = message(
            Some("Mon, 15 Jan 2024 09:00:00 +0000"),
            vec![part("text/plain", HTML)],
        );
        assert_eq!(extractor().extract_from_message(&msg, &window()), None);
    }

    #[test]
    fn test_date_outside_window_yields_none() {
        let msg = message(
            Some("Thu, 15 Feb 2024 09:00:00 +0000"),
            vec![part("text/html", HTML)],
        );
        assert_eq!(extractor().extract_from_message(&msg, &window()), None);
    }

    #[test]
    fn test_missing_or_bad_date_yields_none() {
        let no_date = message(None, vec![part("text/html", HTML)]);
        assert_eq!(extractor().extract_from_message(&no_date, &window()), None);

        let bad_date = message(Some("sometime"), vec![part("text/html", HTML)]);
        assert_eq!(extractor().extract_from_message(&bad_date, &window()), None);
    }

    #[test]
    fn test_missing_link_yields_none() {
        let msg = message(
            Some("Mon, 15 Jan 2024 09:00:00 +0000"),
            vec![part("text/html", r#"<a href="https://example.com/profile">x</a>"#)],
        );
        assert_eq!(extractor().extract_from_message(&msg, &window()), None);
    }

    #[test]
    fn test_rules_validation() {
        assert!(ExtractionRules::new("download_resume", "no groups", "Unknown").is_err());
        assert!(ExtractionRules::new("download_resume", "(unclosed", "Unknown").is_err());
        assert!(ExtractionRules::new("", "(.*)", "Unknown").is_err());
        assert!(ExtractionRules::new("download_resume", "(.*)", "//").is_err());
        let rules = ExtractionRules::new("download_resume", "(.*)", "Misc Jobs").unwrap();
        assert_eq!(rules.placeholder(), "Misc_Jobs");
    }
}
