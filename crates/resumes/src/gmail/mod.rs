//! Gmail API integration
//!
//! This module provides:
//! - OAuth2 authentication flow (the credential provider)
//! - Gmail API client for listing threads and fetching messages
//! - Payload helpers for headers and HTML bodies

mod auth;
mod client;
mod normalize;

pub use auth::GmailAuth;
pub use client::{AuthExpiredError, GmailClient};
pub use normalize::{decode_base64_body, decode_html_entities, extract_header, find_html_body};

use anyhow::Result;

use crate::models::ThreadId;
use api::{GmailMessage, ListThreadsResponse};

/// Maximum page size accepted by the threads endpoint
pub const MAX_PAGE_SIZE: usize = 500;

/// The mail API operations a sync run needs
///
/// `GmailClient` is the production implementation; tests substitute fakes.
pub trait MailApi {
    /// Make sure a usable session exists (may run the interactive OAuth flow)
    fn authenticate(&self) -> Result<()>;

    /// Fetch one page of threads matching `query`
    fn list_threads_page(
        &self,
        query: &str,
        max_results: usize,
        page_token: Option<&str>,
    ) -> Result<ListThreadsResponse>;

    /// Fetch the full message whose id equals the thread id
    fn get_message(&self, id: &ThreadId) -> Result<GmailMessage>;
}

/// Gmail API response types
pub mod api {
    use serde::{Deserialize, Serialize};

    /// Response from listing threads
    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ListThreadsResponse {
        pub threads: Option<Vec<ThreadRef>>,
        pub next_page_token: Option<String>,
        pub result_size_estimate: Option<u32>,
    }

    /// Reference to a thread as returned by the list call
    #[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ThreadRef {
        pub id: String,
        #[serde(default)]
        pub snippet: Option<String>,
        #[serde(default)]
        pub history_id: Option<String>,
    }

    /// Full message from Gmail API
    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GmailMessage {
        pub id: String,
        pub thread_id: String,
        #[serde(default)]
        pub snippet: String,
        pub payload: Option<MessagePayload>,
    }

    /// Message payload containing headers and body
    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePayload {
        pub headers: Option<Vec<Header>>,
        pub body: Option<MessageBody>,
        pub parts: Option<Vec<MessagePart>>,
        pub mime_type: Option<String>,
    }

    /// Email header (name-value pair)
    #[derive(Debug, Clone, Deserialize, Serialize)]
    pub struct Header {
        pub name: String,
        pub value: String,
    }

    /// Message body (URL-safe base64 encoded)
    #[derive(Debug, Default, Deserialize)]
    pub struct MessageBody {
        pub size: Option<u32>,
        pub data: Option<String>,
    }

    /// Message part (for multipart messages)
    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePart {
        pub part_id: Option<String>,
        pub mime_type: Option<String>,
        pub filename: Option<String>,
        pub headers: Option<Vec<Header>>,
        pub body: Option<MessageBody>,
        pub parts: Option<Vec<MessagePart>>,
    }
}
