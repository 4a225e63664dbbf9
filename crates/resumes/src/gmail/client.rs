//! Gmail API HTTP client
//!
//! Lists threads and fetches messages. Every call goes through the same
//! authorized GET: a 401 triggers one re-authentication and one retry.

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::de::DeserializeOwned;

use super::api::{GmailMessage, ListThreadsResponse};
use super::{GmailAuth, MAX_PAGE_SIZE, MailApi};
use crate::models::ThreadId;

/// The Gmail session expired and could not be renewed; aborts the run
#[derive(Debug, thiserror::Error)]
#[error("Gmail authorization failed or expired")]
pub struct AuthExpiredError;

/// Gmail API base URL
const BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";

/// Gmail API client
pub struct GmailClient {
    auth: GmailAuth,
    agent: ureq::Agent,
    base_url: String,
}

type HttpResponse = ureq::http::Response<ureq::Body>;

impl GmailClient {
    pub fn new(auth: GmailAuth) -> Self {
        Self {
            auth,
            agent: ureq::Agent::new_with_defaults(),
            base_url: BASE_URL.to_string(),
        }
    }

    /// Talk to another API root (without trailing slash)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_agent(mut self, agent: ureq::Agent) -> Self {
        self.agent = agent;
        self
    }

    fn send(&self, url: &str, access_token: &str) -> Result<HttpResponse, ureq::Error> {
        self.agent
            .get(url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .call()
    }

    /// GET `url` as JSON, re-authenticating and retrying once on a 401
    fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        let token = self.auth.access_token().context(AuthExpiredError)?;

        let response = match self.send(url, &token) {
            Err(ureq::Error::StatusCode(401)) => {
                warn!("Gmail rejected the access token during {}, re-authenticating", what);
                let token = self.auth.reauthenticate().context(AuthExpiredError)?;
                match self.send(url, &token) {
                    Err(ureq::Error::StatusCode(401)) => return Err(AuthExpiredError.into()),
                    retried => retried,
                }
            }
            first => first,
        };

        let mut response = response.with_context(|| format!("Failed to send {} request", what))?;
        response
            .body_mut()
            .read_json()
            .with_context(|| format!("Failed to parse {} response", what))
    }
}

impl MailApi for GmailClient {
    fn authenticate(&self) -> Result<()> {
        self.auth.access_token().context(AuthExpiredError)?;
        Ok(())
    }

    fn list_threads_page(
        &self,
        query: &str,
        max_results: usize,
        page_token: Option<&str>,
    ) -> Result<ListThreadsResponse> {
        let mut url = format!(
            "{}/users/me/threads?q={}&maxResults={}",
            self.base_url,
            urlencoding::encode(query),
            max_results.clamp(1, MAX_PAGE_SIZE)
        );

        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
        }

        debug!("Listing threads: {}", query);
        self.get_json(&url, "list threads")
    }

    fn get_message(&self, id: &ThreadId) -> Result<GmailMessage> {
        let url = format!(
            "{}/users/me/messages/{}?format=full",
            self.base_url,
            urlencoding::encode(id.as_str())
        );
        self.get_json(&url, "get message")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GmailCredentials;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::path::Path;
    use std::thread;

    const UNAUTHORIZED: &str =
        "HTTP/1.1 401 Unauthorized\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

    fn json_response(body: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    }

    /// Answer one connection per canned response, returning
    /// `"<request line> | <authorization header>"` for each request seen
    fn serve_sequence(responses: Vec<String>) -> (String, thread::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let mut seen = Vec::new();
            for response in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();

                let mut authorization = String::new();
                let mut content_length = 0;
                let mut line = String::new();
                while reader.read_line(&mut line).unwrap() > 0 && line != "\r\n" {
                    if let Some((name, value)) = line.trim_end().split_once(':') {
                        match name.to_ascii_lowercase().as_str() {
                            "authorization" => authorization = value.trim().to_string(),
                            "content-length" => content_length = value.trim().parse().unwrap(),
                            _ => {}
                        }
                    }
                    line.clear();
                }
                let mut body = vec![0; content_length];
                reader.read_exact(&mut body).unwrap();

                seen.push(format!("{} | {}", request_line.trim_end(), authorization));
                stream.write_all(response.as_bytes()).unwrap();
            }
            seen
        });
        (format!("http://{}", addr), handle)
    }

    fn loopback_agent() -> ureq::Agent {
        let config = ureq::Agent::config_builder().proxy(None).build();
        ureq::Agent::new_with_config(config)
    }

    /// Client whose stored token looks valid locally and can be refreshed
    fn client_for(base: &str, dir: &Path) -> GmailClient {
        let token_path = dir.join("token.json");
        std::fs::write(
            &token_path,
            format!(
                r#"{{"access_token":"stale","refresh_token":"refresh-me","expires_at":{}}}"#,
                chrono::Utc::now().timestamp() + 3600
            ),
        )
        .unwrap();

        let auth = GmailAuth::new(
            GmailCredentials {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
            },
            token_path,
        )
        .with_token_url(format!("{}/token", base))
        .with_agent(loopback_agent());

        GmailClient::new(auth)
            .with_base_url(base)
            .with_agent(loopback_agent())
    }

    #[test]
    fn test_unauthorized_retries_once_with_renewed_token() {
        let (base, server) = serve_sequence(vec![
            UNAUTHORIZED.to_string(),
            json_response(r#"{"access_token":"renewed","expires_in":3600}"#),
            json_response(r#"{"threads":[{"id":"t1"}],"resultSizeEstimate":1}"#),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let client = client_for(&base, dir.path());

        let page = client.list_threads_page("from:jobs", 500, None).unwrap();
        let seen = server.join().unwrap();

        let threads = page.threads.unwrap();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].id, "t1");

        assert_eq!(seen.len(), 3);
        assert!(seen[0].starts_with("GET /users/me/threads?"));
        assert!(seen[0].ends_with("Bearer stale"));
        assert!(seen[1].starts_with("POST /token"));
        assert!(seen[2].starts_with("GET /users/me/threads?"));
        assert!(seen[2].ends_with("Bearer renewed"));
        let api_calls = seen.iter().filter(|s| s.starts_with("GET ")).count();
        assert_eq!(api_calls, 2);
    }

    #[test]
    fn test_second_unauthorized_is_auth_expired() {
        let (base, server) = serve_sequence(vec![
            UNAUTHORIZED.to_string(),
            json_response(r#"{"access_token":"renewed","expires_in":3600}"#),
            UNAUTHORIZED.to_string(),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let client = client_for(&base, dir.path());

        let err = client.get_message(&ThreadId::new("t1")).unwrap_err();
        let seen = server.join().unwrap();

        assert!(err.downcast_ref::<AuthExpiredError>().is_some());
        assert_eq!(seen.len(), 3);
        assert!(seen[2].starts_with("GET /users/me/messages/t1?format=full"));
    }

    #[test]
    fn test_other_http_errors_are_not_auth_expired() {
        let (base, server) = serve_sequence(vec![
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let client = client_for(&base, dir.path());

        let err = client.get_message(&ThreadId::new("gone")).unwrap_err();
        let seen = server.join().unwrap();

        assert!(err.downcast_ref::<AuthExpiredError>().is_none());
        assert_eq!(seen.len(), 1);
    }
}
