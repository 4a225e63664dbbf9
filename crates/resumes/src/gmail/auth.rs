//! Gmail OAuth2 credential provider
//!
//! The first run sends the user through the installed-app consent screen and
//! catches the redirect on a loopback port. The resulting token is kept in a
//! JSON file; later runs reuse it while it is fresh and renew it with the
//! refresh grant afterwards.

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};

use crate::config::GmailCredentials;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

/// Loopback ports tried, in order, for the consent redirect
const CALLBACK_PORTS: std::ops::RangeInclusive<u16> = 8080..=8090;

/// Seconds of remaining validity below which a stored token is renewed
const EXPIRY_MARGIN_SECS: i64 = 300;

/// Gmail access tokens backed by a token file
pub struct GmailAuth {
    credentials: GmailCredentials,
    token_path: PathBuf,
    token_url: String,
    agent: ureq::Agent,
}

/// Token file contents
#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
}

impl StoredToken {
    fn is_fresh(&self, now: i64) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at > now + EXPIRY_MARGIN_SECS)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
}

impl GmailAuth {
    pub fn new(credentials: GmailCredentials, token_path: impl Into<PathBuf>) -> Self {
        Self {
            credentials,
            token_path: token_path.into(),
            token_url: TOKEN_URL.to_string(),
            agent: ureq::Agent::new_with_defaults(),
        }
    }

    /// Send token requests to another endpoint
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    pub fn with_agent(mut self, agent: ureq::Agent) -> Self {
        self.agent = agent;
        self
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    /// Stored token if still fresh, otherwise a renewed one
    pub fn access_token(&self) -> Result<String> {
        if let Ok(token) = self.load_token()
            && token.is_fresh(chrono::Utc::now().timestamp())
        {
            return Ok(token.access_token);
        }
        self.reauthenticate()
    }

    /// Obtain a new access token regardless of the stored expiry
    ///
    /// Tries the refresh grant first and falls back to the consent flow.
    pub fn reauthenticate(&self) -> Result<String> {
        let refresh_token = self.load_token().ok().and_then(|t| t.refresh_token);

        if let Some(refresh_token) = refresh_token {
            match self.refresh(&refresh_token) {
                Ok(token) => {
                    self.save_token_response(&token)?;
                    info!("Refreshed Gmail access token");
                    return Ok(token.access_token);
                }
                Err(e) => warn!("Token refresh failed, asking for consent again: {:#}", e),
            }
        }

        let token = self.consent_flow()?;
        self.save_token_response(&token)?;
        Ok(token.access_token)
    }

    /// Forget the stored token; returns whether one existed
    pub fn logout(&self) -> Result<bool> {
        match fs::remove_file(&self.token_path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to remove token file {}", self.token_path.display())
            }),
        }
    }

    fn consent_url(&self, redirect_uri: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent",
            AUTH_URL,
            urlencoding::encode(&self.credentials.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(READONLY_SCOPE),
        )
    }

    fn consent_flow(&self) -> Result<TokenResponse> {
        let (listener, port) = bind_callback_port()?;
        let redirect_uri = format!("http://localhost:{}", port);
        let url = self.consent_url(&redirect_uri);

        println!("Gmail needs your permission to read resume notifications.");
        println!("Approve access in the browser window, or open: {}", url);
        if let Err(e) = open::that(&url) {
            warn!("Could not launch a browser: {}", e);
        }

        let (stream, _) = listener
            .accept()
            .context("Failed to accept the consent redirect")?;
        let code = read_consent_code(stream)?;

        let token = self
            .request_token(&[
                ("code", code.as_str()),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri.as_str()),
            ])
            .context("Failed to exchange authorization code")?;
        info!("Gmail access granted");
        Ok(token)
    }

    fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        let mut token = self.request_token(&[
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])?;
        // Refresh responses usually omit the refresh token
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }
        Ok(token)
    }

    /// POST a grant to the token endpoint along with the client credentials
    fn request_token(&self, grant: &[(&str, &str)]) -> Result<TokenResponse> {
        let mut form = vec![
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
        ];
        form.extend_from_slice(grant);

        let mut response = self
            .agent
            .post(&self.token_url)
            .send_form(form)
            .context("Token request failed")?;
        response
            .body_mut()
            .read_json()
            .context("Failed to parse token response")
    }

    fn load_token(&self) -> Result<StoredToken> {
        let content = fs::read_to_string(&self.token_path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save_token_response(&self, token: &TokenResponse) -> Result<()> {
        let stored = StoredToken {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            expires_at: token
                .expires_in
                .map(|secs| chrono::Utc::now().timestamp() + secs as i64),
        };
        config::save_json_file(&self.token_path, &stored)
            .with_context(|| format!("Failed to write token file {}", self.token_path.display()))
    }
}

fn bind_callback_port() -> Result<(TcpListener, u16)> {
    CALLBACK_PORTS
        .find_map(|port| {
            TcpListener::bind(("127.0.0.1", port))
                .ok()
                .map(|listener| (listener, port))
        })
        .with_context(|| {
            format!(
                "No free callback port between {} and {}",
                CALLBACK_PORTS.start(),
                CALLBACK_PORTS.end()
            )
        })
}

/// Read the redirect request, answer the browser and return the code
fn read_consent_code(mut stream: TcpStream) -> Result<String> {
    let mut request_line = String::new();
    BufReader::new(&stream)
        .read_line(&mut request_line)
        .context("Failed to read the consent redirect")?;

    let code = callback_param(&request_line, "code");
    let page = match code {
        Some(_) => "Access granted. You can return to the terminal.",
        None => "Access was not granted.",
    };
    let reply = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        page.len(),
        page
    );
    if let Err(e) = stream.write_all(reply.as_bytes()) {
        warn!("Could not answer the browser: {}", e);
    }

    if let Some(error) = callback_param(&request_line, "error") {
        anyhow::bail!("Consent was refused: {}", error);
    }
    code.context("Consent redirect carried no authorization code")
}

/// Query parameter from an HTTP request line (`GET /?code=..&scope=.. HTTP/1.1`)
fn callback_param(request_line: &str, name: &str) -> Option<String> {
    let target = request_line.split_whitespace().nth(1)?;
    let (_, query) = target.split_once('?')?;
    query.split('&').find_map(|param| {
        let (key, value) = param.split_once('=')?;
        (key == name).then(|| {
            urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string())
        })
    })
}
