//! Runtime configuration
//!
//! The OAuth client comes from build-time variables, `client_secret.json` in
//! the config directory, or `GMAIL_CLIENT_ID`/`GMAIL_CLIENT_SECRET`, first
//! match wins.
//!
//! Sync settings come from `settings.json` in the config directory, with every
//! field defaulted so a missing or partial file is fine.

use anyhow::{Context, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::extract::ExtractionRules;

/// Credentials filename in the config directory
const CREDENTIALS_FILE: &str = "client_secret.json";

/// Settings filename in the config directory
pub const SETTINGS_FILE: &str = "settings.json";

/// OAuth client registered for the Gmail API
#[derive(Debug, Clone)]
pub struct GmailCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// `client_secret.json` as downloaded from Google Cloud Console
#[derive(Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSection>,
    web: Option<ClientSection>,
}

#[derive(Deserialize)]
struct ClientSection {
    client_id: String,
    client_secret: String,
}

impl ClientSecretFile {
    fn into_credentials(self) -> Result<GmailCredentials> {
        let section = self
            .installed
            .or(self.web)
            .context("client secret file has neither an 'installed' nor a 'web' client")?;
        Ok(GmailCredentials {
            client_id: section.client_id,
            client_secret: section.client_secret,
        })
    }
}

impl GmailCredentials {
    pub fn load() -> Result<Self> {
        if let Some(credentials) = Self::from_compile_time() {
            return Ok(credentials);
        }
        if config::config_exists(CREDENTIALS_FILE) {
            return config::load_json::<ClientSecretFile>(CREDENTIALS_FILE)?.into_credentials();
        }
        Self::from_env()
    }

    /// Client baked in with `GOOGLE_CLIENT_ID`/`GOOGLE_CLIENT_SECRET` at build time
    pub fn from_compile_time() -> Option<Self> {
        match (option_env!("GOOGLE_CLIENT_ID"), option_env!("GOOGLE_CLIENT_SECRET")) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => Some(Self {
                client_id: id.to_string(),
                client_secret: secret.to_string(),
            }),
            _ => None,
        }
    }

    /// Parse the contents of a `client_secret.json`
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str::<ClientSecretFile>(json)
            .context("Failed to parse client secret JSON")?
            .into_credentials()
    }

    pub fn from_env() -> Result<Self> {
        let var = |name: &str| std::env::var(name).with_context(|| format!("{} is not set", name));
        Ok(Self {
            client_id: var("GMAIL_CLIENT_ID")?,
            client_secret: var("GMAIL_CLIENT_SECRET")?,
        })
    }

    /// Where `load` looks for `client_secret.json`
    pub fn default_credentials_path() -> Option<PathBuf> {
        config::config_path(CREDENTIALS_FILE)
    }
}

/// Settings for a sync run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Sender address used in the Gmail query
    pub sender: String,
    /// Root folder that receives one sub-folder per job post
    pub download_dir: PathBuf,
    /// Download log (CSV); relative paths resolve against the config directory
    pub log_file: PathBuf,
    /// Watermark file; relative paths resolve against the config directory
    pub watermark_file: PathBuf,
    /// OAuth token file; relative paths resolve against the config directory
    pub token_file: PathBuf,
    /// Offset every timestamp is expressed in, e.g. `+05:30`
    pub utc_offset: String,
    /// Substring identifying the resume link in the email HTML
    pub link_marker: String,
    /// Pattern applied to the snippet; capture group 1 is the job post
    pub job_post_pattern: String,
    /// Folder used when no job post can be derived
    pub placeholder_job_post: String,
    /// Lower bound of the pause after each download
    pub delay_ms_min: u64,
    /// Upper bound of the pause after each download
    pub delay_ms_max: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            sender: "jobs-listings@linkedin.com".to_string(),
            download_dir: PathBuf::from("Downloaded_Resumes"),
            log_file: PathBuf::from("resume-log.csv"),
            watermark_file: PathBuf::from("last-run.txt"),
            token_file: PathBuf::from("gmail-token.json"),
            utc_offset: "+05:30".to_string(),
            link_marker: "download_resume".to_string(),
            job_post_pattern: r"has a new applicant for (.*?)(?: \(.+\))?,".to_string(),
            placeholder_job_post: "Unknown_Job_Post".to_string(),
            delay_ms_min: 500,
            delay_ms_max: 1500,
        }
    }
}

impl SyncSettings {
    /// Load settings from `path`, or from the config directory when `path` is None.
    /// A missing default settings file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => config::load_json_file(path),
            None if config::config_exists(SETTINGS_FILE) => config::load_json(SETTINGS_FILE),
            None => Ok(Self::default()),
        }
    }

    /// Parsed `utc_offset`
    pub fn offset(&self) -> Result<FixedOffset> {
        self.utc_offset
            .parse::<FixedOffset>()
            .with_context(|| format!("Invalid utc_offset '{}', expected e.g. +05:30", self.utc_offset))
    }

    /// Extraction heuristics built from these settings
    pub fn extraction_rules(&self) -> Result<ExtractionRules> {
        ExtractionRules::new(
            &self.link_marker,
            &self.job_post_pattern,
            &self.placeholder_job_post,
        )
    }

    pub fn log_path(&self) -> Result<PathBuf> {
        resolve_state_path(&self.log_file)
    }

    pub fn watermark_path(&self) -> Result<PathBuf> {
        resolve_state_path(&self.watermark_file)
    }

    pub fn token_path(&self) -> Result<PathBuf> {
        resolve_state_path(&self.token_file)
    }
}

/// Resolve a relative state file against the config directory
fn resolve_state_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    config::config_path(&path.to_string_lossy()).context("Could not determine config directory")
}
