//! Resume download
//!
//! One streaming GET per resume. Failures are logged and reported as `None`;
//! the caller decides what to skip.

use anyhow::{Context, Result};
use log::{debug, error, warn};
use regex::Regex;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Filename used when neither the response nor the URL provides one
const FALLBACK_FILE_NAME: &str = "resume";

/// `filename="..."` or `filename=...`
static DISPOSITION_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bfilename\s*=\s*(?:"([^"]*)"|([^;\s]+))"#).expect("valid filename regex")
});

/// RFC 6266 `filename*=charset'lang'percent-encoded`
static DISPOSITION_FILENAME_EXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bfilename\*\s*=\s*"?[^']*'[^']*'([^;\s"]+)"#)
        .expect("valid extended filename regex")
});

/// Downloads a resume into a destination directory
pub trait ResumeDownloader {
    /// Returns the written file's path, or `None` on any network or I/O failure
    fn download(&self, url: &str, destination_dir: &Path) -> Option<PathBuf>;
}

/// Blocking HTTP downloader
pub struct HttpDownloader {
    agent: ureq::Agent,
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpDownloader {
    pub fn new() -> Self {
        Self::with_agent(ureq::Agent::new_with_defaults())
    }

    pub fn with_agent(agent: ureq::Agent) -> Self {
        Self { agent }
    }

    fn try_download(&self, url: &str, destination_dir: &Path) -> Result<PathBuf> {
        let response = self
            .agent
            .get(url)
            .call()
            .with_context(|| format!("Request for {} failed", url))?;

        let disposition = response
            .headers()
            .get("content-disposition")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let file_name = resolve_file_name(disposition.as_deref(), url);

        fs::create_dir_all(destination_dir).with_context(|| {
            format!("Failed to create directory {}", destination_dir.display())
        })?;

        let path = destination_dir.join(&file_name);
        let mut file =
            File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
        let mut body = response.into_body().into_reader();

        if let Err(e) = io::copy(&mut body, &mut file) {
            drop(file);
            if let Err(remove_err) = fs::remove_file(&path) {
                warn!("Could not remove partial file {}: {}", path.display(), remove_err);
            }
            return Err(e).with_context(|| format!("Failed to write {}", path.display()));
        }

        debug!("Saved {} to {}", url, path.display());
        Ok(path)
    }
}

impl ResumeDownloader for HttpDownloader {
    fn download(&self, url: &str, destination_dir: &Path) -> Option<PathBuf> {
        match self.try_download(url, destination_dir) {
            Ok(path) => Some(path),
            Err(e) => {
                error!("Error downloading {}: {:#}", url, e);
                None
            }
        }
    }
}

/// Pick the file name for a download
///
/// The extended `filename*=` parameter wins, then `filename=`, then the last
/// URL path segment. Query strings and directory components are always
/// stripped; empty candidates fall through to the next source.
pub fn resolve_file_name(content_disposition: Option<&str>, url: &str) -> String {
    let disposition = content_disposition.unwrap_or_default();

    let extended = || {
        DISPOSITION_FILENAME_EXT
            .captures(disposition)
            .and_then(|caps| caps.get(1))
            .map(|m| percent_decode(m.as_str()))
    };
    let plain = || {
        DISPOSITION_FILENAME
            .captures(disposition)
            .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
            .map(|m| m.as_str().to_string())
    };
    let from_url = || {
        url::Url::parse(url)
            .ok()
            .and_then(|parsed| {
                parsed
                    .path_segments()
                    .and_then(|mut segments| segments.next_back().map(str::to_string))
            })
            .or_else(|| url.rsplit('/').next().map(str::to_string))
            .map(|segment| percent_decode(&segment))
    };

    extended()
        .and_then(|name| clean_file_name(&name))
        .or_else(|| plain().and_then(|name| clean_file_name(&name)))
        .or_else(|| from_url().and_then(|name| clean_file_name(&name)))
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}

fn percent_decode(value: &str) -> String {
    urlencoding::decode(value)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

fn clean_file_name(name: &str) -> Option<String> {
    let name = name.split('?').next().unwrap_or_default();
    let name = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let name = name.trim().trim_matches(['"', '\'']).trim();
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}
