//! Resumes crate - incremental resume sync from Gmail notifications
//!
//! This crate provides:
//! - Gmail OAuth credential handling and a blocking API client
//! - Lazy, paginated thread enumeration for a sender and time window
//! - Extraction of the received date, resume link and job post from a message
//! - Resume download into per-job-post folders
//! - A CSV download log and watermark for deduplicated, incremental runs
//! - The run orchestrator tying these together

pub mod config;
pub mod download;
pub mod extract;
pub mod gmail;
pub mod models;
pub mod query;
pub mod storage;
pub mod sync;

pub use config::{GmailCredentials, SyncSettings};
pub use download::{HttpDownloader, ResumeDownloader};
pub use extract::{ExtractedResume, ExtractionRules, Extractor};
pub use gmail::{AuthExpiredError, GmailAuth, GmailClient, MailApi};
pub use models::{LogEntry, RunWindow, SyncLog, ThreadId, Timestamp, WindowError};
pub use query::{ThreadPages, list_threads};
pub use storage::{FileStateStore, InMemoryStateStore, StateStore};
pub use sync::{
    AbortReason, Prompt, RunOptions, RunOutcome, RunReport, ScriptedPrompt, StdinPrompt,
    SyncContext, run_sync,
};
