//! One sync run
//!
//! Authenticate, resolve the window, reconcile it with the download log,
//! walk the matching threads and download each resume, then persist the log
//! and watermark once.

use anyhow::{Context, Result};
use chrono::Utc;
use log::{debug, error, info, warn};
use std::fmt;
use std::path::PathBuf;

use super::prompt::{Prompt, is_yes};
use super::timing::PolitenessDelay;
use super::window::resolve_window;
use crate::config::SyncSettings;
use crate::download::ResumeDownloader;
use crate::extract::Extractor;
use crate::gmail::{AuthExpiredError, MailApi};
use crate::models::{
    DISPLAY_FORMAT, LogEntry, RunWindow, SyncLog, ThreadId, WindowError, format_hour_stamp,
};
use crate::query::list_threads;
use crate::storage::StateStore;

/// Collaborators for a run
pub struct SyncContext<'a> {
    pub api: &'a dyn MailApi,
    pub store: &'a dyn StateStore,
    pub downloader: &'a dyn ResumeDownloader,
    pub settings: &'a SyncSettings,
}

/// Per-run choices; `None` fields are asked through the prompt
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Start stamp (`dd mm yyyy HH`); blank means "use the watermark"
    pub start: Option<String>,
    /// End stamp (`dd mm yyyy HH`); blank means "now"
    pub end: Option<String>,
    /// Answer to the re-download question
    pub overwrite: Option<bool>,
    /// When false, missing answers are never asked: dates fall back to their
    /// defaults and the re-download question is declined
    pub interactive: bool,
}

/// Why a run stopped before touching any state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    Window(WindowError),
    OverwriteDeclined { existing: usize },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Window(e) => write!(f, "{}", e),
            Self::OverwriteDeclined { existing } => write!(
                f,
                "{} resume(s) already downloaded in this window and re-download was declined",
                existing
            ),
        }
    }
}

/// Counters for a completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub window: RunWindow,
    /// Resumes downloaded and logged
    pub downloaded: usize,
    /// Threads skipped because the log already had them
    pub already_logged: usize,
    /// Threads without a usable date, body or link
    pub skipped: usize,
    /// Threads whose resume download failed
    pub failed_downloads: usize,
    /// Threads that failed for any other reason
    pub errors: usize,
    /// Log entries dropped for re-download
    pub dropped: usize,
    /// False when thread listing stopped early; the watermark is then kept
    pub complete: bool,
    /// Files written this run
    pub files: Vec<PathBuf>,
}

impl RunReport {
    fn new(window: RunWindow) -> Self {
        Self {
            window,
            downloaded: 0,
            already_logged: 0,
            skipped: 0,
            failed_downloads: 0,
            errors: 0,
            dropped: 0,
            complete: true,
            files: Vec::new(),
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunReport),
    Aborted(AbortReason),
}

enum ThreadOutcome {
    Downloaded(LogEntry, PathBuf),
    Skipped,
    DownloadFailed,
}

/// Whether an error must end the run instead of just the current thread
fn is_fatal(e: &anyhow::Error) -> bool {
    e.downcast_ref::<AuthExpiredError>().is_some()
}

/// Execute one run
///
/// Returns `Err` only for fatal problems (authorization, state I/O). Invalid
/// windows and a declined re-download end in `RunOutcome::Aborted` without
/// writing anything.
pub fn run_sync(
    ctx: &SyncContext<'_>,
    prompt: &mut dyn Prompt,
    options: &RunOptions,
) -> Result<RunOutcome> {
    let settings = ctx.settings;
    let offset = settings.offset()?;
    let extractor = Extractor::new(settings.extraction_rules()?, offset);
    let delay = PolitenessDelay::new(settings.delay_ms_min, settings.delay_ms_max);

    ctx.api.authenticate()?;
    info!("Gmail session ready");

    let mut log = ctx.store.load_log().context("Failed to load download log")?;
    info!("Loaded {} log entries", log.len());
    let watermark = ctx.store.load_watermark().context("Failed to load watermark")?;

    let start_input = answer_or_ask(
        prompt,
        options.start.as_deref(),
        options.interactive,
        &format!(
            "Start date (dd mm yyyy hh), blank for last run [{}]:",
            watermark
                .map(|w| format_hour_stamp(&w))
                .unwrap_or_else(|| "none".to_string())
        ),
    )?;
    let end_input = answer_or_ask(
        prompt,
        options.end.as_deref(),
        options.interactive,
        "End date (dd mm yyyy hh), blank for now:",
    )?;

    let now = Utc::now().with_timezone(&offset);
    let window = match resolve_window(
        start_input.as_deref(),
        end_input.as_deref(),
        watermark,
        now,
        offset,
    ) {
        Ok(window) => window,
        Err(e) => {
            error!("Cannot run: {}", e);
            return Ok(RunOutcome::Aborted(AbortReason::Window(e)));
        }
    };
    info!("Processing emails from {}", window);

    let mut report = RunReport::new(window);

    let existing = log.entries_in(&window).len();
    if existing > 0 {
        let latest = log
            .latest_received()
            .map(|at| at.format(DISPLAY_FORMAT).to_string())
            .unwrap_or_default();
        let question = format!(
            "Resumes have been downloaded up to {}. {} of them fall between {}. Re-download them? [y/N]:",
            latest, existing, window
        );
        let confirmed = match options.overwrite {
            Some(answer) => answer,
            None if options.interactive => is_yes(&prompt.ask(&question)?),
            None => {
                // The watermark only keeps the hour, so a window that starts
                // from it usually overlaps the tail of the previous run.
                warn!(
                    "{} logged resume(s) fall between {}; not re-downloading without confirmation. \
                     Unattended runs need an explicit overwrite answer.",
                    existing, window
                );
                false
            }
        };
        if !confirmed {
            info!("Re-download declined, nothing to do");
            return Ok(RunOutcome::Aborted(AbortReason::OverwriteDeclined { existing }));
        }
        report.dropped = log.drop_window(&window);
        info!("Dropped {} log entries for re-download", report.dropped);
    }

    let threads = list_threads(ctx.api, &settings.sender, &window);
    info!("Gmail query: {}", threads.query());

    for item in threads {
        let thread = match item {
            Ok(thread) => thread,
            Err(e) => {
                if is_fatal(&e) {
                    save_partial(ctx.store, &log);
                    return Err(e);
                }
                warn!("Stopping enumeration early: {:#}", e);
                report.complete = false;
                break;
            }
        };

        let thread_id = ThreadId::new(thread.id);
        if log.contains(&thread_id) {
            debug!("Thread {} already logged, skipping", thread_id);
            report.already_logged += 1;
            continue;
        }

        match process_thread(ctx, &extractor, &window, &thread_id) {
            Ok(ThreadOutcome::Downloaded(entry, path)) => {
                report.downloaded += 1;
                info!(
                    "{}. Downloaded '{}' for '{}'",
                    report.downloaded, entry.file_name, entry.job_post
                );
                log.push(entry);
                report.files.push(path);
                delay.pause();
            }
            Ok(ThreadOutcome::Skipped) => report.skipped += 1,
            Ok(ThreadOutcome::DownloadFailed) => {
                warn!("Thread {}: resume download failed, not logged", thread_id);
                report.failed_downloads += 1;
            }
            Err(e) if is_fatal(&e) => {
                save_partial(ctx.store, &log);
                return Err(e);
            }
            Err(e) => {
                error!("Error processing thread {}: {:#}", thread_id, e);
                report.errors += 1;
            }
        }
    }

    ctx.store.save_log(&log).context("Failed to save download log")?;
    if report.complete {
        ctx.store
            .save_watermark(window.end())
            .context("Failed to save watermark")?;
        info!("Watermark set to {}", format_hour_stamp(&window.end()));
    } else {
        warn!("Thread listing was incomplete; watermark left unchanged");
    }

    info!(
        "Completed: {} downloaded, {} already logged, {} skipped, {} failed downloads, {} errors",
        report.downloaded,
        report.already_logged,
        report.skipped,
        report.failed_downloads,
        report.errors
    );
    Ok(RunOutcome::Completed(report))
}

/// Use the given answer, or ask when allowed
fn answer_or_ask(
    prompt: &mut dyn Prompt,
    given: Option<&str>,
    interactive: bool,
    question: &str,
) -> Result<Option<String>> {
    match given {
        Some(answer) => Ok(Some(answer.to_string())),
        None if interactive => prompt.ask(question).map(Some),
        None => Ok(None),
    }
}

/// Extract, download and build the log entry for one thread
fn process_thread(
    ctx: &SyncContext<'_>,
    extractor: &Extractor,
    window: &RunWindow,
    thread_id: &ThreadId,
) -> Result<ThreadOutcome> {
    let Some(resume) = extractor.extract(ctx.api, thread_id, window)? else {
        return Ok(ThreadOutcome::Skipped);
    };

    let destination = ctx.settings.download_dir.join(&resume.job_post);
    let Some(path) = ctx.downloader.download(&resume.resume_url, &destination) else {
        return Ok(ThreadOutcome::DownloadFailed);
    };

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(ThreadOutcome::Downloaded(
        LogEntry {
            thread_id: thread_id.clone(),
            received_at: resume.received_at,
            file_name,
            job_post: resume.job_post,
        },
        path,
    ))
}

/// Persist what was accumulated before a fatal error
fn save_partial(store: &dyn StateStore, log: &SyncLog) {
    match store.save_log(log) {
        Ok(()) => warn!("Saved {} log entries before aborting", log.len()),
        Err(e) => error!("Failed to save download log before aborting: {:#}", e),
    }
}
