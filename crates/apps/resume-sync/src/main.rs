//! resume-sync - download resumes from Gmail job-application notifications
//!
//! Each run picks up where the previous one stopped, files every resume under
//! its job post and records it in the download log.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{error, info, warn};
use resumes::gmail::{GmailAuth, GmailClient};
use resumes::models::{DISPLAY_FORMAT, format_hour_stamp};
use resumes::storage::{FileStateStore, StateStore};
use resumes::sync::{RunOptions, RunOutcome, StdinPrompt, SyncContext, run_sync};
use resumes::{GmailCredentials, HttpDownloader, SyncSettings};
use std::io::IsTerminal;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "resume-sync", version, about = "Download resumes from Gmail notifications")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (defaults to settings.json in the config directory)
    #[arg(long, global = true, env = "RESUME_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download new resumes
    Run(RunArgs),
    /// Show the watermark and download log summary
    Status,
    /// Forget the stored Gmail token
    Logout,
    /// Write a default settings file
    InitConfig,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Start of the window (dd mm yyyy HH); defaults to the last run
    #[arg(long)]
    start: Option<String>,
    /// End of the window (dd mm yyyy HH); defaults to now
    #[arg(long)]
    end: Option<String>,
    /// Re-download resumes already logged in the window. Unattended runs
    /// need this: the last-run stamp keeps only the hour, so the next window
    /// usually overlaps resumes logged late in the previous run.
    #[arg(long, conflicts_with = "no")]
    yes: bool,
    /// Never re-download resumes already logged in the window
    #[arg(long)]
    no: bool,
    /// Folder receiving one sub-folder per job post
    #[arg(long)]
    download_dir: Option<PathBuf>,
    /// Sender address to search for
    #[arg(long)]
    sender: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();

    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    match cli.command {
        Commands::Run(args) => run(cli.config, args),
        Commands::Status => status(cli.config),
        Commands::Logout => logout(cli.config),
        Commands::InitConfig => init_config(cli.config),
    }
}

fn state_store(settings: &SyncSettings) -> Result<FileStateStore> {
    Ok(FileStateStore::new(
        settings.log_path()?,
        settings.watermark_path()?,
        settings.offset()?,
    ))
}

fn gmail_auth(settings: &SyncSettings) -> Result<GmailAuth> {
    let credentials = match GmailCredentials::load() {
        Ok(credentials) => credentials,
        Err(e) => {
            if let Some(path) = GmailCredentials::default_credentials_path() {
                warn!(
                    "No Gmail OAuth client found. Save the console's client secret as {} \
                     or export GMAIL_CLIENT_ID and GMAIL_CLIENT_SECRET.",
                    path.display()
                );
            }
            return Err(e);
        }
    };
    Ok(GmailAuth::new(credentials, settings.token_path()?))
}

fn run(config_path: Option<PathBuf>, args: RunArgs) -> Result<()> {
    let mut settings = SyncSettings::load(config_path.as_deref())?;
    if let Some(dir) = args.download_dir {
        settings.download_dir = dir;
    }
    if let Some(sender) = args.sender {
        settings.sender = sender;
    }

    let client = GmailClient::new(gmail_auth(&settings)?);
    let store = state_store(&settings)?;
    let downloader = HttpDownloader::new();
    let ctx = SyncContext {
        api: &client,
        store: &store,
        downloader: &downloader,
        settings: &settings,
    };

    let options = RunOptions {
        start: args.start,
        end: args.end,
        overwrite: match (args.yes, args.no) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        },
        interactive: std::io::stdin().is_terminal(),
    };

    match run_sync(&ctx, &mut StdinPrompt, &options)? {
        RunOutcome::Completed(report) => {
            if !report.complete {
                warn!("Some threads could not be listed; rerun to pick them up");
            }
            println!(
                "Completed! Downloaded {} new resume files.",
                report.downloaded
            );
        }
        RunOutcome::Aborted(reason) => {
            info!("Run aborted: {}", reason);
            println!("Nothing downloaded: {}", reason);
        }
    }
    Ok(())
}

fn status(config_path: Option<PathBuf>) -> Result<()> {
    let settings = SyncSettings::load(config_path.as_deref())?;
    let store = state_store(&settings)?;
    let log = store.load_log()?;
    let watermark = store.load_watermark()?;

    println!("Log file:      {}", store.log_path().display());
    println!(
        "Last run:      {}",
        watermark
            .map(|at| format_hour_stamp(&at))
            .unwrap_or_else(|| "never".to_string())
    );
    println!("Resumes:       {}", log.len());
    if let Some(latest) = log.latest_received() {
        println!("Latest:        {}", latest.format(DISPLAY_FORMAT));
    }
    for (job_post, count) in log.counts_by_job_post() {
        println!("  {:<40} {}", job_post, count);
    }
    Ok(())
}

fn logout(config_path: Option<PathBuf>) -> Result<()> {
    let settings = SyncSettings::load(config_path.as_deref())?;
    let auth = gmail_auth(&settings)?;
    if auth.logout()? {
        println!("Removed token at {}", auth.token_path().display());
    } else {
        println!("No stored token");
    }
    Ok(())
}

fn init_config(config_path: Option<PathBuf>) -> Result<()> {
    let path = match config_path {
        Some(path) => path,
        None => config::config_path(resumes::config::SETTINGS_FILE)
            .context("Could not determine config directory")?,
    };
    if path.exists() {
        println!("Settings already exist at {}", path.display());
        return Ok(());
    }
    config::save_json_file(&path, &SyncSettings::default())?;
    println!("Wrote default settings to {}", path.display());
    Ok(())
}
