//! State store trait definition

use anyhow::Result;

use crate::models::{SyncLog, Timestamp};

/// Persistence for the download log and the run watermark
///
/// A run loads both at start and writes each exactly once at the end, so
/// implementations only need whole-value reads and writes.
pub trait StateStore: Send + Sync {
    /// Load the download log; empty when nothing was saved yet
    fn load_log(&self) -> Result<SyncLog>;

    /// Replace the persisted log with `log`
    fn save_log(&self, log: &SyncLog) -> Result<()>;

    /// End of the last completed run's window, if any
    fn load_watermark(&self) -> Result<Option<Timestamp>>;

    /// Record the end of a completed run's window
    fn save_watermark(&self, at: Timestamp) -> Result<()>;
}
