//! Download log: one row per resume fetched, keyed by thread

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::{RunWindow, ThreadId, Timestamp};

/// A successfully downloaded resume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Thread the resume came from
    pub thread_id: ThreadId,
    /// Date header of the notification email
    pub received_at: Timestamp,
    /// Name of the file written under the job-post folder
    pub file_name: String,
    /// Sanitized job-post label, also the folder name
    pub job_post: String,
}

/// Ordered collection of log entries with at most one entry per thread
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncLog {
    entries: Vec<LogEntry>,
    ids: HashSet<ThreadId>,
}

impl SyncLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a log from loaded rows. Later rows for an already-seen thread are dropped.
    pub fn from_entries(entries: impl IntoIterator<Item = LogEntry>) -> Self {
        let mut log = Self::new();
        for entry in entries {
            log.push(entry);
        }
        log
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, thread_id: &ThreadId) -> bool {
        self.ids.contains(thread_id)
    }

    /// Append an entry. Returns false (and leaves the log untouched) when the
    /// thread is already logged.
    pub fn push(&mut self, entry: LogEntry) -> bool {
        if !self.ids.insert(entry.thread_id.clone()) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Entries whose received date falls inside `window`
    pub fn entries_in(&self, window: &RunWindow) -> Vec<&LogEntry> {
        self.entries
            .iter()
            .filter(|e| window.contains(&e.received_at))
            .collect()
    }

    /// Remove every entry inside `window` so those threads can be downloaded again
    pub fn drop_window(&mut self, window: &RunWindow) -> usize {
        let before = self.entries.len();
        let ids = &mut self.ids;
        self.entries.retain(|e| {
            let keep = !window.contains(&e.received_at);
            if !keep {
                ids.remove(&e.thread_id);
            }
            keep
        });
        before - self.entries.len()
    }

    pub fn latest_received(&self) -> Option<Timestamp> {
        self.entries.iter().map(|e| e.received_at).max()
    }

    pub fn counts_by_job_post(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.job_post.as_str()).or_insert(0) += 1;
        }
        counts
    }
}
