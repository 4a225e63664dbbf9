//! In-memory state store
//!
//! Used by tests and dry runs; nothing survives the process.

use anyhow::Result;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::StateStore;
use crate::models::{SyncLog, Timestamp};

/// In-memory implementation of StateStore that also counts saves
#[derive(Default)]
pub struct InMemoryStateStore {
    log: RwLock<SyncLog>,
    watermark: RwLock<Option<Timestamp>>,
    log_saves: AtomicUsize,
    watermark_saves: AtomicUsize,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with a log and watermark
    pub fn with_state(log: SyncLog, watermark: Option<Timestamp>) -> Self {
        Self {
            log: RwLock::new(log),
            watermark: RwLock::new(watermark),
            ..Self::default()
        }
    }

    /// Current persisted log
    pub fn log(&self) -> SyncLog {
        self.log.read().unwrap().clone()
    }

    /// Current persisted watermark
    pub fn watermark(&self) -> Option<Timestamp> {
        *self.watermark.read().unwrap()
    }

    pub fn log_saves(&self) -> usize {
        self.log_saves.load(Ordering::SeqCst)
    }

    pub fn watermark_saves(&self) -> usize {
        self.watermark_saves.load(Ordering::SeqCst)
    }
}

impl StateStore for InMemoryStateStore {
    fn load_log(&self) -> Result<SyncLog> {
        Ok(self.log())
    }

    fn save_log(&self, log: &SyncLog) -> Result<()> {
        *self.log.write().unwrap() = log.clone();
        self.log_saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load_watermark(&self) -> Result<Option<Timestamp>> {
        Ok(self.watermark())
    }

    fn save_watermark(&self, at: Timestamp) -> Result<()> {
        *self.watermark.write().unwrap() = Some(at);
        self.watermark_saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
