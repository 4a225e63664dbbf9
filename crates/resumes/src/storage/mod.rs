//! Sync state persistence
//!
//! The `StateStore` trait hides where the download log and watermark live.
//! `FileStateStore` is the on-disk format; `InMemoryStateStore` backs tests.

mod file;
mod memory;
mod traits;

pub use file::{FileStateStore, LOG_DATE_FORMAT, LogFormatError};
pub use memory::InMemoryStateStore;
pub use traits::StateStore;
