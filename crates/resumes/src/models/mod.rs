//! Domain models for the resume sync

mod log;
mod thread;
mod window;

pub use log::{LogEntry, SyncLog};
pub use thread::ThreadId;
pub use window::{
    DISPLAY_FORMAT, HOUR_STAMP_FORMAT, RunWindow, Timestamp, WindowError, format_hour_stamp,
    parse_hour_stamp,
};
