//! Run window and the timestamp formats shared by prompts and state files

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use std::fmt;

/// Timezone-aware timestamp, always expressed in the configured offset
pub type Timestamp = DateTime<FixedOffset>;

/// Format used for prompts and the watermark file (`dd mm yyyy HH`)
pub const HOUR_STAMP_FORMAT: &str = "%d %m %Y %H";

/// Human-readable format used in log lines and prompts
pub const DISPLAY_FORMAT: &str = "%d %B %Y %H:%M";

/// Errors produced while resolving a run window
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WindowError {
    #[error("no start date given and no previous run recorded")]
    MissingStart,
    #[error("invalid {field} date '{value}', expected dd mm yyyy hh")]
    InvalidFormat { field: &'static str, value: String },
    #[error("start {start} must be before end {end}")]
    Empty { start: String, end: String },
}

/// Time range processed by one run, inclusive on both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunWindow {
    start: Timestamp,
    end: Timestamp,
}

impl RunWindow {
    /// Create a window, rejecting `start >= end`
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self, WindowError> {
        if start >= end {
            return Err(WindowError::Empty {
                start: start.format(DISPLAY_FORMAT).to_string(),
                end: end.format(DISPLAY_FORMAT).to_string(),
            });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    pub fn end(&self) -> Timestamp {
        self.end
    }

    /// Whether `at` falls inside the window (both ends inclusive)
    pub fn contains(&self, at: &Timestamp) -> bool {
        self.start <= *at && *at <= self.end
    }
}

impl fmt::Display for RunWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {}",
            self.start.format(DISPLAY_FORMAT),
            self.end.format(DISPLAY_FORMAT)
        )
    }
}

/// Parse a `dd mm yyyy HH` stamp in the given offset
pub fn parse_hour_stamp(input: &str, offset: FixedOffset) -> Option<Timestamp> {
    let parts: Vec<&str> = input.split_whitespace().collect();
    let [day, month, year, hour] = parts.as_slice() else {
        return None;
    };

    let date = NaiveDate::parse_from_str(&format!("{day} {month} {year}"), "%d %m %Y").ok()?;
    let hour: u32 = hour.parse().ok()?;
    let naive = date.and_hms_opt(hour, 0, 0)?;
    offset.from_local_datetime(&naive).single()
}

/// Format a timestamp as a `dd mm yyyy HH` stamp
pub fn format_hour_stamp(at: &Timestamp) -> String {
    at.format(HOUR_STAMP_FORMAT).to_string()
}
