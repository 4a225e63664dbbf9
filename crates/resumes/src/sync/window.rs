//! Run window resolution

use chrono::FixedOffset;

use crate::models::{RunWindow, Timestamp, WindowError, parse_hour_stamp};

/// Resolve the window for a run
///
/// A blank or absent start falls back to `watermark`; a blank or absent end
/// falls back to `now`. Explicit inputs use the `dd mm yyyy HH` format.
pub fn resolve_window(
    start_input: Option<&str>,
    end_input: Option<&str>,
    watermark: Option<Timestamp>,
    now: Timestamp,
    offset: FixedOffset,
) -> Result<RunWindow, WindowError> {
    let start = match non_blank(start_input) {
        Some(text) => parse_input("start", text, offset)?,
        None => watermark
            .map(|at| at.with_timezone(&offset))
            .ok_or(WindowError::MissingStart)?,
    };

    let end = match non_blank(end_input) {
        Some(text) => parse_input("end", text, offset)?,
        None => now.with_timezone(&offset),
    };

    RunWindow::new(start, end)
}

fn non_blank(input: Option<&str>) -> Option<&str> {
    input.map(str::trim).filter(|s| !s.is_empty())
}

fn parse_input(field: &'static str, text: &str, offset: FixedOffset) -> Result<Timestamp, WindowError> {
    parse_hour_stamp(text, offset).ok_or_else(|| WindowError::InvalidFormat {
        field,
        value: text.to_string(),
    })
}
