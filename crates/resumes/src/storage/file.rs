//! File-backed state: a CSV download log and a one-line watermark file

use anyhow::{Context, Result};
use chrono::{FixedOffset, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::StateStore;
use crate::models::{LogEntry, SyncLog, ThreadId, Timestamp, format_hour_stamp, parse_hour_stamp};

/// Format of the `Date Received` column
pub const LOG_DATE_FORMAT: &str = "%d-%m-%Y %H:%M";

const LOG_HEADERS: [&str; 4] = ["Thread ID", "Date Received", "File Name", "Job Post"];

/// A log row that cannot be turned back into an entry
#[derive(Debug, thiserror::Error)]
pub enum LogFormatError {
    #[error("log row {row}: invalid Date Received '{value}', expected dd-mm-yyyy HH:MM")]
    InvalidDate { row: usize, value: String },
    #[error("log row {row}: empty Thread ID")]
    MissingThreadId { row: usize },
}

/// One CSV row, column names as they appear in the file
#[derive(Debug, Serialize, Deserialize)]
struct LogRow {
    #[serde(rename = "Thread ID")]
    thread_id: String,
    #[serde(rename = "Date Received")]
    date_received: String,
    #[serde(rename = "File Name")]
    file_name: String,
    #[serde(rename = "Job Post")]
    job_post: String,
}

impl LogRow {
    fn from_entry(entry: &LogEntry, offset: FixedOffset) -> Self {
        Self {
            thread_id: entry.thread_id.to_string(),
            date_received: entry
                .received_at
                .with_timezone(&offset)
                .format(LOG_DATE_FORMAT)
                .to_string(),
            file_name: entry.file_name.clone(),
            job_post: entry.job_post.clone(),
        }
    }

    fn into_entry(self, row: usize, offset: FixedOffset) -> Result<LogEntry, LogFormatError> {
        let thread_id = self.thread_id.trim();
        if thread_id.is_empty() {
            return Err(LogFormatError::MissingThreadId { row });
        }

        let received_at = NaiveDateTime::parse_from_str(self.date_received.trim(), LOG_DATE_FORMAT)
            .ok()
            .and_then(|naive| offset.from_local_datetime(&naive).single())
            .ok_or_else(|| LogFormatError::InvalidDate {
                row,
                value: self.date_received.clone(),
            })?;

        Ok(LogEntry {
            thread_id: ThreadId::new(thread_id),
            received_at,
            file_name: self.file_name,
            job_post: self.job_post,
        })
    }
}

/// State kept in two plain files
pub struct FileStateStore {
    log_path: PathBuf,
    watermark_path: PathBuf,
    offset: FixedOffset,
}

impl FileStateStore {
    pub fn new(
        log_path: impl Into<PathBuf>,
        watermark_path: impl Into<PathBuf>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            log_path: log_path.into(),
            watermark_path: watermark_path.into(),
            offset,
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn watermark_path(&self) -> &Path {
        &self.watermark_path
    }
}

/// Write `path` by renaming a sibling temp file over it
fn replace_file(path: &Path, write: impl FnOnce(&Path) -> Result<()>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    write(&tmp)?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))
}

impl StateStore for FileStateStore {
    fn load_log(&self) -> Result<SyncLog> {
        if !self.log_path.exists() {
            return Ok(SyncLog::new());
        }

        let mut reader = csv::Reader::from_path(&self.log_path)
            .with_context(|| format!("Failed to open log {}", self.log_path.display()))?;

        let mut entries = Vec::new();
        for (index, row) in reader.deserialize::<LogRow>().enumerate() {
            // Row numbers count the header as row 1
            let row_number = index + 2;
            let row = row.with_context(|| {
                format!("Failed to read row {} of {}", row_number, self.log_path.display())
            })?;
            entries.push(row.into_entry(row_number, self.offset)?);
        }

        Ok(SyncLog::from_entries(entries))
    }

    fn save_log(&self, log: &SyncLog) -> Result<()> {
        replace_file(&self.log_path, |tmp| {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_path(tmp)
                .with_context(|| format!("Failed to create {}", tmp.display()))?;
            writer.write_record(LOG_HEADERS)?;
            for entry in log.entries() {
                writer.serialize(LogRow::from_entry(entry, self.offset))?;
            }
            writer.flush()?;
            Ok(())
        })
    }

    fn load_watermark(&self) -> Result<Option<Timestamp>> {
        if !self.watermark_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.watermark_path).with_context(|| {
            format!("Failed to read watermark {}", self.watermark_path.display())
        })?;
        let content = content.trim();
        if content.is_empty() {
            return Ok(None);
        }

        parse_hour_stamp(content, self.offset).map(Some).with_context(|| {
            format!(
                "Malformed watermark '{}' in {}, expected dd mm yyyy hh",
                content,
                self.watermark_path.display()
            )
        })
    }

    fn save_watermark(&self, at: Timestamp) -> Result<()> {
        let line = format_hour_stamp(&at.with_timezone(&self.offset));
        replace_file(&self.watermark_path, |tmp| {
            fs::write(tmp, format!("{}\n", line))
                .with_context(|| format!("Failed to write {}", tmp.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(19800).unwrap()
    }

    fn store_in(dir: &Path) -> FileStateStore {
        FileStateStore::new(dir.join("log.csv"), dir.join("last-run.txt"), ist())
    }

    fn at(text: &str) -> Timestamp {
        let naive = NaiveDateTime::parse_from_str(text, LOG_DATE_FORMAT).unwrap();
        ist().from_local_datetime(&naive).unwrap()
    }

    #[test]
    fn test_missing_files_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(store.load_log().unwrap().is_empty());
        assert_eq!(store.load_watermark().unwrap(), None);
    }

    #[test]
    fn test_log_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let entry = LogEntry {
            thread_id: ThreadId::new("T1"),
            received_at: at("01-01-2024 10:00"),
            file_name: "resume1.pdf".to_string(),
            job_post: "Acme".to_string(),
        };
        let log = SyncLog::from_entries(vec![entry.clone()]);

        store.save_log(&log).unwrap();
        let loaded = store.load_log().unwrap();

        assert_eq!(loaded.entries(), &[entry]);
    }

    #[test]
    fn test_log_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let log = SyncLog::from_entries(vec![LogEntry {
            thread_id: ThreadId::new("18c2"),
            received_at: at("15-01-2024 14:30"),
            file_name: "Jane, Doe.pdf".to_string(),
            job_post: "Backend_Engineer".to_string(),
        }]);
        store.save_log(&log).unwrap();

        let content = fs::read_to_string(store.log_path()).unwrap();
        assert_eq!(
            content,
            "Thread ID,Date Received,File Name,Job Post\n18c2,15-01-2024 14:30,\"Jane, Doe.pdf\",Backend_Engineer\n"
        );
        assert!(!dir.path().join("log.csv.tmp").exists());
    }

    #[test]
    fn test_empty_log_keeps_header() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.save_log(&SyncLog::new()).unwrap();

        let content = fs::read_to_string(store.log_path()).unwrap();
        assert_eq!(content, "Thread ID,Date Received,File Name,Job Post\n");
        assert!(store.load_log().unwrap().is_empty());
    }

    #[test]
    fn test_log_converts_other_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let utc = FixedOffset::east_opt(0).unwrap();
        let received = utc.with_ymd_and_hms(2024, 1, 1, 4, 30, 0).unwrap();
        let log = SyncLog::from_entries(vec![LogEntry {
            thread_id: ThreadId::new("T1"),
            received_at: received,
            file_name: "a.pdf".to_string(),
            job_post: "Acme".to_string(),
        }]);
        store.save_log(&log).unwrap();

        let loaded = store.load_log().unwrap();
        assert_eq!(loaded.entries()[0].received_at, at("01-01-2024 10:00"));
    }

    #[test]
    fn test_malformed_date_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        fs::write(
            store.log_path(),
            "Thread ID,Date Received,File Name,Job Post\nT1,2024-01-01,a.pdf,Acme\n",
        )
        .unwrap();

        let err = store.load_log().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LogFormatError>(),
            Some(LogFormatError::InvalidDate { row: 2, .. })
        ));
    }

    #[test]
    fn test_watermark_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let watermark = at("05-03-2024 17:00");

        store.save_watermark(watermark).unwrap();
        assert_eq!(
            fs::read_to_string(store.watermark_path()).unwrap(),
            "05 03 2024 17\n"
        );
        assert_eq!(store.load_watermark().unwrap(), Some(watermark));
    }

    #[test]
    fn test_watermark_truncates_to_hour() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.save_watermark(at("05-03-2024 17:45")).unwrap();
        assert_eq!(store.load_watermark().unwrap(), Some(at("05-03-2024 17:00")));
    }

    #[test]
    fn test_malformed_watermark_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        fs::write(store.watermark_path(), "last tuesday").unwrap();
        assert!(store.load_watermark().is_err());
    }
}
