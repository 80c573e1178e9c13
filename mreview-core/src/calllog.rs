//! Per-run log of model calls
//!
//! The log is a single pretty-printed JSON array. Every append reads the whole
//! file, pushes the new entry and rewrites the file, so the file on disk is
//! always a complete array up to the last successful call. The rewrite goes
//! through a sibling temporary file renamed over the log, so an interrupted
//! write never leaves a truncated array behind. This is linear in the size of
//! the log and assumes a single writer.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Timestamp format used in log entries, local time with microseconds
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.6f";

/// Format a local timestamp for a log entry
pub fn format_timestamp(at: DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Model parameters recorded with every call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiParams {
    pub model: String,
    pub temperature: f32,
}

/// Record of one model invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallLogEntry {
    pub file_name: String,
    pub diff_content: String,
    pub review_perspective: String,
    pub request_tokens: usize,
    pub api_params: ApiParams,
    pub response: String,
    pub response_tokens: usize,
    pub start_time: String,
    pub end_time: String,
}

/// JSON array log file, rewritten in full on every append
#[derive(Debug, Clone)]
pub struct CallLog {
    path: PathBuf,
}

impl CallLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current entries
    ///
    /// A missing file is an empty log. A file that does not hold a JSON array
    /// of entries, including one that is not UTF-8, is discarded with a
    /// warning and also treated as empty.
    pub fn read(&self) -> Result<Vec<CallLogEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let contents = std::fs::read(&self.path).map_err(Error::Io)?;
        match serde_json::from_slice(&contents) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Discarding unreadable call log");
                Ok(Vec::new())
            }
        }
    }

    /// Append one entry and rewrite the file
    pub fn append(&self, entry: CallLogEntry) -> Result<()> {
        let mut entries = self.read()?;
        entries.push(entry);

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        entries.serialize(&mut ser)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(Error::Io)?;
        tmp.write_all(&buf).map_err(Error::Io)?;
        tmp.as_file().sync_all().map_err(Error::Io)?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        debug!(path = %self.path.display(), entries = entries.len(), "Call log written");
        Ok(())
    }
}
