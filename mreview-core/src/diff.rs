//! Changed-file records of a merge request

use serde::{Deserialize, Serialize};

/// One changed file of a merge request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffRecord {
    /// Path of the file after the change
    pub new_path: String,
    /// Unified diff text; empty for renames, mode changes and binary files
    pub diff: String,
}

impl DiffRecord {
    pub fn new(new_path: impl Into<String>, diff: impl Into<String>) -> Self {
        Self {
            new_path: new_path.into(),
            diff: diff.into(),
        }
    }

    /// Whether there is textual change to review
    pub fn has_changes(&self) -> bool {
        !self.diff.is_empty()
    }
}
