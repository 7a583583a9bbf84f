use serde::{Deserialize, Serialize};
use std::fmt;

/// Dedup key for a remote file: `{fileId}_{modifiedTime}`.
///
/// Editing or replacing a file changes its modified time and therefore its key,
/// so an edited file is treated as new work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessedKey(String);

impl ProcessedKey {
    pub fn new(file_id: &str, modified_time: &str) -> Self {
        Self(format!("{}_{}", file_id, modified_time))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessedStatus {
    Success,
}

/// Ledger entry written after a file was extracted and saved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedFileRecord {
    pub file_id: String,
    pub file_name: String,
    pub modified_time: String,
    pub processed_at: String,
    pub status: ProcessedStatus,
}
