//! Record of batches that were confirmed on the ledger but whose receiver file
//! has not been renamed yet.
//!
//! A record is written right after confirmation and cleared after the rename, so a
//! rename failure or a crash in between does not lead to paying the same file twice.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::JournalError;

pub const JOURNAL_FILE_NAME: &str = "disburser.journal";

/// One journal line, stored as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub file_name: String,
    /// Hex sha256 of the receiver file contents at submission time.
    pub content_digest: String,
    /// Standard base64 transaction hash, absent when the confirmation was unreadable.
    pub tx_hash: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

pub fn content_digest(contents: &[u8]) -> String {
    hex::encode(Sha256::digest(contents))
}

#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Journal kept next to the receiver files it describes.
    pub fn in_folder(folder: &Path) -> Self {
        Self::new(folder.join(JOURNAL_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> JournalError {
        JournalError::Io {
            path: self.path.clone(),
            source,
        }
    }

    pub fn records(&self) -> Result<Vec<JournalRecord>, JournalError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_err(e)),
        };

        Ok(contents
            .lines()
            .filter(|line| !line.is_empty())
            .filter_map(|line| match serde_json::from_str::<JournalRecord>(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(journal = %self.path.display(), line, error = %e, "Ignoring unreadable journal line");
                    None
                }
            })
            .collect())
    }

    pub fn find(
        &self,
        file_name: &str,
        content_digest: &str,
    ) -> Result<Option<JournalRecord>, JournalError> {
        Ok(self.records()?.into_iter().find(|record| {
            record.file_name == file_name && record.content_digest == content_digest
        }))
    }

    /// Appends a record and flushes it to disk before returning.
    pub fn record(&self, record: &JournalRecord) -> Result<(), JournalError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| self.io_err(e))?;
        file.sync_all().map_err(|e| self.io_err(e))
    }

    /// Drops every record for `file_name`. The journal is replaced atomically.
    pub fn clear(&self, file_name: &str) -> Result<(), JournalError> {
        let records = self.records()?;
        let remaining: Vec<_> = records
            .iter()
            .filter(|record| record.file_name != file_name)
            .collect();
        if remaining.len() == records.len() {
            return Ok(());
        }

        if remaining.is_empty() {
            return fs::remove_file(&self.path).map_err(|e| self.io_err(e));
        }

        let mut contents = String::new();
        for record in remaining {
            contents.push_str(&serde_json::to_string(record)?);
            contents.push('\n');
        }
        let tmp = self.path.with_extension("journal.tmp");
        fs::write(&tmp, contents).map_err(|e| self.io_err(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))
    }
}
