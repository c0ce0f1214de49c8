//! Capture history – an append-only JSON array file.
//!
//! The whole file is read, extended and rewritten on every append. There
//! is no locking: two processes appending at once can lose a record.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, error};

use crate::record::CaptureRecord;

/// File name of the history inside a save directory.
pub const HISTORY_FILE: &str = "capture_records.json";

/// Persistent store of capture records.
pub trait History: Send + Sync {
    fn append(&self, record: &CaptureRecord) -> Result<()>;

    /// Newest records first, at most `limit` of them.
    fn list(&self, limit: usize) -> Vec<CaptureRecord>;
}

/// [`History`] backed by `capture_records.json`.
#[derive(Debug, Clone)]
pub struct JsonHistory {
    path: PathBuf,
}

impl JsonHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonHistory { path: path.into() }
    }

    /// History file inside a save directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(HISTORY_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total number of stored records.
    pub fn count(&self) -> usize {
        self.read_all().len()
    }

    /// Missing or unparsable files read as an empty history.
    fn read_all(&self) -> Vec<CaptureRecord> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                error!("Cannot read history {}: {e}", self.path.display());
                return Vec::new();
            }
        };
        match serde_json::from_str(&text) {
            Ok(records) => records,
            Err(e) => {
                error!("Ignoring corrupt history {}: {e}", self.path.display());
                Vec::new()
            }
        }
    }
}

impl History for JsonHistory {
    fn append(&self, record: &CaptureRecord) -> Result<()> {
        let mut records = self.read_all();
        records.push(record.clone());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(&records).context("Serialise history")?;
        std::fs::write(&self.path, text)
            .with_context(|| format!("Cannot write history: {}", self.path.display()))?;

        debug!("History now holds {} record(s)", records.len());
        Ok(())
    }

    fn list(&self, limit: usize) -> Vec<CaptureRecord> {
        let mut records = self.read_all();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);
        records
    }
}
