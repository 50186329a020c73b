//! Emotion log persistence
//!
//! Layout: `<dir>/<YYYY-MM-DD>/entries.jsonl`, one entry per line, plus a
//! `day.json` marker written when the day directory is first created.
//! Best effort: callers log failures and carry on.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::types::EmotionLogEntry;

const ENTRIES_FILE: &str = "entries.jsonl";
const DAY_MARKER_FILE: &str = "day.json";

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Sink for classification records
pub trait Journal: Send + Sync {
    /// Persist `entry`, returning its id
    fn record(&self, entry: &EmotionLogEntry) -> Result<String, JournalError>;
}

/// Stable id from the entry content:
/// `log_<YYYYMMDD_HHMMSS>_<first 4 digest bytes>`
pub fn entry_id(entry: &EmotionLogEntry) -> Result<String, JournalError> {
    let mut unsigned = entry.clone();
    unsigned.id.clear();
    let digest = Sha256::digest(serde_json::to_vec(&unsigned)?);

    Ok(format!(
        "log_{}_{:02x}{:02x}{:02x}{:02x}",
        entry.timestamp.format("%Y%m%d_%H%M%S"),
        digest[0],
        digest[1],
        digest[2],
        digest[3]
    ))
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DayMarker {
    created_at: chrono::DateTime<chrono::Utc>,
}

/// Date-partitioned JSON-lines journal
#[derive(Debug, Clone)]
pub struct JsonlJournal {
    root: PathBuf,
}

impl JsonlJournal {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn day_dir(&self, day: &str) -> PathBuf {
        self.root.join(day)
    }

    fn ensure_day(&self, entry: &EmotionLogEntry) -> Result<PathBuf, JournalError> {
        let dir = self.day_dir(&entry.day());
        let marker = dir.join(DAY_MARKER_FILE);
        if !marker.exists() {
            fs::create_dir_all(&dir)?;
            let body = serde_json::to_string_pretty(&DayMarker {
                created_at: entry.timestamp,
            })?;
            fs::write(&marker, body)?;
            tracing::debug!(dir = %dir.display(), "journal day created");
        }
        Ok(dir)
    }

    /// All entries recorded on `day` (`YYYY-MM-DD`), oldest first.
    /// Unreadable lines are skipped.
    pub fn entries_for_day(&self, day: &str) -> Result<Vec<EmotionLogEntry>, JournalError> {
        let path = self.day_dir(day).join(ENTRIES_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(fs::File::open(&path)?);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!(error = %e, path = %path.display(), "skipping bad journal line"),
            }
        }
        Ok(entries)
    }
}

impl Journal for JsonlJournal {
    fn record(&self, entry: &EmotionLogEntry) -> Result<String, JournalError> {
        let dir = self.ensure_day(entry)?;

        let mut stored = entry.clone();
        stored.id = entry_id(entry)?;
        let mut line = serde_json::to_string(&stored)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(ENTRIES_FILE))?;
        file.write_all(line.as_bytes())?;

        tracing::info!(id = %stored.id, emotion = %stored.emotion, "journal entry recorded");
        Ok(stored.id)
    }
}

/// Journal that keeps nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NullJournal;

impl Journal for NullJournal {
    fn record(&self, entry: &EmotionLogEntry) -> Result<String, JournalError> {
        entry_id(entry)
    }
}

// =============================================================================
// TESTS
// =============================================================================
