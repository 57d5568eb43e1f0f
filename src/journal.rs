//! Operator journal: an append-only record of events that need a human.
//!
//! ```text
//! ~/.shotcam/journal.jsonl   # one JournalEntry per line
//! ```
//!
//! Reconciliation outcomes, missed shots, arm failures, aborts and day
//! rolls land here alongside the regular log output.

use std::{fs, io, path::PathBuf};

use io::{BufRead, Write};

use jiff::Timestamp;
use jiff::civil::Date;
use serde::{Deserialize, Serialize};

use crate::reconcile::Outcome;

/// Errors that can occur while reading or writing the journal.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = core::result::Result<T, JournalError>;

/// A single journal line. Tagged so each line is self-describing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum JournalEntry {
    /// A recording cycle finished and its file was matched (or not).
    #[serde(rename_all = "camelCase")]
    Reconciled {
        at: Timestamp,
        camera: String,
        shot: u32,
        outcome: Outcome,
        file: Option<PathBuf>,
    },

    /// The log jumped past one or more shots.
    #[serde(rename_all = "camelCase")]
    MissedShot {
        at: Timestamp,
        expected: u32,
        observed: u32,
    },

    /// A camera stayed unarmed after the retry.
    #[serde(rename_all = "camelCase")]
    ArmFailed {
        at: Timestamp,
        camera: String,
        shot: Option<u32>,
    },

    /// The machine aborted; these cameras were disarmed without export.
    #[serde(rename_all = "camelCase")]
    Aborted {
        at: Timestamp,
        shot: Option<u32>,
        cameras: Vec<String>,
    },

    /// A camera's day folders were prepared.
    #[serde(rename_all = "camelCase")]
    DayRolled {
        at: Timestamp,
        camera: String,
        date: Date,
        archived: usize,
        remote: bool,
    },

    /// The operator's next-shot counter went backwards.
    #[serde(rename_all = "camelCase")]
    ShotStoreReset {
        at: Timestamp,
        next_shot: u32,
        last_handled: u32,
    },
}

/// The journal file.
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Appends an entry, creating the file and its directory on first use.
    pub fn append(&self, entry: &JournalEntry) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Loads every entry. A journal that does not exist yet is empty.
    pub fn load(&self) -> Result<Vec<JournalEntry>> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let reader = io::BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if !line.is_empty() {
                entries.push(serde_json::from_str(&line)?);
            }
        }
        Ok(entries)
    }
}
