//! JSON decision log for auto-approvals.
//!
//! The log is a single pretty-printed JSON array, newest entry last,
//! trimmed to the most recent `max_entries` on every write. Concurrent
//! hooks serialize their read-modify-write with an exclusive file lock.
//!
//! Logging must never affect a permission decision: the hook calls
//! [`DecisionLog::record_silently`], which discards every error.

use chrono::Local;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::LogConfig;

/// Default log location.
pub const DEFAULT_LOG_FILE: &str = "~/.claude/logs/auto-approved.json";

/// Number of entries kept by default.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Decision label written for approvals.
pub const DECISION_AUTO_APPROVED: &str = "auto-approved";

/// Error reading or writing the decision log.
#[derive(Debug)]
pub enum DecisionLogError {
    /// Failed to open, lock, read, or write the file.
    Io(io::Error),
    /// The existing file is not a JSON array of entries. It is left untouched.
    Corrupt(serde_json::Error),
}

impl fmt::Display for DecisionLogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "decision log I/O error: {e}"),
            Self::Corrupt(e) => write!(f, "decision log is not valid JSON: {e}"),
        }
    }
}

impl std::error::Error for DecisionLogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Corrupt(e) => Some(e),
        }
    }
}

impl From<io::Error> for DecisionLogError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// One logged decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionEntry {
    /// Local time, ISO-8601 without offset.
    pub timestamp: String,
    pub tool_name: String,
    pub decision: String,
    #[serde(default)]
    pub reason: String,
}

impl DecisionEntry {
    /// An approval stamped with the current local time.
    #[must_use]
    pub fn approved(tool_name: &str, reason: &str) -> Self {
        Self {
            timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            tool_name: tool_name.to_string(),
            decision: DECISION_AUTO_APPROVED.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Handle to a decision log file.
#[derive(Debug, Clone)]
pub struct DecisionLog {
    path: PathBuf,
    max_entries: usize,
}

impl DecisionLog {
    #[must_use]
    pub const fn new(path: PathBuf, max_entries: usize) -> Self {
        Self { path, max_entries }
    }

    /// The configured log, or `None` when logging is disabled.
    #[must_use]
    pub fn from_config(config: &LogConfig) -> Option<Self> {
        config
            .enabled()
            .then(|| Self::new(config.path(), config.max_entries()))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `entry`, keeping only the newest `max_entries`.
    ///
    /// # Errors
    ///
    /// Returns [`DecisionLogError::Io`] if the file cannot be opened, locked,
    /// or rewritten, and [`DecisionLogError::Corrupt`] if the existing
    /// content is not a JSON array of entries.
    pub fn append(&self, entry: DecisionEntry) -> Result<(), DecisionLogError> {
        let mut file = open_locked(&self.path)?;
        let mut entries = read_entries(&mut file)?;

        entries.push(entry);
        if entries.len() > self.max_entries {
            let excess = entries.len() - self.max_entries;
            entries.drain(..excess);
        }

        rewrite_entries(&mut file, &entries)
    }

    /// Append `entry`, discarding any error.
    pub fn record_silently(&self, entry: DecisionEntry) {
        if let Err(e) = self.append(entry) {
            tracing::debug!(path = %self.path.display(), "decision not logged: {e}");
        }
    }

    /// The newest `limit` entries, oldest first. A missing file is empty.
    ///
    /// # Errors
    ///
    /// Returns [`DecisionLogError::Io`] if the file exists but cannot be read
    /// and [`DecisionLogError::Corrupt`] if it does not parse.
    pub fn recent(&self, limit: usize) -> Result<Vec<DecisionEntry>, DecisionLogError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        file.lock_shared()?;
        let mut entries = read_entries(&mut file)?;
        let skip = entries.len().saturating_sub(limit);
        entries.drain(..skip);
        Ok(entries)
    }
}

fn open_locked(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)?;
    file.lock_exclusive()?;
    Ok(file)
}

fn read_entries(file: &mut File) -> Result<Vec<DecisionEntry>, DecisionLogError> {
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&content).map_err(DecisionLogError::Corrupt)
}

fn rewrite_entries(file: &mut File, entries: &[DecisionEntry]) -> Result<(), DecisionLogError> {
    let json = serde_json::to_vec_pretty(entries).map_err(io::Error::other)?;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&json)?;
    file.sync_data()?;
    Ok(())
}
