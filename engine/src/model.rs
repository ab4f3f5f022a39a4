//! Core data model for copy jobs.
//!
//! This module defines:
//! - FileSet: the top-level sources selected by the caller
//! - Mode, JobState, EntryKind, EntryOutcome: enums describing a job and its entries
//! - EntryRecord / JobReport: per-entry results collected while a job runs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Ordered, deduplicated collection of top-level source entries.
///
/// Immutable once handed to a job. Membership tells the engine whether an
/// entry was selected explicitly (and may be renamed) or found by recursion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSet {
    paths: Vec<PathBuf>,
}

impl FileSet {
    pub fn new() -> Self {
        FileSet { paths: Vec::new() }
    }

    /// Add a path, keeping the first occurrence only.
    pub fn push<P: Into<PathBuf>>(&mut self, path: P) {
        let path = path.into();
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Path> {
        self.paths.get(index).map(PathBuf::as_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }
}

impl<P: Into<PathBuf>> FromIterator<P> for FileSet {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        let mut set = FileSet::new();
        for path in iter {
            set.push(path);
        }
        set
    }
}

/// The operation mode of a job. Only changes user-facing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Copy between file systems
    #[default]
    Copy,
    /// Download from a remote location
    Download,
}

impl Mode {
    /// Present participle used in status lines.
    pub fn verb(&self) -> &'static str {
        match self {
            Mode::Copy => "Copying",
            Mode::Download => "Downloading",
        }
    }

    /// Title used when reporting errors.
    pub fn error_title(&self) -> &'static str {
        match self {
            Mode::Copy => "Copy error",
            Mode::Download => "Download error",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Copy => write!(f, "Copy"),
            Mode::Download => write!(f, "Download"),
        }
    }
}

/// The state of an entire job. Transitions only move forward:
/// Pending -> Running -> {Interrupted | Finished}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Created, not yet started
    Pending,
    /// Currently executing
    Running,
    /// Stopped by a cancel decision or an external interrupt
    Interrupted,
    /// Every top-level entry was processed
    Finished,
}

impl JobState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            JobState::Pending => 0,
            JobState::Running => 1,
            JobState::Interrupted => 2,
            JobState::Finished => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => JobState::Pending,
            1 => JobState::Running,
            2 => JobState::Interrupted,
            _ => JobState::Finished,
        }
    }

    /// Returns true if no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Interrupted | JobState::Finished)
    }
}

/// What kind of source entry was processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    /// Regular file pushed from a remote-backed store
    Remote,
    /// Entry whose kind could not be determined
    Unknown,
}

/// Final outcome of one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryOutcome {
    /// Transferred (directories: created and listed)
    Done,
    /// Not transferred because of a collision or a skip decision
    Skipped,
    /// Not transferred because of an error
    Failed,
    /// Left unfinished because the job was stopped
    Interrupted,
}

/// Result of processing one entry, in processing order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryRecord {
    /// Unique identifier for this entry within the job
    pub id: Uuid,

    pub source_path: PathBuf,

    /// Destination actually written to (None if never resolved)
    pub destination_path: Option<PathBuf>,

    pub kind: EntryKind,

    pub outcome: EntryOutcome,

    /// Bytes written for this entry (0 for directories)
    pub bytes_transferred: u64,

    /// True if this entry was a member of the FileSet
    pub top_level: bool,

    /// OS error code if the entry failed on an OS call
    pub error_code: Option<i32>,

    /// Human-readable error message
    pub error_message: Option<String>,
}

/// Summary of a job run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: Uuid,
    pub mode: Mode,
    pub state: JobState,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub processed_files: u64,
    pub bytes_transferred: u64,
    pub bytes_skipped: u64,
    pub entries: Vec<EntryRecord>,
}

impl JobReport {
    pub fn count(&self, outcome: EntryOutcome) -> usize {
        self.entries.iter().filter(|e| e.outcome == outcome).count()
    }

    pub fn has_failures(&self) -> bool {
        self.entries.iter().any(|e| e.outcome == EntryOutcome::Failed)
    }

    /// First record for the given source path, if it was processed.
    pub fn entry_for(&self, source: &Path) -> Option<&EntryRecord> {
        self.entries.iter().find(|e| e.source_path == source)
    }
}
