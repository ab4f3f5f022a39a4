//! Error types for the copy engine.
//!
//! `EngineError` covers job-level problems that prevent a job from being
//! built or started. Failures of a single entry are `EntryError`s: they are
//! recorded on the entry's `EntryRecord` and never abort the job on their own.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that prevent a job from being created or run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Nothing to transfer
    #[error("No source files were given")]
    EmptyFileSet,

    /// Destination folder is unusable
    #[error("Invalid destination folder: {} ({reason})", path.display())]
    InvalidDestination { path: PathBuf, reason: String },

    /// Rename only makes sense for a single top-level entry
    #[error("A new name can only be given when copying a single file (got {count})")]
    RenameNeedsSingleEntry { count: usize },

    /// The new name is not a plain file name
    #[error("Invalid file name: {name:?}")]
    InvalidName { name: String },

    /// `run` was called on a job that already left the Pending state
    #[error("Job has already been started")]
    AlreadyStarted,

    /// Options file could not be read or parsed
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
}

/// Failure of a single entry. Stored as text on the entry record.
#[derive(Debug, Error)]
pub enum EntryError {
    #[error("Cannot build destination for {}: {reason}", source_path.display())]
    DestinationConstruction { source_path: PathBuf, reason: String },

    #[error("Cannot read attributes of {}: {source}", path.display())]
    Stat { path: PathBuf, source: io::Error },

    #[error("Cannot create folder {}: {source}", path.display())]
    DirectoryCreate { path: PathBuf, source: io::Error },

    #[error("Cannot read folder {}: {source}", path.display())]
    DirectoryList { path: PathBuf, source: io::Error },

    #[error("Cannot copy {}: {source}", path.display())]
    ByteCopy { path: PathBuf, source: io::Error },

    #[error("Cannot change date of {}: {source}", path.display())]
    TimestampPreservation { path: PathBuf, source: io::Error },

    #[error("Cannot push {} from device: {source}", path.display())]
    RemotePush { path: PathBuf, source: io::Error },

    #[error("Cannot create symbolic link {}: {source}", path.display())]
    Symlink { path: PathBuf, source: io::Error },

    #[error("Integrity check failed for {}: {reason}", path.display())]
    IntegrityMismatch { path: PathBuf, reason: String },

    #[error("Cannot remove source {}: {source}", path.display())]
    SourceDisposal { path: PathBuf, source: io::Error },

    #[error("Cannot optimize archive {}: {source}", path.display())]
    ArchiveOptimize { path: PathBuf, source: io::Error },

    #[error("{}: cannot copy a folder into itself", path.display())]
    DestinationInsideSource { path: PathBuf },
}

impl EntryError {
    /// Extract the OS error code, if the failure came from the OS.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Stat { source, .. }
            | Self::DirectoryCreate { source, .. }
            | Self::DirectoryList { source, .. }
            | Self::ByteCopy { source, .. }
            | Self::TimestampPreservation { source, .. }
            | Self::RemotePush { source, .. }
            | Self::Symlink { source, .. }
            | Self::SourceDisposal { source, .. }
            | Self::ArchiveOptimize { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}
