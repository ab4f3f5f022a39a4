//! # copyjob - Recursive Copy Job Engine
//!
//! A headless engine that copies (or downloads) a set of files and folders
//! into a destination folder, recursively, one entry at a time.
//! Designed to sit behind any host: a CLI, a GUI, or automation.
//!
//! ## Overview
//!
//! The engine provides:
//! - Depth-first traversal of the sources, with an optional new name for a
//!   single top-level entry
//! - A background scan that totals bytes and entries for progress estimation
//! - Retry / skip / cancel handling of every failing operation, answered by a
//!   pluggable `DecisionProvider`
//! - Collision handling for existing destinations
//! - A completion step (archive optimization, selection of the new file)
//! - Polling through `JobHandle` and push notifications via `ProgressCallback`
//!
//! ## Basic Usage
//!
//! ```no_run
//! use copyjob::{CollisionAction, CopyJob, FileSet};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let files: FileSet = ["/data/photos", "/data/notes.txt"].into_iter().collect();
//!
//! let mut job = CopyJob::builder(files, "/backup")
//!     .on_collision(CollisionAction::OverwriteIfOlder)
//!     .build()?;
//!
//! // Poll from another thread while it runs.
//! let handle = job.handle();
//! std::thread::spawn(move || println!("{:.0}%", handle.total_percent_done() * 100.0));
//!
//! let report = job.run(None)?;
//! for entry in &report.entries {
//!     println!("{}: {:?}", entry.source_path.display(), entry.outcome);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: File sets, job state, per-entry records and the job report
//! - **error**: Job-level and per-entry error types
//! - **options**: Tunables, loadable from JSON
//! - **fs_ops**: The `FileSystem` abstraction and its local implementation
//! - **scanner**: Background totals of the file set
//! - **decision**: Questions asked to the host and canned answer providers
//! - **retry**: The retry / skip / cancel loop around fallible operations
//! - **collision**: Existing-destination handling and unique names
//! - **estimator**: Blended size / count progress
//! - **progress**: Progress callback trait
//! - **finalize**: Source disposal and the completion step
//! - **checksums**: Checksums for the post-copy integrity check
//! - **job**: Job orchestration (build, run, poll)

pub mod model;
pub mod error;
pub mod options;
pub mod fs_ops;
pub mod scanner;
pub mod decision;
pub mod retry;
pub mod collision;
pub mod estimator;
pub mod progress;
pub mod finalize;
pub mod checksums;
pub mod job;

// Re-export main types
pub use model::{EntryKind, EntryOutcome, EntryRecord, FileSet, JobReport, JobState, Mode};
pub use error::{EngineError, EntryError};
pub use options::{CopyOptions, ProgressWeights};
pub use fs_ops::{EntryMeta, FileSystem, LocalFileSystem, Location};
pub use decision::{
    ChannelDecisionProvider, CollisionAction, CollisionChoice, CollisionContext, CollisionDecision,
    CollisionKind, DecisionProvider, DecisionRequest, ErrorContext, ErrorDecision, FixedDecisions,
    OperationKind, ScriptedDecisions,
};
pub use progress::ProgressCallback;
pub use finalize::{Completion, DeleteSource, KeepSource, SourceDisposal};
pub use checksums::{ChecksumAlgorithm, ChecksumValue};
pub use job::{CopyJob, CopyJobBuilder, JobHandle, Phase};
