//! Progress reporting trait.
//!
//! This module defines the ProgressCallback trait, which decouples the copy
//! engine from any specific UI technology (CLI, GUI, etc.). Hosts that only
//! poll can ignore it and read the `JobHandle` instead.

use std::path::Path;

use crate::job::JobHandle;
use crate::model::{EntryRecord, JobReport};

/// Trait for receiving progress updates from a copy job.
///
/// All methods are called synchronously on the job thread, so they should
/// return quickly.
pub trait ProgressCallback: Send + Sync {
    /// Called when job execution starts.
    fn on_job_started(&self, job: &JobHandle);

    /// Called when an entry (top-level or found by recursion) is about to be processed.
    fn on_entry_started(&self, job: &JobHandle, source: &Path);

    /// Called after each chunk of bytes written for the current file.
    fn on_bytes(&self, _job: &JobHandle, _bytes: u64) {}

    /// Called when an entry is done (copied, skipped, failed or interrupted).
    ///
    /// For a directory this comes after all of its children.
    fn on_entry_completed(&self, job: &JobHandle, record: &EntryRecord);

    /// Called once, after the last entry and the completion step.
    fn on_job_completed(&self, job: &JobHandle, report: &JobReport);

    /// Called when the host should select a freshly created file.
    fn select_file(&self, _path: &Path) {}
}
