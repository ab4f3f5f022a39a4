//! Job orchestration module.
//!
//! This module provides the copy job itself:
//! - Building a job from a file set and a destination folder
//! - Running it: depth-first, strictly sequential traversal of the sources
//! - `JobHandle`: the thread-safe view hosts poll for state, status and progress
//!
//! The destination folder of an entry is passed down the recursion as an
//! argument; each directory hands its own destination to its children, and the
//! caller's folder is back in effect as soon as the subtree returns.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::checksums;
use crate::collision::{destination_inside_source, CollisionOutcome, CollisionResolver};
use crate::decision::{CollisionAction, DecisionProvider, ErrorDecision, FixedDecisions, OperationKind};
use crate::error::{EngineError, EntryError};
use crate::estimator::{ProgressEstimator, ProgressSample};
use crate::finalize::{report_only, Completion, CompletionFinalizer, KeepSource, SourceDisposal};
use crate::fs_ops::{copy_stream, EntryMeta, FileSystem, LocalFileSystem, Location};
use crate::model::{EntryKind, EntryOutcome, EntryRecord, FileSet, JobReport, JobState, Mode};
use crate::options::CopyOptions;
use crate::progress::ProgressCallback;
use crate::retry::{Attempt, RetryPolicy};
use crate::scanner::{DirectoryScanner, ScanHandle};

/// What the job is busy with, for the status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Transferring,
    VerifyingIntegrity,
    OptimizingArchive(String),
}

/// State shared between the job thread and its handles.
#[derive(Debug)]
struct JobShared {
    id: Uuid,
    mode: Mode,
    state: AtomicU8,
    processed_files: AtomicU64,
    bytes_transferred: AtomicU64,
    bytes_skipped: AtomicU64,
    top_level_done: AtomicU64,
    top_level_count: u64,
    current_file: Mutex<Option<String>>,
    phase: Mutex<Phase>,
    estimator: ProgressEstimator,
}

/// Cloneable, thread-safe view of a job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    shared: Arc<JobShared>,
    scan: ScanHandle,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn mode(&self) -> Mode {
        self.shared.mode
    }

    pub fn state(&self) -> JobState {
        JobState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn is_interrupted(&self) -> bool {
        self.state() == JobState::Interrupted
    }

    /// Stop the job (and its scan) as soon as possible.
    ///
    /// Has no effect on a job that already finished.
    pub fn interrupt(&self) {
        let mut current = self.shared.state.load(Ordering::Acquire);
        while !JobState::from_u8(current).is_terminal() {
            match self.shared.state.compare_exchange(
                current,
                JobState::Interrupted.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    info!(job = %self.shared.id, "job interrupted");
                    break;
                }
                Err(actual) => current = actual,
            }
        }
        self.scan.interrupt();
    }

    /// Entries handed to the per-entry step so far, directories included.
    pub fn processed_files(&self) -> u64 {
        self.shared.processed_files.load(Ordering::Acquire)
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.shared.bytes_transferred.load(Ordering::Acquire)
    }

    pub fn bytes_skipped(&self) -> u64 {
        self.shared.bytes_skipped.load(Ordering::Acquire)
    }

    /// Name of the entry being processed.
    pub fn current_file(&self) -> Option<String> {
        self.shared.current_file.lock().clone()
    }

    pub fn scan(&self) -> &ScanHandle {
        &self.scan
    }

    /// One-line description of what the job is doing.
    pub fn status_string(&self) -> String {
        let phase = self.shared.phase.lock().clone();
        let current = self.current_file();
        match (phase, current) {
            (Phase::OptimizingArchive(name), _) => format!("Optimizing archive {}", name),
            (Phase::VerifyingIntegrity, Some(current)) => format!("Verifying integrity of {}", current),
            (_, Some(current)) => format!("{} {}", self.shared.mode.verb(), current),
            (_, None) => self.shared.mode.verb().to_string(),
        }
    }

    /// Completion in [0, 1]. Never decreases over a run; 1.0 once finished.
    pub fn total_percent_done(&self) -> f64 {
        let estimator = &self.shared.estimator;
        if self.state() == JobState::Finished {
            return estimator.observe(1.0);
        }
        let top_level = self.shared.top_level_count.max(1);
        let sample = ProgressSample {
            scan_completed: self.scan.is_completed(),
            total_bytes: self.scan.total_bytes(),
            total_files: self.scan.total_files(),
            bytes_transferred: self.bytes_transferred(),
            bytes_skipped: self.bytes_skipped(),
            processed_files: self.processed_files(),
            fallback: self.shared.top_level_done.load(Ordering::Acquire) as f64 / top_level as f64,
        };
        estimator.estimate(&sample)
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        *self.shared.phase.lock() = phase;
    }

    fn set_current_file(&self, source: &Path) {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string());
        *self.shared.current_file.lock() = Some(name);
    }

    fn start(&self) -> bool {
        self.shared
            .state
            .compare_exchange(
                JobState::Pending.as_u8(),
                JobState::Running.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn finish(&self) {
        let _ = self.shared.state.compare_exchange(
            JobState::Running.as_u8(),
            JobState::Finished.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn add_transferred(&self, bytes: u64) {
        self.shared.bytes_transferred.fetch_add(bytes, Ordering::AcqRel);
    }

    fn remove_transferred(&self, bytes: u64) {
        self.shared.bytes_transferred.fetch_sub(bytes, Ordering::AcqRel);
    }

    fn add_skipped(&self, bytes: u64) {
        self.shared.bytes_skipped.fetch_add(bytes, Ordering::AcqRel);
    }
}

/// Builder for `CopyJob`.
pub struct CopyJobBuilder {
    files: FileSet,
    dest_folder: PathBuf,
    new_name: Option<String>,
    mode: Mode,
    on_collision: CollisionAction,
    append: bool,
    options: CopyOptions,
    fs: Arc<dyn FileSystem>,
    decisions: Arc<dyn DecisionProvider>,
    disposal: Box<dyn SourceDisposal>,
}

impl CopyJobBuilder {
    /// New name for the single top-level entry.
    pub fn new_name<S: Into<String>>(mut self, name: Option<S>) -> Self {
        self.new_name = name.map(Into::into);
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Default handling of existing destinations.
    pub fn on_collision(mut self, action: CollisionAction) -> Self {
        self.on_collision = action;
        self
    }

    /// Append to existing destination files instead of truncating them.
    pub fn append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    pub fn options(mut self, options: CopyOptions) -> Self {
        self.options = options;
        self
    }

    pub fn file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn decisions(mut self, decisions: Arc<dyn DecisionProvider>) -> Self {
        self.decisions = decisions;
        self
    }

    /// What to do with a source once it was transferred (default: keep it).
    pub fn source_disposal(mut self, disposal: Box<dyn SourceDisposal>) -> Self {
        self.disposal = disposal;
        self
    }

    /// Validate the parameters and start the background scan.
    ///
    /// # Errors
    /// Returns EngineError if the file set is empty, the destination folder
    /// is not a directory, or the new name is unusable.
    pub fn build(self) -> Result<CopyJob, EngineError> {
        if self.files.is_empty() {
            return Err(EngineError::EmptyFileSet);
        }
        self.options.validate()?;

        if self.dest_folder.as_os_str().is_empty() {
            return Err(EngineError::InvalidDestination {
                path: self.dest_folder,
                reason: "Destination path is empty".to_string(),
            });
        }
        // Follow a link to the destination folder.
        match self.fs.stat(&self.fs.resolve(&self.dest_folder)) {
            Ok(meta) if meta.is_dir => {}
            Ok(_) => {
                return Err(EngineError::InvalidDestination {
                    path: self.dest_folder,
                    reason: "Not a directory".to_string(),
                })
            }
            Err(e) => {
                return Err(EngineError::InvalidDestination {
                    path: self.dest_folder,
                    reason: e.to_string(),
                })
            }
        }

        if let Some(name) = &self.new_name {
            if self.files.len() != 1 {
                return Err(EngineError::RenameNeedsSingleEntry {
                    count: self.files.len(),
                });
            }
            if !is_plain_name(name) {
                return Err(EngineError::InvalidName { name: name.clone() });
            }
        }

        let scanner = DirectoryScanner::start(self.files.clone(), Arc::clone(&self.fs));
        let shared = JobShared {
            id: Uuid::new_v4(),
            mode: self.mode,
            state: AtomicU8::new(JobState::Pending.as_u8()),
            processed_files: AtomicU64::new(0),
            bytes_transferred: AtomicU64::new(0),
            bytes_skipped: AtomicU64::new(0),
            top_level_done: AtomicU64::new(0),
            top_level_count: self.files.len() as u64,
            current_file: Mutex::new(None),
            phase: Mutex::new(Phase::Transferring),
            estimator: ProgressEstimator::new(
                self.options.progress_weights,
                self.options.prescan_ceiling,
            ),
        };
        let handle = JobHandle {
            shared: Arc::new(shared),
            scan: scanner.handle(),
        };

        debug!(
            job = %handle.id(),
            files = self.files.len(),
            dest = %self.dest_folder.display(),
            "job created"
        );

        Ok(CopyJob {
            files: self.files,
            dest_folder: self.dest_folder,
            new_name: self.new_name,
            append: self.append,
            options: self.options,
            fs: self.fs,
            decisions: self.decisions,
            disposal: self.disposal,
            resolver: CollisionResolver::new(self.on_collision),
            scanner,
            handle,
            entries: Vec::new(),
            started: false,
            started_at: None,
            finished_at: None,
            completion: None,
        })
    }
}

/// A recursive copy of a file set into a destination folder.
///
/// Built with `CopyJob::builder`, executed with `run` on the calling thread.
pub struct CopyJob {
    files: FileSet,
    dest_folder: PathBuf,
    new_name: Option<String>,
    append: bool,
    options: CopyOptions,
    fs: Arc<dyn FileSystem>,
    decisions: Arc<dyn DecisionProvider>,
    disposal: Box<dyn SourceDisposal>,
    resolver: CollisionResolver,
    scanner: DirectoryScanner,
    handle: JobHandle,
    entries: Vec<EntryRecord>,
    started: bool,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    completion: Option<Completion>,
}

impl CopyJob {
    /// Start describing a job. Defaults: local file system, copy mode, ask
    /// on collisions, skip on errors, keep sources.
    pub fn builder<P: Into<PathBuf>>(files: FileSet, dest_folder: P) -> CopyJobBuilder {
        CopyJobBuilder {
            files,
            dest_folder: dest_folder.into(),
            new_name: None,
            mode: Mode::Copy,
            on_collision: CollisionAction::Ask,
            append: false,
            options: CopyOptions::default(),
            fs: Arc::new(LocalFileSystem::new()),
            decisions: Arc::new(FixedDecisions::skip_all()),
            disposal: Box::new(KeepSource),
        }
    }

    pub fn handle(&self) -> JobHandle {
        self.handle.clone()
    }

    pub fn files(&self) -> &FileSet {
        &self.files
    }

    pub fn dest_folder(&self) -> &Path {
        &self.dest_folder
    }

    /// Records of the entries processed so far, in visiting order.
    pub fn entries(&self) -> &[EntryRecord] {
        &self.entries
    }

    /// Outcome of the completion step, once it ran.
    pub fn completion(&self) -> Option<&Completion> {
        self.completion.as_ref()
    }

    /// Run the job to the end (or until interrupted).
    ///
    /// Entry-level failures are recorded in the report; they do NOT stop
    /// the job. Only a cancel decision or `JobHandle::interrupt` does.
    ///
    /// # Errors
    /// Returns EngineError if the job was already run.
    pub fn run(&mut self, progress: Option<&dyn ProgressCallback>) -> Result<JobReport, EngineError> {
        if self.started {
            return Err(EngineError::AlreadyStarted);
        }
        self.started = true;

        if !self.handle.start() {
            // Interrupted before it could start.
            self.scanner.interrupt();
            self.scanner.join();
            return Ok(self.report());
        }
        self.started_at = Some(Utc::now());
        info!(
            job = %self.handle.id(),
            mode = %self.handle.mode(),
            dest = %self.dest_folder.display(),
            "job started"
        );

        if let Some(cb) = progress {
            cb.on_job_started(&self.handle);
        }

        let files = self.files.clone();
        let dest_folder = self.dest_folder.clone();
        for source in files.iter() {
            if self.handle.is_interrupted() {
                break;
            }
            self.process_entry(source, &dest_folder, true, progress);
            self.handle.shared.top_level_done.fetch_add(1, Ordering::AcqRel);
        }

        if !self.handle.is_interrupted() {
            self.complete(progress);
            self.handle.finish();
        }

        // Totals are useless once the traversal is over.
        if !self.scanner.is_completed() {
            self.scanner.interrupt();
        }
        self.scanner.join();

        self.finished_at = Some(Utc::now());
        let report = self.report();
        info!(
            job = %self.handle.id(),
            state = ?report.state,
            processed = report.processed_files,
            bytes = report.bytes_transferred,
            "job ended"
        );
        if let Some(cb) = progress {
            cb.on_job_completed(&self.handle, &report);
        }
        Ok(report)
    }

    /// Snapshot of the job's results so far.
    pub fn report(&self) -> JobReport {
        JobReport {
            job_id: self.handle.id(),
            mode: self.handle.mode(),
            state: self.handle.state(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            processed_files: self.handle.processed_files(),
            bytes_transferred: self.handle.bytes_transferred(),
            bytes_skipped: self.handle.bytes_skipped(),
            entries: self.entries.clone(),
        }
    }

    fn complete(&mut self, progress: Option<&dyn ProgressCallback>) {
        let handle = self.handle.clone();
        let stopped = || handle.is_interrupted();
        let policy = RetryPolicy::new(self.decisions.as_ref(), handle.mode().error_title(), &stopped);
        let finalizer = CompletionFinalizer {
            fs: self.fs.as_ref(),
            policy: &policy,
            handle: &handle,
        };
        let completion = finalizer.run(
            &self.files,
            &self.dest_folder,
            self.new_name.as_deref(),
            progress,
        );
        if let Some(err) = &completion.archive_error {
            warn!("{}", err);
        }
        self.completion = Some(completion);
    }

    /// The per-entry step: counts the entry, records it, and transfers it.
    fn process_entry(
        &mut self,
        source: &Path,
        dest_folder: &Path,
        top_level: bool,
        progress: Option<&dyn ProgressCallback>,
    ) -> EntryOutcome {
        if self.handle.is_interrupted() {
            return EntryOutcome::Interrupted;
        }
        self.handle.shared.processed_files.fetch_add(1, Ordering::AcqRel);
        self.handle.set_current_file(source);
        if let Some(cb) = progress {
            cb.on_entry_started(&self.handle, source);
        }

        let index = self.entries.len();
        self.entries.push(EntryRecord {
            id: Uuid::new_v4(),
            source_path: source.to_path_buf(),
            destination_path: None,
            kind: EntryKind::Unknown,
            outcome: EntryOutcome::Interrupted,
            bytes_transferred: 0,
            top_level,
            error_code: None,
            error_message: None,
        });

        let outcome = self.transfer_entry(index, source, dest_folder, top_level, progress);
        self.entries[index].outcome = outcome;

        if let Some(cb) = progress {
            cb.on_entry_completed(&self.handle, &self.entries[index]);
        }
        outcome
    }

    fn transfer_entry(
        &mut self,
        index: usize,
        source: &Path,
        dest_folder: &Path,
        top_level: bool,
        progress: Option<&dyn ProgressCallback>,
    ) -> EntryOutcome {
        let fs = Arc::clone(&self.fs);
        let decisions = Arc::clone(&self.decisions);
        let handle = self.handle.clone();
        let stopped = || handle.is_interrupted();
        let policy = RetryPolicy::new(decisions.as_ref(), handle.mode().error_title(), &stopped);

        // START: destination name and path.
        let dest_name = match self.destination_name(source, top_level) {
            Ok(name) => name,
            Err(e) => return self.fail(index, EntryOutcome::Failed, e),
        };
        let mut destination = dest_folder.join(dest_name);
        self.entries[index].destination_path = Some(destination.clone());

        // CLASSIFY
        let meta = match policy.run(OperationKind::Stat, source, || fs.stat(source)) {
            Attempt::Done(meta) => meta,
            Attempt::Skipped(e) => {
                let err = EntryError::Stat { path: source.to_path_buf(), source: e };
                return self.fail(index, EntryOutcome::Skipped, err);
            }
            Attempt::Cancelled(e) => {
                let err = EntryError::Stat { path: source.to_path_buf(), source: e };
                return self.cancel(index, err);
            }
        };
        self.entries[index].kind = if meta.is_symlink {
            EntryKind::Symlink
        } else if meta.is_dir {
            EntryKind::Directory
        } else {
            EntryKind::File
        };

        if meta.is_symlink && fs.location(source) == Location::Local {
            return self.copy_symlink(index, fs.as_ref(), source, &destination);
        }

        if fs.location(source) == Location::RemoteDevice
            && fs.location(dest_folder) == Location::Local
            && !meta.is_dir
        {
            self.entries[index].kind = EntryKind::Remote;
            return self.push_remote(index, fs.as_ref(), source, &destination);
        }

        if meta.is_dir && self.copies_into_itself(source, dest_folder, &destination) {
            let e = io::Error::new(io::ErrorKind::InvalidInput, "destination is inside the source folder");
            let err = EntryError::DestinationInsideSource { path: source.to_path_buf() };
            return match report_only(&policy, OperationKind::CopyIntoItself, source, &e) {
                ErrorDecision::Cancel => self.cancel(index, err),
                _ => self.fail(index, EntryOutcome::Skipped, err),
            };
        }

        // Collision check.
        match self
            .resolver
            .resolve(fs.as_ref(), decisions.as_ref(), source, &meta, destination.clone())
        {
            CollisionOutcome::Proceed(path) | CollisionOutcome::Renamed(path) => destination = path,
            CollisionOutcome::Skip => {
                if !meta.is_dir {
                    handle.add_skipped(meta.size);
                }
                debug!("skipping {}: destination exists", source.display());
                return EntryOutcome::Skipped;
            }
            CollisionOutcome::Cancel => {
                handle.interrupt();
                return EntryOutcome::Interrupted;
            }
        }
        self.entries[index].destination_path = Some(destination.clone());

        if meta.is_dir {
            self.copy_directory(index, &policy, source, &meta, &destination, progress)
        } else {
            self.copy_file(index, &policy, source, &meta, &destination, progress)
        }
    }

    fn copy_directory(
        &mut self,
        index: usize,
        policy: &RetryPolicy<'_>,
        source: &Path,
        meta: &EntryMeta,
        destination: &Path,
        progress: Option<&dyn ProgressCallback>,
    ) -> EntryOutcome {
        let fs = Arc::clone(&self.fs);

        let exists_as_dir = fs.stat(destination).map(|m| m.is_dir).unwrap_or(false);
        if !exists_as_dir {
            match policy.run(OperationKind::CreateDirectory, destination, || fs.mkdir(destination)) {
                Attempt::Done(()) => {}
                Attempt::Skipped(e) => {
                    let err = EntryError::DirectoryCreate { path: destination.to_path_buf(), source: e };
                    return self.fail(index, EntryOutcome::Skipped, err);
                }
                Attempt::Cancelled(e) => {
                    let err = EntryError::DirectoryCreate { path: destination.to_path_buf(), source: e };
                    return self.cancel(index, err);
                }
            }
        }

        let children = match policy.run(OperationKind::ListDirectory, source, || fs.list(source)) {
            Attempt::Done(children) => children,
            Attempt::Skipped(e) => {
                let err = EntryError::DirectoryList { path: source.to_path_buf(), source: e };
                return self.fail(index, EntryOutcome::Skipped, err);
            }
            Attempt::Cancelled(e) => {
                let err = EntryError::DirectoryList { path: source.to_path_buf(), source: e };
                return self.cancel(index, err);
            }
        };

        // RECURSE_DIR: this directory's destination is the children's folder.
        let mut all_done = true;
        for child in &children {
            if self.handle.is_interrupted() {
                all_done = false;
                break;
            }
            if self.process_entry(child, destination, false, progress) != EntryOutcome::Done {
                all_done = false;
            }
        }

        // Date last, so that writing the children does not touch it again.
        if let Some(modified) = meta.modified {
            if fs.supports_set_modified(destination) {
                if let Err(e) = fs.set_modified(destination, modified) {
                    debug!(
                        "{}",
                        EntryError::TimestampPreservation { path: destination.to_path_buf(), source: e }
                    );
                }
            }
        }

        if self.handle.is_interrupted() {
            return EntryOutcome::Interrupted;
        }
        if all_done {
            self.dispose(index, source, meta);
        }
        EntryOutcome::Done
    }

    fn copy_file(
        &mut self,
        index: usize,
        policy: &RetryPolicy<'_>,
        source: &Path,
        meta: &EntryMeta,
        destination: &Path,
        progress: Option<&dyn ProgressCallback>,
    ) -> EntryOutcome {
        let fs = Arc::clone(&self.fs);
        let handle = self.handle.clone();
        let append = self.append;
        let buffer_size = self.options.buffer_size;

        loop {
            // Where this attempt's bytes start in the destination.
            let mut offset = 0u64;
            let attempt = policy.run(OperationKind::CopyBytes, source, || {
                offset = if append {
                    fs.stat(destination).map(|m| m.size).unwrap_or(0)
                } else {
                    0
                };
                let mut counted = 0u64;
                let copied = copy_file_bytes(fs.as_ref(), source, destination, append, buffer_size, |n| {
                    counted += n;
                    handle.add_transferred(n);
                    if let Some(cb) = progress {
                        cb.on_bytes(&handle, n);
                    }
                    !handle.is_interrupted()
                });
                if copied.is_err() {
                    // A failed attempt leaves nothing counted behind.
                    handle.remove_transferred(counted);
                }
                copied
            });

            let copied = match attempt {
                Attempt::Done(copied) => copied,
                Attempt::Skipped(e) => {
                    handle.add_skipped(meta.size);
                    let err = EntryError::ByteCopy { path: source.to_path_buf(), source: e };
                    return self.fail(index, EntryOutcome::Skipped, err);
                }
                Attempt::Cancelled(e) => {
                    let err = EntryError::ByteCopy { path: source.to_path_buf(), source: e };
                    return self.cancel(index, err);
                }
            };
            self.entries[index].bytes_transferred = copied;

            if self.options.preserve_file_times && fs.supports_set_modified(destination) {
                if let Some(modified) = meta.modified {
                    if let Err(e) = fs.set_modified(destination, modified) {
                        debug!(
                            "{}",
                            EntryError::TimestampPreservation { path: destination.to_path_buf(), source: e }
                        );
                    }
                }
            }

            let Some(algorithm) = self.options.integrity_check else {
                break;
            };
            handle.set_phase(Phase::VerifyingIntegrity);
            let verified = checksums::verify_copy(fs.as_ref(), source, destination, offset, algorithm);
            handle.set_phase(Phase::Transferring);
            let err = match verified {
                Ok(None) => break,
                Ok(Some(reason)) => io::Error::new(io::ErrorKind::InvalidData, reason),
                Err(e) => e,
            };
            let reason = err.to_string();
            if handle.is_interrupted() {
                return EntryOutcome::Interrupted;
            }
            match policy.report(OperationKind::IntegrityCheck, destination, &err) {
                ErrorDecision::Retry => {
                    // Copy again; the bytes of the bad copy no longer count.
                    handle.remove_transferred(copied);
                    self.entries[index].bytes_transferred = 0;
                }
                ErrorDecision::Skip => {
                    let err = EntryError::IntegrityMismatch { path: destination.to_path_buf(), reason };
                    return self.fail(index, EntryOutcome::Failed, err);
                }
                ErrorDecision::Cancel => {
                    let err = EntryError::IntegrityMismatch { path: destination.to_path_buf(), reason };
                    return self.cancel(index, err);
                }
            }
        }

        self.dispose(index, source, meta);
        EntryOutcome::Done
    }

    /// Recreate a local symbolic link without following it.
    fn copy_symlink(
        &mut self,
        index: usize,
        fs: &dyn FileSystem,
        source: &Path,
        destination: &Path,
    ) -> EntryOutcome {
        let linked = fs
            .read_link(source)
            .and_then(|target| fs.symlink(&target, destination));
        match linked {
            Ok(()) => EntryOutcome::Done,
            Err(e) => {
                let err = EntryError::Symlink { path: destination.to_path_buf(), source: e };
                self.fail(index, EntryOutcome::Failed, err)
            }
        }
    }

    /// Single attempt through the store's own push primitive.
    fn push_remote(
        &mut self,
        index: usize,
        fs: &dyn FileSystem,
        source: &Path,
        destination: &Path,
    ) -> EntryOutcome {
        match fs.push_to(source, destination) {
            Ok(bytes) => {
                self.handle.add_transferred(bytes);
                self.entries[index].bytes_transferred = bytes;
                EntryOutcome::Done
            }
            Err(e) => {
                let err = EntryError::RemotePush { path: source.to_path_buf(), source: e };
                self.fail(index, EntryOutcome::Failed, err)
            }
        }
    }

    fn dispose(&mut self, index: usize, source: &Path, meta: &EntryMeta) {
        if let Err(e) = self.disposal.dispose(self.fs.as_ref(), source, meta) {
            let err = EntryError::SourceDisposal { path: source.to_path_buf(), source: e };
            warn!("{}", err);
            self.record_error(index, &err);
        }
    }

    fn destination_name(&self, source: &Path, top_level: bool) -> Result<OsString, EntryError> {
        if top_level {
            if let Some(name) = &self.new_name {
                return Ok(OsString::from(name));
            }
        }
        source
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| EntryError::DestinationConstruction {
                source_path: source.to_path_buf(),
                reason: "source has no file name".to_string(),
            })
    }

    /// Compares resolved paths, so `..`, `.` and links cannot hide the source.
    fn copies_into_itself(&self, source: &Path, dest_folder: &Path, destination: &Path) -> bool {
        let Some(name) = destination.file_name() else {
            return false;
        };
        let resolved_source = self.fs.resolve(source);
        let resolved_destination = self.fs.resolve(dest_folder).join(name);
        destination_inside_source(&resolved_source, &resolved_destination)
    }

    fn record_error(&mut self, index: usize, err: &EntryError) {
        let record = &mut self.entries[index];
        record.error_code = err.raw_os_error();
        record.error_message = Some(err.to_string());
    }

    fn fail(&mut self, index: usize, outcome: EntryOutcome, err: EntryError) -> EntryOutcome {
        warn!("{}", err);
        self.record_error(index, &err);
        outcome
    }

    /// Cancel decision: stop the whole job.
    fn cancel(&mut self, index: usize, err: EntryError) -> EntryOutcome {
        if !self.handle.is_interrupted() {
            self.record_error(index, &err);
        }
        self.handle.interrupt();
        EntryOutcome::Interrupted
    }
}

fn copy_file_bytes<F>(
    fs: &dyn FileSystem,
    source: &Path,
    destination: &Path,
    append: bool,
    buffer_size: usize,
    on_chunk: F,
) -> io::Result<u64>
where
    F: FnMut(u64) -> bool,
{
    let mut reader = fs.open_read(source)?;
    let mut writer = fs.open_write(destination, append)?;
    copy_stream(&mut reader, &mut writer, buffer_size, on_chunk)
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains(std::path::MAIN_SEPARATOR)
}
