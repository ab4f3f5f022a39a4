//! What happens after entries are transferred.
//!
//! - `SourceDisposal`: per-entry step once a source was fully transferred
//!   (nothing for a copy, delete for a move).
//! - `CompletionFinalizer`: once per job, after the last top-level entry.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::decision::{ErrorDecision, OperationKind};
use crate::error::EntryError;
use crate::fs_ops::{EntryMeta, FileSystem};
use crate::job::{JobHandle, Phase};
use crate::model::FileSet;
use crate::progress::ProgressCallback;
use crate::retry::{Attempt, RetryPolicy};

/// Applied to a source entry after it was transferred completely.
///
/// Directories are only handed over when all of their children were.
pub trait SourceDisposal: Send + Sync {
    fn dispose(&self, fs: &dyn FileSystem, source: &Path, meta: &EntryMeta) -> io::Result<()>;
}

/// Copy semantics: sources stay where they are.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeepSource;

impl SourceDisposal for KeepSource {
    fn dispose(&self, _fs: &dyn FileSystem, _source: &Path, _meta: &EntryMeta) -> io::Result<()> {
        Ok(())
    }
}

/// Move semantics: sources are removed once copied.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeleteSource;

impl SourceDisposal for DeleteSource {
    fn dispose(&self, fs: &dyn FileSystem, source: &Path, _meta: &EntryMeta) -> io::Result<()> {
        debug!("removing source {}", source.display());
        fs.remove(source)
    }
}

/// Result of the completion step.
#[derive(Debug, Default)]
pub struct Completion {
    /// Archive that was optimized
    pub optimized_archive: Option<PathBuf>,
    /// Archive optimization failure, if any
    pub archive_error: Option<EntryError>,
    /// File the host was asked to select
    pub selected: Option<PathBuf>,
}

/// Runs once after the whole file set was processed.
pub struct CompletionFinalizer<'a> {
    pub fs: &'a dyn FileSystem,
    pub policy: &'a RetryPolicy<'a>,
    pub handle: &'a JobHandle,
}

impl CompletionFinalizer<'_> {
    pub fn run(
        &self,
        files: &FileSet,
        dest_folder: &Path,
        new_name: Option<&str>,
        progress: Option<&dyn ProgressCallback>,
    ) -> Completion {
        let mut completion = Completion::default();

        if let Some(archive) = self.fs.writable_archive_of(dest_folder) {
            let name = archive
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| archive.display().to_string());
            self.handle.set_phase(Phase::OptimizingArchive(name));
            info!("optimizing archive {}", archive.display());

            match self
                .policy
                .run(OperationKind::OptimizeArchive, &archive, || self.fs.optimize_archive(&archive))
            {
                Attempt::Done(()) => completion.optimized_archive = Some(archive),
                Attempt::Skipped(e) => {
                    completion.archive_error = Some(EntryError::ArchiveOptimize { path: archive, source: e });
                }
                Attempt::Cancelled(e) => {
                    self.handle.interrupt();
                    completion.archive_error = Some(EntryError::ArchiveOptimize { path: archive, source: e });
                }
            }
            self.handle.set_phase(Phase::Transferring);
        }

        if self.handle.is_interrupted() {
            return completion;
        }

        // Same-folder copy under a new name: point the host at the new file.
        if let (Some(name), Some(only)) = (new_name, single_entry(files)) {
            let same_folder = only
                .parent()
                .map(|parent| self.fs.same_file(parent, dest_folder))
                .unwrap_or(false);
            if same_folder {
                let created = dest_folder.join(name);
                // Stat again so backends that lag behind report the new file.
                if self.fs.stat(&created).is_ok() {
                    if let Some(cb) = progress {
                        cb.select_file(&created);
                    }
                    completion.selected = Some(created);
                }
            }
        }

        completion
    }
}

fn single_entry(files: &FileSet) -> Option<&Path> {
    if files.len() == 1 {
        files.get(0)
    } else {
        None
    }
}

/// Decision applied to a report-only failure (no meaningful retry).
pub(crate) fn report_only(policy: &RetryPolicy<'_>, operation: OperationKind, path: &Path, err: &io::Error) -> ErrorDecision {
    match policy.report(operation, path, err) {
        ErrorDecision::Retry => ErrorDecision::Skip,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_ops::LocalFileSystem;
    use std::fs;

    #[test]
    fn test_keep_source_leaves_file() {
        let temp = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp.path().join("a");
        fs::write(&path, b"x").expect("write");
        let fs_ops = LocalFileSystem::new();
        let meta = fs_ops.stat(&path).expect("stat");

        KeepSource.dispose(&fs_ops, &path, &meta).expect("dispose");
        assert!(path.exists());
    }

    #[test]
    fn test_delete_source_removes_file_and_empty_dir() {
        let temp = tempfile::tempdir().expect("Failed to create temp dir");
        let dir = temp.path().join("d");
        let file = dir.join("a");
        fs::create_dir(&dir).expect("mkdir");
        fs::write(&file, b"x").expect("write");
        let fs_ops = LocalFileSystem::new();

        let meta = fs_ops.stat(&file).expect("stat");
        DeleteSource.dispose(&fs_ops, &file, &meta).expect("dispose file");
        let meta = fs_ops.stat(&dir).expect("stat");
        DeleteSource.dispose(&fs_ops, &dir, &meta).expect("dispose dir");
        assert!(!dir.exists());
    }

    #[test]
    fn test_single_entry() {
        let one: FileSet = ["a"].into_iter().collect();
        let two: FileSet = ["a", "b"].into_iter().collect();
        assert_eq!(single_entry(&one), Some(Path::new("a")));
        assert_eq!(single_entry(&two), None);
    }
}
