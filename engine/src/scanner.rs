//! Background pre-scan of the source set.
//!
//! The scanner walks the same `FileSet` as the job on its own thread, only to
//! total up bytes and entries for the progress estimate. It never writes to
//! any file system and can be stopped at any time.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, trace};

use crate::fs_ops::FileSystem;
use crate::model::FileSet;

/// Totals published by the scanner. Only the scan thread writes.
#[derive(Debug, Default)]
struct ScanState {
    total_bytes: AtomicU64,
    total_files: AtomicU64,
    completed: AtomicBool,
    interrupted: AtomicBool,
}

/// Read side of a running (or finished) scan.
#[derive(Debug, Clone)]
pub struct ScanHandle {
    state: Arc<ScanState>,
}

impl ScanHandle {
    /// True once the walk finished without being interrupted. Never becomes
    /// true after `interrupt`.
    pub fn is_completed(&self) -> bool {
        // The walk may have stored `completed` just after an interrupt.
        self.state.completed.load(Ordering::Acquire) && !self.is_interrupted()
    }

    /// Bytes of all regular files seen so far.
    pub fn total_bytes(&self) -> u64 {
        self.state.total_bytes.load(Ordering::Acquire)
    }

    /// Entries seen so far, directories included.
    pub fn total_files(&self) -> u64 {
        self.state.total_files.load(Ordering::Acquire)
    }

    /// Ask the walk to stop as soon as possible.
    pub fn interrupt(&self) {
        self.state.interrupted.store(true, Ordering::Release);
    }

    pub fn is_interrupted(&self) -> bool {
        self.state.interrupted.load(Ordering::Acquire)
    }
}

/// Owns the scan thread.
pub struct DirectoryScanner {
    handle: ScanHandle,
    thread: Option<JoinHandle<()>>,
}

impl DirectoryScanner {
    /// Spawn the scan thread over `files`.
    pub fn start(files: FileSet, fs: Arc<dyn FileSystem>) -> Self {
        let handle = ScanHandle {
            state: Arc::new(ScanState::default()),
        };
        let state = Arc::clone(&handle.state);
        let thread = thread::Builder::new()
            .name("copyjob-scan".to_string())
            .spawn(move || run_scan(&files, fs.as_ref(), &state));

        let thread = match thread {
            Ok(thread) => Some(thread),
            Err(e) => {
                // No scan means the estimator stays on its fallback.
                debug!("could not spawn scan thread: {}", e);
                None
            }
        };

        DirectoryScanner { handle, thread }
    }

    pub fn handle(&self) -> ScanHandle {
        self.handle.clone()
    }

    pub fn is_completed(&self) -> bool {
        self.handle.is_completed()
    }

    pub fn interrupt(&self) {
        self.handle.interrupt();
    }

    /// Wait for the scan thread to exit.
    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for DirectoryScanner {
    fn drop(&mut self) {
        // Detached threads would keep walking a tree nobody needs anymore.
        if !self.handle.is_completed() {
            self.handle.interrupt();
        }
    }
}

fn run_scan(files: &FileSet, fs: &dyn FileSystem, state: &ScanState) {
    for path in files.iter() {
        if !scan_entry(path, fs, state) {
            debug!("scan interrupted");
            return;
        }
    }
    if !state.interrupted.load(Ordering::Acquire) {
        state.completed.store(true, Ordering::Release);
        debug!(
            bytes = state.total_bytes.load(Ordering::Relaxed),
            files = state.total_files.load(Ordering::Relaxed),
            "scan completed"
        );
    }
}

/// Returns false if the scan was interrupted.
fn scan_entry(path: &Path, fs: &dyn FileSystem, state: &ScanState) -> bool {
    if state.interrupted.load(Ordering::Acquire) {
        return false;
    }
    state.total_files.fetch_add(1, Ordering::AcqRel);

    let meta = match fs.stat(path) {
        Ok(meta) => meta,
        Err(e) => {
            trace!("scan cannot stat {}: {}", path.display(), e);
            return true;
        }
    };

    if meta.is_dir && !meta.is_symlink {
        let children = match fs.list(path) {
            Ok(children) => children,
            Err(e) => {
                trace!("scan cannot list {}: {}", path.display(), e);
                return true;
            }
        };
        for child in &children {
            if !scan_entry(child, fs, state) {
                return false;
            }
        }
    } else if !meta.is_symlink {
        state.total_bytes.fetch_add(meta.size, Ordering::AcqRel);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_ops::LocalFileSystem;
    use std::fs;

    #[test]
    fn test_scan_totals_nested_tree() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir_all(src.join("sub")).expect("Failed to create dirs");
        fs::write(src.join("a.txt"), b"12345").expect("Failed to write a");
        fs::write(src.join("sub").join("b.txt"), b"123").expect("Failed to write b");
        let single = temp_dir.path().join("single.bin");
        fs::write(&single, b"12").expect("Failed to write single");

        let files: FileSet = [src, single].into_iter().collect();
        let mut scanner = DirectoryScanner::start(files, Arc::new(LocalFileSystem::new()));
        scanner.join();

        let handle = scanner.handle();
        assert!(handle.is_completed());
        assert_eq!(handle.total_bytes(), 10);
        // src, sub, a.txt, b.txt, single.bin
        assert_eq!(handle.total_files(), 5);
    }

    #[test]
    fn test_interrupted_scan_never_completes() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        fs::write(temp_dir.path().join("a"), b"1").expect("Failed to write");

        let handle = ScanHandle {
            state: Arc::new(ScanState::default()),
        };
        handle.interrupt();
        let files: FileSet = [temp_dir.path().to_path_buf()].into_iter().collect();
        run_scan(&files, &LocalFileSystem::new(), &handle.state);

        assert!(!handle.is_completed());
        assert!(handle.is_interrupted());
        assert_eq!(handle.total_files(), 0);
    }

    #[test]
    fn test_missing_source_is_counted_but_ignored() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let files: FileSet = [temp_dir.path().join("nonexistent")].into_iter().collect();
        let mut scanner = DirectoryScanner::start(files, Arc::new(LocalFileSystem::new()));
        scanner.join();

        let handle = scanner.handle();
        assert!(handle.is_completed());
        assert_eq!(handle.total_bytes(), 0);
        assert_eq!(handle.total_files(), 1);
    }

    #[test]
    fn test_interrupt_after_completion_clears_completed() {
        let handle = ScanHandle {
            state: Arc::new(ScanState::default()),
        };
        // Walk finished and an interrupt raced with the final store.
        handle.state.completed.store(true, Ordering::Release);
        assert!(handle.is_completed());

        handle.interrupt();
        assert!(!handle.is_completed());
    }
}
