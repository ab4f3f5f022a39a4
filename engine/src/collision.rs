//! Destination collision handling.
//!
//! Decides what to do when the destination of an entry already exists: write
//! over it, leave it, pick a fresh name, or stop the job. The only state kept
//! between calls is the job's current default action, which an "apply to
//! all" answer replaces.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::decision::{
    CollisionAction, CollisionChoice, CollisionContext, CollisionKind, DecisionProvider,
};
use crate::fs_ops::{EntryMeta, FileSystem};

/// Where (and whether) an entry should be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollisionOutcome {
    /// Write to the given path (free, merged into, or overwritten)
    Proceed(PathBuf),
    /// Write to a different, free path
    Renamed(PathBuf),
    /// Leave the destination alone and do not transfer the entry
    Skip,
    /// Stop the whole job
    Cancel,
}

/// Resolves collisions for one job.
#[derive(Debug, Clone)]
pub struct CollisionResolver {
    default_action: CollisionAction,
}

impl CollisionResolver {
    pub fn new(default_action: CollisionAction) -> Self {
        CollisionResolver { default_action }
    }

    pub fn default_action(&self) -> CollisionAction {
        self.default_action
    }

    /// Resolve `destination` for `source`.
    ///
    /// Renaming of top-level entries has already been applied by the caller.
    pub fn resolve(
        &mut self,
        fs: &dyn FileSystem,
        decisions: &dyn DecisionProvider,
        source: &Path,
        source_meta: &EntryMeta,
        destination: PathBuf,
    ) -> CollisionOutcome {
        let destination_meta = match fs.stat(&destination) {
            Ok(meta) => meta,
            Err(_) => return CollisionOutcome::Proceed(destination),
        };

        let kind = if fs.same_file(source, &destination) {
            CollisionKind::SameSourceAndDestination
        } else if source_meta.is_dir
            && !source_meta.is_symlink
            && destination_meta.is_dir
            && !destination_meta.is_symlink
        {
            // Folder onto folder: merge the contents.
            return CollisionOutcome::Proceed(destination);
        } else {
            CollisionKind::FileExists
        };

        let choice = match self.default_action {
            CollisionAction::Ask => {
                let context = CollisionContext {
                    kind,
                    source: source.to_path_buf(),
                    destination: destination.clone(),
                    source_meta: Some(source_meta.clone()),
                    destination_meta: Some(destination_meta.clone()),
                };
                match decisions.ask_collision(&context) {
                    Some(decision) => {
                        if decision.apply_to_all {
                            if let Some(action) = action_for(decision.choice) {
                                self.default_action = action;
                            }
                        }
                        decision.choice
                    }
                    None => CollisionChoice::Skip,
                }
            }
            CollisionAction::Overwrite => CollisionChoice::Overwrite,
            CollisionAction::OverwriteIfOlder => CollisionChoice::OverwriteIfOlder,
            CollisionAction::Skip => CollisionChoice::Skip,
            CollisionAction::Rename => CollisionChoice::Rename,
        };

        debug!(?kind, ?choice, destination = %destination.display(), "collision");

        match choice {
            CollisionChoice::Overwrite if kind == CollisionKind::FileExists => {
                CollisionOutcome::Proceed(destination)
            }
            CollisionChoice::OverwriteIfOlder if kind == CollisionKind::FileExists => {
                if is_older(&destination_meta, source_meta) {
                    CollisionOutcome::Proceed(destination)
                } else {
                    CollisionOutcome::Skip
                }
            }
            // A file is never overwritten with itself.
            CollisionChoice::Overwrite | CollisionChoice::OverwriteIfOlder => CollisionOutcome::Skip,
            CollisionChoice::Skip => CollisionOutcome::Skip,
            CollisionChoice::Rename => CollisionOutcome::Renamed(unique_name(fs, &destination)),
            CollisionChoice::Cancel => CollisionOutcome::Cancel,
        }
    }
}

fn action_for(choice: CollisionChoice) -> Option<CollisionAction> {
    match choice {
        CollisionChoice::Overwrite => Some(CollisionAction::Overwrite),
        CollisionChoice::OverwriteIfOlder => Some(CollisionAction::OverwriteIfOlder),
        CollisionChoice::Skip => Some(CollisionAction::Skip),
        CollisionChoice::Rename => Some(CollisionAction::Rename),
        CollisionChoice::Cancel => None,
    }
}

fn is_older(destination: &EntryMeta, source: &EntryMeta) -> bool {
    match (destination.modified, source.modified) {
        (Some(dst), Some(src)) => dst < src,
        // Unknown dates: overwrite rather than keep a possibly stale copy.
        _ => true,
    }
}

/// First free sibling of `path` named `stem (n).ext`.
pub fn unique_name(fs: &dyn FileSystem, path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());

    let mut n = 1u32;
    loop {
        let name = match &extension {
            Some(ext) => format!("{} ({}).{}", stem, n, ext),
            None => format!("{} ({})", stem, n),
        };
        let candidate = parent.join(name);
        if !fs.exists(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// True if `destination` lies inside the folder `source`.
pub fn destination_inside_source(source: &Path, destination: &Path) -> bool {
    destination != source && destination.starts_with(source)
}
