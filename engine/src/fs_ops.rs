//! Filesystem access used by the engine.
//!
//! The engine never touches `std::fs` directly: every operation goes through
//! the `FileSystem` trait so hosts can plug in remote stores or archives, and
//! tests can inject failures. `LocalFileSystem` is the plain local-disk
//! implementation.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Where an entry physically lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Local disk
    Local,
    /// Remote-backed device store with its own push primitive
    RemoteDevice,
    /// Any other remote protocol
    Remote,
}

/// Attributes of an entry, read without following symbolic links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    pub is_dir: bool,
    pub is_symlink: bool,
    /// Size in bytes (0 for directories)
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Storage primitives the engine consumes.
///
/// All methods are called from the job's own thread, except `stat` and
/// `list`, which the scanner also calls from its thread.
pub trait FileSystem: Send + Sync {
    /// Attributes of `path` (symbolic links are not followed).
    fn stat(&self, path: &Path) -> io::Result<EntryMeta>;

    fn exists(&self, path: &Path) -> bool {
        self.stat(path).is_ok()
    }

    /// Children of a directory, in the order the store returns them.
    fn list(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Create a single directory.
    fn mkdir(&self, path: &Path) -> io::Result<()>;

    fn supports_set_modified(&self, _path: &Path) -> bool {
        true
    }

    fn set_modified(&self, path: &Path, time: SystemTime) -> io::Result<()>;

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;

    /// Open for writing, truncating unless `append` is set.
    fn open_write(&self, path: &Path, append: bool) -> io::Result<Box<dyn Write + Send>>;

    fn read_link(&self, path: &Path) -> io::Result<PathBuf>;

    /// Create a symbolic link at `link` pointing to `target`.
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;

    /// Remove a file, link or empty directory.
    fn remove(&self, path: &Path) -> io::Result<()>;

    fn location(&self, _path: &Path) -> Location {
        Location::Local
    }

    /// Optimized transfer of a remote-device file to a local destination.
    /// Returns the number of bytes transferred.
    fn push_to(&self, source: &Path, _destination: &Path) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("{} is not on a remote device", source.display()),
        ))
    }

    /// The writable archive containing `path`, if any.
    fn writable_archive_of(&self, _path: &Path) -> Option<PathBuf> {
        None
    }

    /// Repack an archive after entries were added to it.
    fn optimize_archive(&self, _archive: &Path) -> io::Result<()> {
        Ok(())
    }

    /// True if both paths name the same file once resolved.
    fn same_file(&self, a: &Path, b: &Path) -> bool {
        self.resolve(a) == self.resolve(b)
    }

    /// Absolute form of `path` with `.`, `..` and links resolved. Stores
    /// without such aliases return the path unchanged.
    fn resolve(&self, path: &Path) -> PathBuf {
        path.to_path_buf()
    }
}

/// Local-disk implementation backed by `std::fs` and `filetime`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        LocalFileSystem
    }
}

impl FileSystem for LocalFileSystem {
    fn stat(&self, path: &Path) -> io::Result<EntryMeta> {
        let metadata = fs::symlink_metadata(path)?;
        Ok(EntryMeta {
            is_dir: metadata.is_dir(),
            is_symlink: metadata.file_type().is_symlink(),
            size: if metadata.is_file() { metadata.len() } else { 0 },
            modified: metadata.modified().ok(),
        })
    }

    fn list(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut children = Vec::new();
        for entry in fs::read_dir(path)? {
            children.push(entry?.path());
        }
        Ok(children)
    }

    fn mkdir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir(path)
    }

    fn set_modified(&self, path: &Path, time: SystemTime) -> io::Result<()> {
        filetime::set_file_mtime(path, filetime::FileTime::from_system_time(time))
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(fs::File::open(path)?))
    }

    fn open_write(&self, path: &Path, append: bool) -> io::Result<Box<dyn Write + Send>> {
        let mut options = fs::OpenOptions::new();
        options.create(true);
        if append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        Ok(Box::new(options.open(path)?))
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        fs::read_link(path)
    }

    #[cfg(unix)]
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        std::os::unix::fs::symlink(target, link)
    }

    #[cfg(windows)]
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        let target_is_dir = link
            .parent()
            .map(|parent| parent.join(target).is_dir())
            .unwrap_or(false);
        if target_is_dir {
            std::os::windows::fs::symlink_dir(target, link)
        } else {
            std::os::windows::fs::symlink_file(target, link)
        }
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        let metadata = fs::symlink_metadata(path)?;
        if metadata.is_dir() {
            fs::remove_dir(path)
        } else {
            fs::remove_file(path)
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Copy everything from `reader` to `writer` in `buffer_size` chunks.
///
/// `on_chunk` is called after each chunk with its length and may stop the
/// copy by returning false, in which case an `Interrupted` error is returned.
pub fn copy_stream<R, W, F>(
    reader: &mut R,
    writer: &mut W,
    buffer_size: usize,
    mut on_chunk: F,
) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
    F: FnMut(u64) -> bool,
{
    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buffer[..n])?;
        total += n as u64;
        if !on_chunk(n as u64) {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "copy interrupted"));
        }
    }
    writer.flush()?;
    Ok(total)
}
