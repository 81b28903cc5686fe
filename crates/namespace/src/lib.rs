//! # Namespace - hierarchical store client
//!
//! The snapshot subsystem talks to its durable store only through the
//! [`Namespace`] trait: a path-addressable tree with create/open streams,
//! atomic rename, existence checks, listing and delete.
//!
//! [`LocalNamespace`] implements it over the local filesystem. Output
//! streams it hands out are buffered; `flush()` drains the buffer **and**
//! calls `sync_all()`, so a completed flush means the bytes are durable.
//!
//! ## Rename guarantee
//!
//! `rename` is assumed atomic: it either makes the destination visible with
//! the full contents of the source, or fails and leaves the source as it
//! was. Every crash-safety argument above this crate rests on that.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// One entry returned by [`Namespace::list_status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    /// Full path of the entry.
    pub path: PathBuf,
    /// Last path component.
    pub name: String,
    pub is_file: bool,
    /// Size in bytes (0 for directories).
    pub len: u64,
}

/// A hierarchical, path-addressable store.
///
/// Implementations must be shareable across threads: the snapshot writer
/// runs on its own thread while recovery runs on the caller's.
pub trait Namespace: Send + Sync {
    fn exists(&self, path: &Path) -> io::Result<bool>;

    /// Creates `path` and any missing parents. Succeeds if it already exists.
    fn mkdirs(&self, path: &Path) -> io::Result<()>;

    /// Opens `path` for writing, truncating existing content and creating
    /// missing parent directories.
    fn create(&self, path: &Path) -> io::Result<Box<dyn Write + Send>>;

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;

    /// Atomically moves `src` to `dst`.
    fn rename(&self, src: &Path, dst: &Path) -> io::Result<()>;

    /// Deletes a file, or a directory when `recursive` is set (a non-empty
    /// directory without `recursive` is an error). Returns `false` when
    /// nothing existed at `path`.
    fn delete(&self, path: &Path, recursive: bool) -> io::Result<bool>;

    /// Lists the direct children of a directory, in no particular order.
    fn list_status(&self, path: &Path) -> io::Result<Vec<FileStatus>>;
}

/// [`Namespace`] backed by `std::fs`. Paths are used as given.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalNamespace;

impl LocalNamespace {
    pub fn new() -> Self {
        Self
    }
}

/// Buffered file writer whose `flush` also fsyncs.
struct SyncedFile {
    inner: BufWriter<File>,
}

impl Write for SyncedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()?;
        self.inner.get_ref().sync_all()
    }
}

/// Persists directory entry changes under `dir`. A no-op off unix.
pub(crate) fn sync_dir(dir: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        File::open(dir)?.sync_all()?;
    }
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}

impl Namespace for LocalNamespace {
    fn exists(&self, path: &Path) -> io::Result<bool> {
        match fs::symlink_metadata(path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn mkdirs(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn create(&self, path: &Path) -> io::Result<Box<dyn Write + Send>> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Box::new(SyncedFile {
            inner: BufWriter::new(file),
        }))
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        let file = File::open(path)?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn rename(&self, src: &Path, dst: &Path) -> io::Result<()> {
        fs::rename(src, dst)?;
        if let Some(parent) = dst.parent() {
            if let Err(e) = sync_dir(parent) {
                // the rename itself is done; only its durability is in doubt
                warn!(dir = %parent.display(), error = %e, "directory fsync after rename failed");
            }
        }
        Ok(())
    }

    fn delete(&self, path: &Path, recursive: bool) -> io::Result<bool> {
        let meta = match fs::symlink_metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };
        if meta.is_dir() {
            if recursive {
                fs::remove_dir_all(path)?;
            } else {
                fs::remove_dir(path)?;
            }
        } else {
            fs::remove_file(path)?;
        }
        debug!(path = %path.display(), recursive, "deleted");
        Ok(true)
    }

    fn list_status(&self, path: &Path) -> io::Result<Vec<FileStatus>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            out.push(FileStatus {
                path: entry.path(),
                name: entry.file_name().to_string_lossy().into_owned(),
                is_file: meta.is_file(),
                len: if meta.is_file() { meta.len() } else { 0 },
            });
        }
        Ok(out)
    }
}
