//! Snapshot path scheme.
//!
//! ```text
//! <root>/snapshots/<worker>/<attempt>/snapshots_<generation>   completed
//! <root>/snapshots/<worker>/<attempt>/_temporary/snapshots_    in flight
//! ```
//!
//! Each attempt writes only inside its own directory. Sibling attempts of
//! the same worker are reached by swapping the last path segment.

use std::fmt;
use std::path::{Path, PathBuf};

pub const SNAPSHOTS_DIR: &str = "snapshots";
pub const TEMP_DIR: &str = "_temporary";
pub const TEMP_FILE_NAME: &str = "snapshots_";
pub const SNAPSHOT_FILE_PREFIX: &str = "snapshots_";

/// A worker-group index paired with the attempt number of this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerAttemptId {
    pub worker_index: u32,
    pub attempt_index: u32,
}

impl WorkerAttemptId {
    pub fn new(worker_index: u32, attempt_index: u32) -> Self {
        Self {
            worker_index,
            attempt_index,
        }
    }
}

impl fmt::Display for WorkerAttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker_{}_attempt_{}", self.worker_index, self.attempt_index)
    }
}

/// Name of the completed snapshot for `generation`.
pub fn snapshot_file_name(generation: u64) -> String {
    format!("{}{}", SNAPSHOT_FILE_PREFIX, generation)
}

/// Every path one attempt reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPaths {
    attempt: WorkerAttemptId,
    worker_dir: PathBuf,
}

impl SnapshotPaths {
    pub fn new<P: AsRef<Path>>(root: P, attempt: WorkerAttemptId) -> Self {
        let worker_dir = root
            .as_ref()
            .join(SNAPSHOTS_DIR)
            .join(attempt.worker_index.to_string());
        Self {
            attempt,
            worker_dir,
        }
    }

    pub fn attempt(&self) -> WorkerAttemptId {
        self.attempt
    }

    /// `<root>/snapshots/<worker>`, parent of every attempt directory.
    pub fn worker_dir(&self) -> &Path {
        &self.worker_dir
    }

    pub fn attempt_dir(&self, attempt_index: u32) -> PathBuf {
        self.worker_dir.join(attempt_index.to_string())
    }

    /// This attempt's own directory.
    pub fn base_dir(&self) -> PathBuf {
        self.attempt_dir(self.attempt.attempt_index)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.base_dir().join(TEMP_DIR)
    }

    pub fn temp_file(&self) -> PathBuf {
        self.temp_dir().join(TEMP_FILE_NAME)
    }

    pub fn snapshot_file(&self, generation: u64) -> PathBuf {
        self.base_dir().join(snapshot_file_name(generation))
    }
}
