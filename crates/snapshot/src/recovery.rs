/// Cross-attempt snapshot resolution and loading.
///
/// Walks backward from the attempt before the current one toward attempt 0.
/// An attempt without a directory died before its first snapshot; an
/// attempt whose directory holds no file likewise. The first attempt with
/// a file wins, and within it the greatest file name under the configured
/// [`SnapshotOrder`].
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use namespace::{FileStatus, Namespace};
use tracing::{info, warn};

use crate::error::IoContext;
use crate::{MatrixPartitionEngine, SnapshotError, SnapshotOrder, SnapshotPaths};

/// A snapshot picked for recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSnapshot {
    /// Attempt that wrote the file.
    pub attempt_index: u32,
    pub path: PathBuf,
}

/// Result of one recovery run.
#[derive(Debug)]
pub enum RecoveryOutcome {
    /// The snapshot was found and loaded into the engine.
    Recovered(ResolvedSnapshot),
    /// No earlier attempt left a snapshot; the worker starts empty.
    NotFound,
    /// Resolution or loading failed. The engine keeps whatever state the
    /// failed load left behind.
    Failed(SnapshotError),
}

impl RecoveryOutcome {
    pub fn is_recovered(&self) -> bool {
        matches!(self, RecoveryOutcome::Recovered(_))
    }
}

/// Orders two snapshot file names.
///
/// `Lexicographic` compares raw bytes, so `snapshots_10 < snapshots_2`.
/// `Numeric` compares the number after the last `_`; names without one
/// sort below every numbered name and among themselves by bytes.
pub fn compare_snapshot_names(order: SnapshotOrder, a: &str, b: &str) -> Ordering {
    match order {
        SnapshotOrder::Lexicographic => a.as_bytes().cmp(b.as_bytes()),
        SnapshotOrder::Numeric => {
            let generation_of = |name: &str| {
                name.rsplit_once('_')
                    .and_then(|(_, n)| n.parse::<u64>().ok())
            };
            generation_of(a)
                .cmp(&generation_of(b))
                .then_with(|| a.as_bytes().cmp(b.as_bytes()))
        }
    }
}

pub struct RecoveryResolver<'a> {
    namespace: &'a dyn Namespace,
    paths: &'a SnapshotPaths,
    order: SnapshotOrder,
}

impl<'a> RecoveryResolver<'a> {
    pub fn new(namespace: &'a dyn Namespace, paths: &'a SnapshotPaths, order: SnapshotOrder) -> Self {
        Self {
            namespace,
            paths,
            order,
        }
    }

    /// Finds the newest usable snapshot among earlier attempts.
    ///
    /// Returns `Ok(None)` when no earlier attempt produced a file, including
    /// on attempt 0. Never reads the current attempt's directory.
    pub fn find_previous_snapshot(&self) -> Result<Option<ResolvedSnapshot>, SnapshotError> {
        let attempt = self.paths.attempt();

        for index in (0..attempt.attempt_index).rev() {
            let dir = self.paths.attempt_dir(index);
            if !self.namespace.exists(&dir).io_context("check", &dir)? {
                warn!(
                    worker = attempt.worker_index,
                    attempt = index,
                    "attempt failed without writing snapshots"
                );
                continue;
            }

            match self.latest_file(&dir)? {
                Some(status) => {
                    info!(attempt = index, path = %status.path.display(), "found previous snapshot");
                    return Ok(Some(ResolvedSnapshot {
                        attempt_index: index,
                        path: status.path,
                    }));
                }
                None => warn!(dir = %dir.display(), "no snapshot file in attempt directory"),
            }
        }

        Ok(None)
    }

    /// Greatest file (not directory) in `dir`.
    fn latest_file(&self, dir: &Path) -> Result<Option<FileStatus>, SnapshotError> {
        let entries = self.namespace.list_status(dir).io_context("list", dir)?;
        Ok(entries
            .into_iter()
            .filter(|e| e.is_file)
            .max_by(|a, b| compare_snapshot_names(self.order, &a.name, &b.name)))
    }

    /// Resolves the previous snapshot and loads it into `engine`.
    ///
    /// Never returns an error: failures are logged and reported as
    /// [`RecoveryOutcome::Failed`].
    pub fn recover(&self, engine: &dyn MatrixPartitionEngine) -> RecoveryOutcome {
        let resolved = match self.find_previous_snapshot() {
            Ok(Some(resolved)) => resolved,
            Ok(None) => {
                warn!(attempt = %self.paths.attempt(), "snapshot file not found, no recovery happened");
                return RecoveryOutcome::NotFound;
            }
            Err(e) => {
                warn!(error = %e, "recovery failed while resolving snapshot");
                return RecoveryOutcome::Failed(e);
            }
        };

        info!(path = %resolved.path.display(), "recovering from snapshot");
        match self.load(engine, &resolved.path) {
            Ok(()) => RecoveryOutcome::Recovered(resolved),
            Err(e) => {
                warn!(error = %e, "recovery failed while loading snapshot");
                RecoveryOutcome::Failed(e)
            }
        }
    }

    fn load(&self, engine: &dyn MatrixPartitionEngine, path: &Path) -> Result<(), SnapshotError> {
        let mut input = self.namespace.open(path).io_context("open", path)?;
        engine
            .parse_matrices_from_input(&mut *input)
            .map_err(|source| SnapshotError::Engine {
                context: format!("load matrices from {}", path.display()),
                source,
            })
    }
}
