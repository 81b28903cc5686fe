/// Snapshot writer: the periodic write → flush → rename → prune cycle.
///
/// A cycle first streams the full matrix image into the single temporary
/// artifact `_temporary/snapshots_`, flushes and closes it, and only then
/// renames it to `snapshots_<generation>`. A crash before the rename leaves
/// nothing new under a final name; a crash after it leaves a complete file.
///
/// Pruning deletes `snapshots_<generation - 2>` once the rename of
/// `snapshots_<generation>` has returned, so at most two completed files
/// coexist and at least one survives a crash at any step.
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use namespace::Namespace;
use tracing::{debug, error, info, warn};

use crate::error::IoContext;
use crate::{MatrixPartitionEngine, SnapshotError, SnapshotPaths};

/// How the background loop ended.
#[derive(Debug)]
pub enum WriterExit {
    /// A stop was requested (or the stop channel went away).
    Stopped,
    /// A cycle failed. No further snapshots are taken by this process.
    Failed(SnapshotError),
}

impl WriterExit {
    pub fn is_failed(&self) -> bool {
        matches!(self, WriterExit::Failed(_))
    }
}

pub struct SnapshotWriter {
    namespace: Arc<dyn Namespace>,
    engine: Arc<dyn MatrixPartitionEngine>,
    paths: SnapshotPaths,
    /// Generation the next completed snapshot will carry.
    generation: u64,
    /// Mirror of `generation` readable from other threads.
    published: Arc<AtomicU64>,
}

impl SnapshotWriter {
    pub fn new(
        namespace: Arc<dyn Namespace>,
        engine: Arc<dyn MatrixPartitionEngine>,
        paths: SnapshotPaths,
    ) -> Self {
        Self::with_progress(namespace, engine, paths, Arc::new(AtomicU64::new(0)))
    }

    /// Like [`new`](Self::new), publishing the number of completed
    /// snapshots into `published` after every rename.
    pub fn with_progress(
        namespace: Arc<dyn Namespace>,
        engine: Arc<dyn MatrixPartitionEngine>,
        paths: SnapshotPaths,
        published: Arc<AtomicU64>,
    ) -> Self {
        published.store(0, Ordering::Release);
        Self {
            namespace,
            engine,
            paths,
            generation: 0,
            published,
        }
    }

    /// Number of snapshots completed so far, which is also the generation
    /// of the next one.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn paths(&self) -> &SnapshotPaths {
        &self.paths
    }

    /// Runs one full cycle and returns the path of the new snapshot.
    ///
    /// # Errors
    ///
    /// Any namespace or engine failure. When the error comes from the
    /// rename or earlier, the generation counter is unchanged.
    pub fn write_snapshot(&mut self) -> Result<PathBuf, SnapshotError> {
        let attempt = self.paths.attempt();
        info!(%attempt, generation = self.generation, "start to write matrix snapshot");
        let start = Instant::now();

        let temp_dir = self.paths.temp_dir();
        if !self
            .namespace
            .exists(&temp_dir)
            .io_context("check", &temp_dir)?
        {
            self.namespace
                .mkdirs(&temp_dir)
                .io_context("create directory", &temp_dir)?;
        }

        let temp_file = self.paths.temp_file();
        {
            let mut output = self
                .namespace
                .create(&temp_file)
                .io_context("create", &temp_file)?;
            info!(path = %temp_file.display(), "write matrix snapshot");
            self.engine
                .write_matrix(&mut *output)
                .map_err(|source| SnapshotError::Engine {
                    context: format!("serialize matrices to {}", temp_file.display()),
                    source,
                })?;
            output.flush().io_context("flush", &temp_file)?;
        }

        let generation = self.generation;
        let dest = self.paths.snapshot_file(generation);
        self.namespace
            .rename(&temp_file, &dest)
            .io_context("rename temporary snapshot to", &dest)?;
        self.generation += 1;
        self.published.store(self.generation, Ordering::Release);
        info!(from = %temp_file.display(), to = %dest.display(), "rename success");

        if let Some(old) = generation.checked_sub(2) {
            let old_path = self.paths.snapshot_file(old);
            if self
                .namespace
                .exists(&old_path)
                .io_context("check", &old_path)?
            {
                info!(path = %old_path.display(), "deleting old snapshot file");
                self.namespace
                    .delete(&old_path, false)
                    .io_context("delete", &old_path)?;
            }
        }

        info!(
            generation,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "write snapshots done"
        );
        Ok(dest)
    }

    /// The background loop: sleep `interval`, write, repeat.
    ///
    /// Returns as soon as a message arrives on `stop` (or its sender is
    /// dropped) while sleeping, or after the first failed cycle.
    pub fn run(mut self, interval: Duration, stop: Receiver<()>) -> WriterExit {
        info!(
            attempt = %self.paths.attempt(),
            interval_ms = interval.as_millis() as u64,
            "starting snapshot writer"
        );
        loop {
            debug!("snapshot writer is to sleep");
            match stop.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) => {
                    debug!(generation = self.generation, "snapshot writer stopped");
                    return WriterExit::Stopped;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("snapshot writer lost its stop channel, returning");
                    return WriterExit::Stopped;
                }
            }

            if let Err(e) = self.write_snapshot() {
                error!(error = %e, "taking snapshots failed, snapshot writer exits");
                return WriterExit::Failed(e);
            }
        }
    }
}
