//! # Snapshot - checkpoint and recovery for a parameter-server worker
//!
//! Ties the [`namespace`] store, the [`matrix`] partition engine and the
//! coordinator together so that a restarted worker attempt can rebuild the
//! newest consistent matrix state and realign its task clocks.
//!
//! ## Architecture
//!
//! ```text
//!  SnapshotManager::init()      create <root>/snapshots/<w>/<a>/_temporary
//!        |
//!        v
//!  process_recovery()  ─────►  recovery.rs  walk attempts a-1 .. 0, load newest
//!        |                     clock.rs     coordinator clocks → engine
//!        v
//!  start()  ──────────────►  writer.rs  (background thread)
//!        |                     sleep ─► write tmp ─► flush ─► rename ─► prune
//!        v
//!  stop()                      signal + join
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module          | Purpose                                             |
//! |-----------------|-----------------------------------------------------|
//! | [`lib.rs`]      | `SnapshotManager` lifecycle, `Debug`, `Drop`        |
//! | [`paths`]       | Attempt identity and the on-store path scheme       |
//! | [`writer`]      | One snapshot cycle and the periodic loop            |
//! | [`recovery`]    | Backward attempt walk, name ordering, loading       |
//! | [`clock`]       | Coordinator clock reconciliation                    |
//! | [`engine`]      | `MatrixPartitionEngine` trait                       |
//! | [`coordinator`] | `Coordinator` trait and clock types                 |
//!
//! ## Crash Safety
//!
//! A completed file only ever appears through an atomic rename of a fully
//! flushed temporary artifact, and the older of two completed files is
//! deleted only after the newer rename returned. A crash at any point
//! leaves zero snapshots only if no cycle ever completed.
//!
//! ## Failure policy
//!
//! Only a missing output root fails [`SnapshotManager::init`]. A failed
//! writer cycle ends the background loop for the rest of the process (see
//! [`SnapshotManager::writer_exit`]); recovery and reconciliation failures
//! are reported in the [`RecoveryReport`] and the worker carries on.
mod clock;
mod coordinator;
mod engine;
mod error;
mod paths;
mod recovery;
mod writer;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use namespace::Namespace;
use tracing::{info, warn};

pub use clock::{apply_task_clocks, reconcile_clocks, ReconcileOutcome};
pub use config::{SnapshotOrder, SnapshotSettings};
pub use coordinator::{Coordinator, CoordinatorError, MatrixClock, TaskMatrixClock};
pub use engine::{EngineError, MatrixPartitionEngine};
pub use error::SnapshotError;
pub use paths::{
    snapshot_file_name, SnapshotPaths, WorkerAttemptId, SNAPSHOTS_DIR, SNAPSHOT_FILE_PREFIX,
    TEMP_DIR, TEMP_FILE_NAME,
};
pub use recovery::{compare_snapshot_names, RecoveryOutcome, RecoveryResolver, ResolvedSnapshot};
pub use writer::{SnapshotWriter, WriterExit};

use error::IoContext;

/// Name of the background writer thread.
pub const WRITER_THREAD_NAME: &str = "snapshot-writer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initialized,
    Running,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Initialized => "initialized",
            LifecycleState::Running => "running",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// What [`SnapshotManager::process_recovery`] did.
#[derive(Debug)]
pub struct RecoveryReport {
    pub recovery: RecoveryOutcome,
    pub clocks: ReconcileOutcome,
}

struct WriterHandle {
    stop_tx: Sender<()>,
    join: JoinHandle<WriterExit>,
}

/// Lifecycle controller of the snapshot subsystem for one worker attempt.
///
/// # Lifecycle
///
/// `Uninitialized → Initialized → Running → Stopped`
///
/// 1. [`init`](Self::init) resolves the output root and creates this
///    attempt's directory.
/// 2. [`process_recovery`](Self::process_recovery) loads the newest
///    snapshot of an earlier attempt and reconciles clocks. Call it before
///    `start`; it runs at most once.
/// 3. [`start`](Self::start) launches the background writer thread.
/// 4. [`stop`](Self::stop) wakes the writer, waits for it to exit and is
///    idempotent. Dropping the manager stops it too.
pub struct SnapshotManager {
    attempt: WorkerAttemptId,
    settings: SnapshotSettings,
    namespace: Arc<dyn Namespace>,
    engine: Arc<dyn MatrixPartitionEngine>,
    coordinator: Arc<dyn Coordinator>,
    paths: Option<SnapshotPaths>,
    state: LifecycleState,
    /// Set by the first `process_recovery`, success or not.
    recovery_attempted: AtomicBool,
    /// Completed snapshots of this attempt, published by the writer thread.
    generation: Arc<AtomicU64>,
    writer: Option<WriterHandle>,
    writer_exit: Option<WriterExit>,
}

impl fmt::Debug for SnapshotManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotManager")
            .field("attempt", &self.attempt)
            .field("state", &self.state)
            .field("base_dir", &self.paths.as_ref().map(SnapshotPaths::base_dir))
            .field("backup_interval", &self.settings.backup_interval)
            .field("snapshot_order", &self.settings.snapshot_order)
            .field("generation", &self.snapshot_generation())
            .field("recovery_attempted", &self.recovery_attempted.load(Ordering::Acquire))
            .field("writer_running", &self.is_writer_running())
            .finish()
    }
}

impl SnapshotManager {
    pub fn new(
        attempt: WorkerAttemptId,
        settings: SnapshotSettings,
        namespace: Arc<dyn Namespace>,
        engine: Arc<dyn MatrixPartitionEngine>,
        coordinator: Arc<dyn Coordinator>,
    ) -> Self {
        Self {
            attempt,
            settings,
            namespace,
            engine,
            coordinator,
            paths: None,
            state: LifecycleState::Uninitialized,
            recovery_attempted: AtomicBool::new(false),
            generation: Arc::new(AtomicU64::new(0)),
            writer: None,
            writer_exit: None,
        }
    }

    /// Resolves the snapshot base directory and creates it (with its
    /// `_temporary` child) if absent.
    ///
    /// # Errors
    ///
    /// [`SnapshotError::MissingOutputPath`] if no output root is
    /// configured, an I/O error if the directories cannot be created, or
    /// [`SnapshotError::InvalidState`] if already initialized.
    pub fn init(&mut self) -> Result<(), SnapshotError> {
        if self.state != LifecycleState::Uninitialized {
            return Err(SnapshotError::InvalidState {
                operation: "init",
                state: self.state,
            });
        }

        let root = self
            .settings
            .output_root
            .clone()
            .ok_or(SnapshotError::MissingOutputPath)?;
        info!(output = %root.display(), "snapshot output dir");

        let paths = SnapshotPaths::new(&root, self.attempt);
        let base = paths.base_dir();
        info!(path = %base.display(), "create snapshot base directory");
        if !self.namespace.exists(&base).io_context("check", &base)? {
            self.namespace
                .mkdirs(&base)
                .io_context("create directory", &base)?;
        }
        let temp = paths.temp_dir();
        self.namespace
            .mkdirs(&temp)
            .io_context("create directory", &temp)?;

        self.paths = Some(paths);
        self.state = LifecycleState::Initialized;
        Ok(())
    }

    /// Launches the background snapshot writer.
    ///
    /// # Errors
    ///
    /// [`SnapshotError::ZeroInterval`] if the configured backup interval is
    /// zero, [`SnapshotError::InvalidState`] unless initialized and not yet
    /// started.
    pub fn start(&mut self) -> Result<(), SnapshotError> {
        if self.state != LifecycleState::Initialized {
            return Err(SnapshotError::InvalidState {
                operation: "start",
                state: self.state,
            });
        }
        if self.settings.backup_interval.is_zero() {
            return Err(SnapshotError::ZeroInterval);
        }
        let paths = self.paths.clone().ok_or(SnapshotError::NotInitialized)?;

        let writer = SnapshotWriter::with_progress(
            Arc::clone(&self.namespace),
            Arc::clone(&self.engine),
            paths,
            Arc::clone(&self.generation),
        );
        let interval = self.settings.backup_interval;
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);

        info!(
            interval_ms = interval.as_millis() as u64,
            "starting snapshot writer thread"
        );
        let join = thread::Builder::new()
            .name(WRITER_THREAD_NAME.to_string())
            .spawn(move || writer.run(interval, stop_rx))
            .map_err(SnapshotError::SpawnWriter)?;

        self.writer = Some(WriterHandle { stop_tx, join });
        self.state = LifecycleState::Running;
        Ok(())
    }

    /// Stops the writer and blocks until its thread has exited.
    ///
    /// Calling `stop` again, or before `start`, only records the `Stopped`
    /// state. A cycle already writing when the stop arrives runs to
    /// completion; no new cycle starts.
    pub fn stop(&mut self) {
        if self.state == LifecycleState::Stopped {
            return;
        }
        self.state = LifecycleState::Stopped;

        if let Some(handle) = self.writer.take() {
            // fails only if the writer already exited on its own
            let _ = handle.stop_tx.try_send(());
            match handle.join.join() {
                Ok(exit) => {
                    info!(generation = self.snapshot_generation(), ?exit, "snapshot writer joined");
                    self.writer_exit = Some(exit);
                }
                Err(_) => warn!("snapshot writer thread panicked"),
            }
        }
    }

    /// Loads the newest snapshot left by an earlier attempt, then applies
    /// the coordinator's task clocks.
    ///
    /// Only valid between [`init`](Self::init) and [`start`](Self::start):
    /// in any other state it returns `None` without consuming the one run.
    /// Later calls after that run return `None` too. Failures are reported
    /// in the returned [`RecoveryReport`], never raised.
    ///
    /// Clock reconciliation runs whatever the recovery outcome, including
    /// [`RecoveryOutcome::Failed`]: coordinator clocks are applied on top
    /// of whatever state a failed load left, rather than being skipped.
    pub fn process_recovery(&self) -> Option<RecoveryReport> {
        if self.state != LifecycleState::Initialized {
            warn!(state = %self.state, "recovery only runs after init and before start, ignored");
            return None;
        }
        let paths = self.paths.as_ref()?;
        if self.recovery_attempted.swap(true, Ordering::AcqRel) {
            return None;
        }

        let resolver =
            RecoveryResolver::new(self.namespace.as_ref(), paths, self.settings.snapshot_order);
        let recovery = resolver.recover(self.engine.as_ref());
        let clocks = reconcile_clocks(self.coordinator.as_ref(), self.engine.as_ref(), &self.attempt);

        Some(RecoveryReport { recovery, clocks })
    }

    #[must_use]
    pub fn attempt(&self) -> WorkerAttemptId {
        self.attempt
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Paths of this attempt, available once initialized.
    #[must_use]
    pub fn paths(&self) -> Option<&SnapshotPaths> {
        self.paths.as_ref()
    }

    /// Number of snapshots this attempt has completed.
    #[must_use]
    pub fn snapshot_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// `true` while the background writer thread is alive.
    #[must_use]
    pub fn is_writer_running(&self) -> bool {
        self.writer
            .as_ref()
            .map(|h| !h.join.is_finished())
            .unwrap_or(false)
    }

    /// How the writer loop ended, known after [`stop`](Self::stop).
    #[must_use]
    pub fn writer_exit(&self) -> Option<&WriterExit> {
        self.writer_exit.as_ref()
    }
}

/// Stops the writer thread so it never outlives its manager.
impl Drop for SnapshotManager {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests;
