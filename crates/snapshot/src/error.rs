use std::io;
use std::path::Path;

use thiserror::Error;

use crate::engine::EngineError;
use crate::LifecycleState;

/// Errors raised by the snapshot subsystem.
///
/// Only [`SnapshotError::MissingOutputPath`] (and misuse of the lifecycle)
/// ever reaches the caller of [`SnapshotManager`](crate::SnapshotManager)
/// as an `Err`. Everything else is carried inside a
/// [`WriterExit`](crate::WriterExit) or
/// [`RecoveryOutcome`](crate::RecoveryOutcome).
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("can not find output path setting")]
    MissingOutputPath,

    #[error("snapshot backup interval must be non-zero")]
    ZeroInterval,

    #[error("snapshot manager is not initialized")]
    NotInitialized,

    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: LifecycleState,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("{context}: {source}")]
    Engine {
        context: String,
        #[source]
        source: EngineError,
    },

    #[error("failed to spawn snapshot writer thread: {0}")]
    SpawnWriter(#[source] io::Error),
}

/// Attaches a description to namespace I/O failures.
pub(crate) trait IoContext<T> {
    fn io_context(self, what: &str, path: &Path) -> Result<T, SnapshotError>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn io_context(self, what: &str, path: &Path) -> Result<T, SnapshotError> {
        self.map_err(|source| SnapshotError::Io {
            context: format!("{} {}", what, path.display()),
            source,
        })
    }
}
