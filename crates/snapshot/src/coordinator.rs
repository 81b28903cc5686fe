//! Coordinator-side bookkeeping consulted after a restart.

use thiserror::Error;

use crate::WorkerAttemptId;

/// Clock of one matrix as observed by the coordinator for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixClock {
    pub matrix_id: u32,
    pub clock: u32,
}

/// Latest known progress of one task against every matrix it touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskMatrixClock {
    pub task_index: u32,
    pub matrix_clocks: Vec<MatrixClock>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    /// The coordinator could not be reached at all.
    #[error("coordinator unreachable: {0}")]
    Unreachable(String),

    /// The coordinator answered with an error.
    #[error("coordinator error: {0}")]
    Service(String),
}

/// The service of record for task clocks.
pub trait Coordinator: Send + Sync {
    /// Returns, for every task, the clock it last committed against each
    /// matrix, as known before `attempt` started.
    fn task_matrix_clocks(
        &self,
        attempt: &WorkerAttemptId,
    ) -> Result<Vec<TaskMatrixClock>, CoordinatorError>;
}
