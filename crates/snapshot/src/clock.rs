//! Post-recovery clock reconciliation.
//!
//! The coordinator's view of task progress is authoritative: a loaded
//! snapshot may predate clocks other workers already saw committed. Every
//! `(task, matrix, clock)` it reports is written over local state, so
//! applying the same response twice is the same as applying it once.

use tracing::{debug, error, info};

use crate::{Coordinator, CoordinatorError, MatrixPartitionEngine, TaskMatrixClock, WorkerAttemptId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// `entries` clock values from `tasks` tasks were pushed into the engine.
    Applied { tasks: usize, entries: usize },
    /// The coordinator could not answer; local clocks were left as they were.
    Unreachable(CoordinatorError),
}

/// Pushes every clock in `clocks` into `engine`, returning how many
/// `(matrix, task)` entries were written.
pub fn apply_task_clocks(engine: &dyn MatrixPartitionEngine, clocks: &[TaskMatrixClock]) -> usize {
    let mut entries = 0;
    for task in clocks {
        for mc in &task.matrix_clocks {
            info!(
                task = task.task_index,
                matrix = mc.matrix_id,
                clock = mc.clock,
                "adjust matrix clock"
            );
            engine.set_clock(mc.matrix_id, task.task_index, mc.clock);
            entries += 1;
        }
    }
    entries
}

/// Asks `coordinator` for the task clocks known before `attempt` and applies
/// them. Coordinator failures are logged and returned, never propagated.
pub fn reconcile_clocks(
    coordinator: &dyn Coordinator,
    engine: &dyn MatrixPartitionEngine,
    attempt: &WorkerAttemptId,
) -> ReconcileOutcome {
    match coordinator.task_matrix_clocks(attempt) {
        Ok(clocks) => {
            debug!(%attempt, tasks = clocks.len(), "task matrix clocks received");
            let entries = apply_task_clocks(engine, &clocks);
            ReconcileOutcome::Applied {
                tasks: clocks.len(),
                entries,
            }
        }
        Err(e) => {
            error!(%attempt, error = %e, "get task clocks from coordinator failed");
            ReconcileOutcome::Unreachable(e)
        }
    }
}
