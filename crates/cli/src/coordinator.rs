//! File-backed coordinator for the worker shell.
//!
//! Each non-empty, non-`#` line reads `<task>:<matrix>=<clock>`. A missing
//! file means the coordinator cannot be reached.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use snapshot::{Coordinator, CoordinatorError, MatrixClock, TaskMatrixClock, WorkerAttemptId};
use tracing::debug;

pub struct FileCoordinator {
    path: Option<PathBuf>,
}

impl FileCoordinator {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

/// Parses the clocks file body, grouping entries by task.
pub fn parse_clocks(text: &str) -> Result<Vec<TaskMatrixClock>, String> {
    let mut tasks: BTreeMap<u32, Vec<MatrixClock>> = BTreeMap::new();

    for (n, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let bad = || format!("line {}: expected <task>:<matrix>=<clock>, got {:?}", n + 1, line);

        let (task, rest) = line.split_once(':').ok_or_else(bad)?;
        let (matrix, clock) = rest.split_once('=').ok_or_else(bad)?;
        let task: u32 = task.trim().parse().map_err(|_| bad())?;
        let matrix_id: u32 = matrix.trim().parse().map_err(|_| bad())?;
        let clock: u32 = clock.trim().parse().map_err(|_| bad())?;

        tasks
            .entry(task)
            .or_default()
            .push(MatrixClock { matrix_id, clock });
    }

    Ok(tasks
        .into_iter()
        .map(|(task_index, matrix_clocks)| TaskMatrixClock {
            task_index,
            matrix_clocks,
        })
        .collect())
}

impl Coordinator for FileCoordinator {
    fn task_matrix_clocks(
        &self,
        attempt: &WorkerAttemptId,
    ) -> Result<Vec<TaskMatrixClock>, CoordinatorError> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| CoordinatorError::Unreachable("no clocks file configured".into()))?;
        debug!(%attempt, path = %path.display(), "reading task clocks");

        let text = fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                CoordinatorError::Unreachable(format!("{} not found", path.display()))
            }
            _ => CoordinatorError::Service(format!("read {}: {}", path.display(), e)),
        })?;
        parse_clocks(&text).map_err(CoordinatorError::Service)
    }
}
