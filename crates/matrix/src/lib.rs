//! # Matrix - in-memory matrix partitions
//!
//! Holds the matrix state a parameter-server worker owns: for every matrix,
//! a sparse set of row values and one logical clock per task that has
//! pushed updates into it.
//!
//! [`PartitionManager`] is shared between the update path, the background
//! snapshot writer and recovery, so all methods take `&self` and
//! synchronize through one `RwLock`:
//!
//! - [`write_matrix`](PartitionManager::write_matrix) serializes under a
//!   single read lock, which gives the writer a point-in-time image.
//! - [`parse_matrices_from_input`](PartitionManager::parse_matrices_from_input)
//!   decodes the whole stream first and only then swaps it in under the
//!   write lock. A corrupt stream leaves the current state untouched.
//!
//! The on-disk layout is documented in [`format`].

pub mod format;

use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;
use tracing::{debug, info};

pub type MatrixId = u32;
pub type TaskIndex = u32;
pub type Clock = u32;

/// Errors raised by the matrix codec.
#[derive(Debug, Error)]
pub enum MatrixError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Bad magic, checksum mismatch, truncated record or trailing bytes.
    #[error("corrupt matrix snapshot: {0}")]
    Corrupt(String),
}

/// One matrix as held by this worker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatrixPartition {
    pub rows: BTreeMap<u64, f64>,
    /// Last clock reported by each task for this matrix.
    pub clocks: BTreeMap<TaskIndex, Clock>,
}

impl MatrixPartition {
    /// The clock of the slowest task, or 0 when no task has reported yet.
    pub fn min_clock(&self) -> Clock {
        self.clocks.values().copied().min().unwrap_or(0)
    }
}

/// Thread-safe owner of every local matrix partition.
#[derive(Debug, Default)]
pub struct PartitionManager {
    matrices: RwLock<BTreeMap<MatrixId, MatrixPartition>>,
}

impl PartitionManager {
    pub fn new() -> Self {
        Self::default()
    }

    // Poisoning is ignored: every mutation is a single map operation.
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<MatrixId, MatrixPartition>> {
        self.matrices.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<MatrixId, MatrixPartition>> {
        self.matrices.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers an empty matrix. Returns `false` if it already existed.
    pub fn create_matrix(&self, matrix_id: MatrixId) -> bool {
        let mut m = self.write();
        if m.contains_key(&matrix_id) {
            return false;
        }
        m.insert(matrix_id, MatrixPartition::default());
        true
    }

    /// Adds `delta` to a row, creating the matrix and row as needed.
    /// Returns the new row value.
    pub fn increment(&self, matrix_id: MatrixId, row: u64, delta: f64) -> f64 {
        let mut m = self.write();
        let value = m
            .entry(matrix_id)
            .or_default()
            .rows
            .entry(row)
            .or_insert(0.0);
        *value += delta;
        *value
    }

    pub fn get(&self, matrix_id: MatrixId, row: u64) -> Option<f64> {
        self.read()
            .get(&matrix_id)
            .and_then(|p| p.rows.get(&row).copied())
    }

    /// Overwrites one task clock of an existing matrix.
    ///
    /// Clocks for matrices this worker does not hold are ignored and
    /// `false` is returned.
    pub fn set_clock(&self, matrix_id: MatrixId, task_index: TaskIndex, clock: Clock) -> bool {
        let mut m = self.write();
        match m.get_mut(&matrix_id) {
            Some(partition) => {
                partition.clocks.insert(task_index, clock);
                true
            }
            None => {
                debug!(matrix_id, task_index, clock, "clock for unknown matrix ignored");
                false
            }
        }
    }

    pub fn clock(&self, matrix_id: MatrixId, task_index: TaskIndex) -> Option<Clock> {
        self.read()
            .get(&matrix_id)
            .and_then(|p| p.clocks.get(&task_index).copied())
    }

    /// Slowest task clock of a matrix; `None` if the matrix is unknown.
    pub fn min_clock(&self, matrix_id: MatrixId) -> Option<Clock> {
        self.read().get(&matrix_id).map(MatrixPartition::min_clock)
    }

    /// Snapshot of every `(matrix, task) -> clock` entry, ordered.
    pub fn clocks(&self) -> Vec<(MatrixId, TaskIndex, Clock)> {
        self.read()
            .iter()
            .flat_map(|(&id, p)| p.clocks.iter().map(move |(&t, &c)| (id, t, c)))
            .collect()
    }

    pub fn matrix_ids(&self) -> Vec<MatrixId> {
        self.read().keys().copied().collect()
    }

    /// Clone of one partition, mostly for inspection.
    pub fn partition(&self, matrix_id: MatrixId) -> Option<MatrixPartition> {
        self.read().get(&matrix_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Serializes a point-in-time image of all partitions to `output`.
    pub fn write_matrix(&self, output: &mut dyn Write) -> Result<(), MatrixError> {
        let m = self.read();
        format::encode(&m, output)?;
        debug!(matrices = m.len(), "matrix image written");
        Ok(())
    }

    /// Replaces all local partitions with the image read from `input`.
    pub fn parse_matrices_from_input(&self, input: &mut dyn Read) -> Result<(), MatrixError> {
        let decoded = format::decode(input)?;
        let count = decoded.len();
        *self.write() = decoded;
        info!(matrices = count, "matrix partitions loaded from snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
