//! The matrix partition engine as seen by the snapshot subsystem.

use std::io::{Read, Write};

use matrix::PartitionManager;

pub type EngineError = Box<dyn std::error::Error + Send + Sync>;

/// Owner of the worker's matrix state.
///
/// The snapshot writer calls [`write_matrix`](Self::write_matrix) from its
/// background thread while updates keep flowing, so implementations must
/// produce a self-consistent image without external locking.
pub trait MatrixPartitionEngine: Send + Sync {
    /// Serializes a point-in-time image of every local matrix.
    fn write_matrix(&self, output: &mut dyn Write) -> Result<(), EngineError>;

    /// Replaces local matrix state with an image produced by
    /// [`write_matrix`](Self::write_matrix).
    fn parse_matrices_from_input(&self, input: &mut dyn Read) -> Result<(), EngineError>;

    /// Overwrites the logical clock of one `(matrix, task)` pair.
    fn set_clock(&self, matrix_id: u32, task_index: u32, clock: u32);
}

impl MatrixPartitionEngine for PartitionManager {
    fn write_matrix(&self, output: &mut dyn Write) -> Result<(), EngineError> {
        PartitionManager::write_matrix(self, output)?;
        Ok(())
    }

    fn parse_matrices_from_input(&self, input: &mut dyn Read) -> Result<(), EngineError> {
        PartitionManager::parse_matrices_from_input(self, input)?;
        Ok(())
    }

    fn set_clock(&self, matrix_id: u32, task_index: u32, clock: u32) {
        PartitionManager::set_clock(self, matrix_id, task_index, clock);
    }
}
