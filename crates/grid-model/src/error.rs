use thiserror::Error;

use crate::row::{ColumnId, RowId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GridError {
    #[error("row {0} appears more than once")]
    DuplicateRow(RowId),
    #[error("row {row} names unknown parent {parent}")]
    UnknownParent { row: RowId, parent: RowId },
    #[error("row {row} precedes its parent {parent}")]
    ParentAfterChild { row: RowId, parent: RowId },
    #[error("unknown row {0}")]
    UnknownRow(RowId),
    #[error("grid is waiting for a full snapshot")]
    SnapshotRequired,
    #[error("expected {expected} cells, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("unknown column index {0}")]
    UnknownColumn(usize),
    #[error("column {0} appears more than once")]
    DuplicateColumn(ColumnId),
    #[error("column order is not a permutation of {0} scroll columns")]
    InvalidReorder(usize),
}

pub type GridResult<T> = Result<T, GridError>;
