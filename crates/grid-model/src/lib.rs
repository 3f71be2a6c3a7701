//! Viewport-driven row model for large, possibly tree-shaped grids.
//!
//! [`RowModel`] answers which rows are visible under the current
//! expand/collapse state. [`GridState`] layers snapshots, incremental patches
//! and a [`Viewport`] on top and reports the minimal [`Redraw`] for each change.

pub mod bulk;
pub mod columns;
pub mod error;
pub mod merge;
pub mod model;
pub mod row;
pub mod viewport;

pub use bulk::NodeAction;
pub use columns::{Column, ColumnTable};
pub use error::{GridError, GridResult};
pub use merge::{GridState, Redraw};
pub use model::RowModel;
pub use row::{CellValue, ColumnId, Row, RowId, RowPatch};
pub use viewport::{Viewport, VisibleRow, VisibleWindow};
