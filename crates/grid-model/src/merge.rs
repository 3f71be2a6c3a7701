use std::collections::HashSet;

use tracing::debug;

use crate::bulk::{self, NodeAction};
use crate::columns::ColumnTable;
use crate::error::{GridError, GridResult};
use crate::model::RowModel;
use crate::row::{CellValue, Row, RowId, RowPatch};
use crate::viewport::{Viewport, VisibleWindow};

/// What the renderer has to redraw after a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redraw {
    Nothing,
    /// Only these rows, all inside the current window.
    Rows(Vec<RowId>),
    /// The visible sequence itself changed.
    All,
}

/// Row model, column layout and viewport of one grid, fed by snapshots and
/// incremental patches.
///
/// Starts out (and returns after [`GridState::reset`]) waiting for a full
/// snapshot; patches are refused until one arrives.
///
/// The viewport is kept as requested and only clamped against the current
/// visible count when a window is derived, so collapsing and re-expanding
/// rows gives the same window back.
#[derive(Debug, Clone)]
pub struct GridState {
    model: RowModel,
    columns: ColumnTable,
    viewport: Viewport,
    awaiting_snapshot: bool,
}

impl GridState {
    pub fn new(columns: ColumnTable) -> Self {
        Self {
            model: RowModel::new(),
            columns,
            viewport: Viewport::default(),
            awaiting_snapshot: true,
        }
    }

    pub fn model(&self) -> &RowModel {
        &self.model
    }

    pub fn columns(&self) -> &ColumnTable {
        &self.columns
    }

    pub fn columns_mut(&mut self) -> &mut ColumnTable {
        &mut self.columns
    }

    /// The requested viewport clamped to the visible rows.
    pub fn viewport(&self) -> Viewport {
        self.viewport.clamp(self.model.visible_count())
    }

    pub fn requested_viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn is_awaiting_snapshot(&self) -> bool {
        self.awaiting_snapshot
    }

    pub fn window(&self) -> VisibleWindow {
        self.model.window(self.viewport)
    }

    /// Mark every row as stale. The next accepted change must be [`GridState::replace`].
    pub fn reset(&mut self) {
        debug!(target = "grid.merge", rows = self.model.len(), "awaiting snapshot");
        self.awaiting_snapshot = true;
    }

    /// Swap in a full snapshot. On error the previous state is kept.
    pub fn replace(&mut self, rows: Vec<Row>) -> GridResult<Redraw> {
        let model = RowModel::from_rows(rows)?;
        self.model = model;
        self.awaiting_snapshot = false;
        debug!(
            target = "grid.merge",
            rows = self.model.len(),
            visible = self.model.visible_count(),
            "snapshot applied"
        );
        Ok(Redraw::All)
    }

    /// Store `viewport` as requested. Redraws only if the derived window moves.
    pub fn set_viewport(&mut self, viewport: Viewport) -> Redraw {
        let before = self.viewport();
        self.viewport = viewport;
        if self.viewport() == before {
            Redraw::Nothing
        } else {
            Redraw::All
        }
    }

    pub fn toggle(&mut self, id: &str) -> GridResult<Redraw> {
        self.model.toggle(id)?;
        Ok(Redraw::All)
    }

    pub fn apply_action(&mut self, action: &NodeAction) -> GridResult<Redraw> {
        let changed = bulk::apply(&mut self.model, action)?;
        if changed.is_empty() {
            return Ok(Redraw::Nothing);
        }
        Ok(Redraw::All)
    }

    /// Collapse every node at `indent >= level`, as done on first load.
    pub fn collapse_from_level(&mut self, level: u16) -> Redraw {
        if self.model.collapse_from_level(level) == 0 {
            return Redraw::Nothing;
        }
        Redraw::All
    }

    /// Merge partial rows. Known rows get a per-field overwrite; unknown rows
    /// are inserted below their parent. Applying the same patches again is a
    /// no-op.
    pub fn merge(&mut self, patches: Vec<RowPatch>) -> GridResult<Redraw> {
        if self.awaiting_snapshot {
            return Err(GridError::SnapshotRequired);
        }
        self.check_parents(&patches)?;

        let window: HashSet<RowId> = self.window().ids().into_iter().collect();
        let mut changed: Vec<RowId> = Vec::new();
        let mut reshaped = false;

        for patch in patches {
            if self.model.contains(&patch.id) {
                if self.overwrite_fields(&patch) && window.contains(&patch.id) && !changed.contains(&patch.id) {
                    changed.push(patch.id);
                }
                continue;
            }
            let indent = match (&patch.parent_id, patch.indent) {
                (_, Some(indent)) => indent,
                (Some(parent), None) => self
                    .model
                    .get(parent)
                    .map(|row| row.indent + 1)
                    .unwrap_or(0),
                (None, None) => 0,
            };
            let row = Row {
                id: patch.id.clone(),
                parent_id: patch.parent_id,
                indent,
                collapsed: false,
                fields: patch.fields,
            };
            self.model.insert(row)?;
            if let Some(index) = self.model.filtered_index(&patch.id) {
                if index < self.viewport.bottom {
                    reshaped = true;
                }
            }
        }

        if reshaped {
            return Ok(Redraw::All);
        }
        if changed.is_empty() {
            Ok(Redraw::Nothing)
        } else {
            Ok(Redraw::Rows(changed))
        }
    }

    /// Merge a row-major block of cells: `cells[r * cols.len() + c]` belongs
    /// to `rows[r]` and stable column index `cols[c]`.
    pub fn merge_viewport_data(
        &mut self,
        rows: &[RowId],
        cols: &[usize],
        cells: Vec<CellValue>,
    ) -> GridResult<Redraw> {
        let expected = rows.len() * cols.len();
        if cells.len() != expected {
            return Err(GridError::ShapeMismatch {
                expected,
                actual: cells.len(),
            });
        }
        let mut column_ids = Vec::with_capacity(cols.len());
        for &index in cols {
            let column = self
                .columns
                .column(index)
                .ok_or(GridError::UnknownColumn(index))?;
            column_ids.push(column.id.clone());
        }
        let mut cells = cells.into_iter();
        let patches = rows
            .iter()
            .map(|row_id| {
                let mut patch = RowPatch::new(row_id.clone());
                for column_id in &column_ids {
                    if let Some(value) = cells.next() {
                        patch.fields.insert(column_id.clone(), value);
                    }
                }
                patch
            })
            .collect();
        self.merge(patches)
    }

    /// New rows must hang off a known row or one inserted earlier in the batch.
    fn check_parents(&self, patches: &[RowPatch]) -> GridResult<()> {
        let mut incoming = HashSet::new();
        for patch in patches {
            if self.model.contains(&patch.id) {
                continue;
            }
            if let Some(parent) = &patch.parent_id {
                if !self.model.contains(parent) && !incoming.contains(parent.as_str()) {
                    return Err(GridError::UnknownParent {
                        row: patch.id.clone(),
                        parent: parent.clone(),
                    });
                }
            }
            incoming.insert(patch.id.as_str());
        }
        Ok(())
    }

    fn overwrite_fields(&mut self, patch: &RowPatch) -> bool {
        let Some(row) = self.model.get_mut(&patch.id) else {
            return false;
        };
        let mut touched = false;
        for (column, value) in &patch.fields {
            if row.fields.get(column) != Some(value) {
                row.fields.insert(column.clone(), value.clone());
                touched = true;
            }
        }
        touched
    }
}
