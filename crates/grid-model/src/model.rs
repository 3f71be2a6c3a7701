use std::collections::HashMap;

use crate::error::{GridError, GridResult};
use crate::row::{Row, RowId};
use crate::viewport::{Viewport, VisibleRow, VisibleWindow};

/// Row forest in display order. Parents always precede their children.
///
/// Collapsing a row never moves or removes anything; it only changes what the
/// visibility predicate returns for the row's descendants.
#[derive(Debug, Clone, Default)]
pub struct RowModel {
    rows: Vec<Row>,
    index: HashMap<RowId, usize>,
    child_counts: HashMap<RowId, usize>,
}

impl RowModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<Row>) -> GridResult<Self> {
        let mut all = HashMap::with_capacity(rows.len());
        for (pos, row) in rows.iter().enumerate() {
            if all.insert(row.id.clone(), pos).is_some() {
                return Err(GridError::DuplicateRow(row.id.clone()));
            }
        }
        let mut child_counts = HashMap::new();
        for (pos, row) in rows.iter().enumerate() {
            if let Some(parent) = &row.parent_id {
                match all.get(parent) {
                    None => {
                        return Err(GridError::UnknownParent {
                            row: row.id.clone(),
                            parent: parent.clone(),
                        })
                    }
                    Some(&parent_pos) if parent_pos >= pos => {
                        return Err(GridError::ParentAfterChild {
                            row: row.id.clone(),
                            parent: parent.clone(),
                        })
                    }
                    Some(_) => *child_counts.entry(parent.clone()).or_insert(0) += 1,
                }
            }
        }
        Ok(Self {
            rows,
            index: all,
            child_counts,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn get(&self, id: &str) -> Option<&Row> {
        self.index.get(id).map(|&pos| &self.rows[pos])
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Row> {
        let pos = *self.index.get(id)?;
        self.rows.get_mut(pos)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn is_node(&self, id: &str) -> bool {
        self.child_counts.get(id).copied().unwrap_or(0) > 0
    }

    /// True iff no ancestor of `id` is collapsed.
    pub fn is_visible(&self, id: &str) -> GridResult<bool> {
        let mut current = self
            .get(id)
            .ok_or_else(|| GridError::UnknownRow(id.to_string()))?;
        while let Some(parent_id) = &current.parent_id {
            let parent = self
                .get(parent_id)
                .ok_or_else(|| GridError::UnknownRow(parent_id.clone()))?;
            if parent.collapsed {
                return Ok(false);
            }
            current = parent;
        }
        Ok(true)
    }

    /// Forest positions of the visible rows, in order.
    pub fn visible_positions(&self) -> Vec<usize> {
        // parents precede children, so one forward pass settles every row
        let mut shown = vec![false; self.rows.len()];
        let mut positions = Vec::with_capacity(self.rows.len());
        for (pos, row) in self.rows.iter().enumerate() {
            let visible = match row.parent_id.as_deref().and_then(|p| self.position(p)) {
                None => true,
                Some(parent_pos) => shown[parent_pos] && !self.rows[parent_pos].collapsed,
            };
            shown[pos] = visible;
            if visible {
                positions.push(pos);
            }
        }
        positions
    }

    pub fn visible_ids(&self) -> Vec<RowId> {
        self.visible_positions()
            .into_iter()
            .map(|pos| self.rows[pos].id.clone())
            .collect()
    }

    pub fn visible_count(&self) -> usize {
        self.visible_positions().len()
    }

    /// Index of `id` within the filtered sequence, if it is visible.
    pub fn filtered_index(&self, id: &str) -> Option<usize> {
        let pos = self.position(id)?;
        self.visible_positions().binary_search(&pos).ok()
    }

    pub fn window(&self, viewport: Viewport) -> VisibleWindow {
        let positions = self.visible_positions();
        let viewport = viewport.clamp(positions.len());
        let rows = positions[viewport.top..viewport.bottom]
            .iter()
            .enumerate()
            .map(|(offset, &pos)| {
                let row = &self.rows[pos];
                VisibleRow {
                    filtered_index: viewport.top + offset,
                    position: pos,
                    id: row.id.clone(),
                    indent: row.indent,
                    is_node: self.is_node(&row.id),
                    collapsed: row.collapsed,
                }
            })
            .collect();
        VisibleWindow {
            viewport,
            total_visible: positions.len(),
            rows,
        }
    }

    /// Returns whether the flag actually changed.
    pub fn set_collapsed(&mut self, id: &str, collapsed: bool) -> GridResult<bool> {
        let row = self
            .get_mut(id)
            .ok_or_else(|| GridError::UnknownRow(id.to_string()))?;
        let changed = row.collapsed != collapsed;
        row.collapsed = collapsed;
        Ok(changed)
    }

    /// Flip the flag and return the new value.
    pub fn toggle(&mut self, id: &str) -> GridResult<bool> {
        let row = self
            .get_mut(id)
            .ok_or_else(|| GridError::UnknownRow(id.to_string()))?;
        row.collapsed = !row.collapsed;
        Ok(row.collapsed)
    }

    /// Collapse every node at `indent >= level`. Returns how many changed.
    pub fn collapse_from_level(&mut self, level: u16) -> usize {
        let mut changed = 0;
        for row in &mut self.rows {
            let is_node = self.child_counts.get(&row.id).copied().unwrap_or(0) > 0;
            if is_node && row.indent >= level && !row.collapsed {
                row.collapsed = true;
                changed += 1;
            }
        }
        changed
    }

    pub fn is_descendant_of(&self, id: &str, ancestor: &str) -> bool {
        let mut current = self.get(id).and_then(|row| row.parent_id.as_deref());
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.get(parent).and_then(|row| row.parent_id.as_deref());
        }
        false
    }

    /// Ids of every strict descendant of `id`, in display order.
    pub fn descendants(&self, id: &str) -> Vec<RowId> {
        self.rows
            .iter()
            .filter(|row| self.is_descendant_of(&row.id, id))
            .map(|row| row.id.clone())
            .collect()
    }

    /// Insert a row that is not yet present: after the last row of its
    /// parent's subtree, or at the end for roots. Returns the position.
    pub(crate) fn insert(&mut self, row: Row) -> GridResult<usize> {
        if self.contains(&row.id) {
            return Err(GridError::DuplicateRow(row.id));
        }
        let pos = match &row.parent_id {
            None => self.rows.len(),
            Some(parent) => {
                let parent_pos = self.position(parent).ok_or_else(|| GridError::UnknownParent {
                    row: row.id.clone(),
                    parent: parent.clone(),
                })?;
                let mut end = parent_pos + 1;
                while end < self.rows.len() && self.is_descendant_of(&self.rows[end].id, parent) {
                    end += 1;
                }
                *self.child_counts.entry(parent.clone()).or_insert(0) += 1;
                end
            }
        };
        self.rows.insert(pos, row);
        for (offset, row) in self.rows[pos..].iter().enumerate() {
            self.index.insert(row.id.clone(), pos + offset);
        }
        Ok(pos)
    }
}
