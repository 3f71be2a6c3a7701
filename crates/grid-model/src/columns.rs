use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{GridError, GridResult};
use crate::row::ColumnId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: ColumnId,
    pub name: String,
    pub width: u32,
}

impl Column {
    pub fn new(id: impl Into<ColumnId>, width: u32) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            width,
        }
    }
}

/// Column layout for one grid structure.
///
/// Every column has a stable index: fixed columns take `0..fixed_len`, scroll
/// columns follow. Reordering only changes the display permutation of the
/// scroll columns, never the stable indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnTable {
    fixed: Vec<Column>,
    scroll: Vec<Column>,
    order: Vec<usize>,
}

impl ColumnTable {
    pub fn new(fixed: Vec<Column>, scroll: Vec<Column>) -> GridResult<Self> {
        let mut seen = HashSet::new();
        for column in fixed.iter().chain(&scroll) {
            if !seen.insert(column.id.as_str()) {
                return Err(GridError::DuplicateColumn(column.id.clone()));
            }
        }
        let order = (0..scroll.len()).collect();
        Ok(Self {
            fixed,
            scroll,
            order,
        })
    }

    pub fn len(&self) -> usize {
        self.fixed.len() + self.scroll.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fixed_len(&self) -> usize {
        self.fixed.len()
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        if index < self.fixed.len() {
            self.fixed.get(index)
        } else {
            self.scroll.get(index - self.fixed.len())
        }
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.fixed
            .iter()
            .chain(&self.scroll)
            .position(|column| column.id == id)
    }

    /// Stable indices in the order columns are drawn.
    pub fn display_order(&self) -> Vec<usize> {
        (0..self.fixed.len())
            .chain(self.order.iter().map(|idx| idx + self.fixed.len()))
            .collect()
    }

    /// Set the display order of the scroll columns. `order[i]` is the scroll
    /// column (0-based, without fixed columns) drawn at position `i`.
    pub fn reorder(&mut self, order: Vec<usize>) -> GridResult<()> {
        let mut check = order.clone();
        check.sort_unstable();
        if check != (0..self.scroll.len()).collect::<Vec<_>>() {
            return Err(GridError::InvalidReorder(self.scroll.len()));
        }
        self.order = order;
        Ok(())
    }

    /// Stable indices to fetch for a horizontal scroll position: all fixed
    /// columns, the scroll columns overlapping `[scroll_left, scroll_left +
    /// viewport_width]`, and up to `buffer` more on each side.
    pub fn visible_columns(&self, scroll_left: u32, viewport_width: u32, buffer: usize) -> Vec<usize> {
        let fixed_len = self.fixed.len();
        let mut result: Vec<usize> = (0..fixed_len).collect();
        let right = scroll_left.saturating_add(viewport_width);

        let mut first = None;
        let mut last = None;
        let mut edge = 0u32;
        for (display, &scroll_idx) in self.order.iter().enumerate() {
            let start = edge;
            edge = edge.saturating_add(self.scroll[scroll_idx].width);
            if edge >= scroll_left && start <= right {
                first.get_or_insert(display);
                last = Some(display);
            }
        }
        let (Some(first), Some(last)) = (first, last) else {
            return result;
        };
        let from = first.saturating_sub(buffer);
        let to = (last + buffer + 1).min(self.order.len());
        result.extend(self.order[from..to].iter().map(|idx| idx + fixed_len));
        result
    }
}
