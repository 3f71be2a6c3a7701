use serde::{Deserialize, Serialize};

use crate::row::RowId;

pub const DEFAULT_ROW_HEIGHT: usize = 21;
pub const DEFAULT_ROW_BUFFER: usize = 20;
pub const DEFAULT_COLUMN_BUFFER: usize = 3;

/// Half-open range `[top, bottom)` over the filtered (visible) row sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub top: usize,
    pub bottom: usize,
}

impl Viewport {
    pub fn new(top: usize, bottom: usize) -> Self {
        Self {
            top,
            bottom: bottom.max(top),
        }
    }

    pub fn len(&self) -> usize {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.bottom <= self.top
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.top && index < self.bottom
    }

    /// Keep the range inside `0..total`.
    pub fn clamp(self, total: usize) -> Self {
        let bottom = self.bottom.min(total);
        Self::new(self.top.min(bottom), bottom)
    }

    /// Rows to fetch for a scrolled grid: the rows on screen plus a buffer of
    /// `min(visible_rows, max_buffer)` rows on either side.
    pub fn from_scroll(
        scroll_top: usize,
        row_height: usize,
        viewport_height: usize,
        total: usize,
        max_buffer: usize,
    ) -> Self {
        if row_height == 0 || total == 0 {
            return Self::default();
        }
        let visible_rows = viewport_height.div_ceil(row_height).min(total);
        let first = (scroll_top / row_height).min(total);
        let buffer = visible_rows.min(max_buffer);
        Self::new(
            first.saturating_sub(buffer),
            (first + visible_rows + buffer).min(total),
        )
    }
}

/// A row as the renderer needs it: where it sits in the filtered sequence,
/// where in the full forest, and how to draw its toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleRow {
    pub filtered_index: usize,
    pub position: usize,
    pub id: RowId,
    pub indent: u16,
    pub is_node: bool,
    pub collapsed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibleWindow {
    pub viewport: Viewport,
    pub total_visible: usize,
    pub rows: Vec<VisibleRow>,
}

impl VisibleWindow {
    pub fn ids(&self) -> Vec<RowId> {
        self.rows.iter().map(|row| row.id.clone()).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rows.iter().any(|row| row.id == id)
    }
}
