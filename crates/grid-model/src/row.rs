use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub type RowId = String;
pub type ColumnId = String;
pub type CellValue = serde_json::Value;

/// One row of a (possibly tree-shaped) dataset.
///
/// `collapsed` is UI state. It never travels with data updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: RowId,
    #[serde(default)]
    pub parent_id: Option<RowId>,
    #[serde(default)]
    pub indent: u16,
    #[serde(default)]
    pub collapsed: bool,
    #[serde(default)]
    pub fields: HashMap<ColumnId, CellValue>,
}

impl Row {
    pub fn root(id: impl Into<RowId>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            indent: 0,
            collapsed: false,
            fields: HashMap::new(),
        }
    }

    pub fn child(id: impl Into<RowId>, parent: impl Into<RowId>, indent: u16) -> Self {
        Self {
            parent_id: Some(parent.into()),
            indent,
            ..Self::root(id)
        }
    }

    pub fn with_field(mut self, column: impl Into<ColumnId>, value: CellValue) -> Self {
        self.fields.insert(column.into(), value);
        self
    }

    pub fn collapsed(mut self, collapsed: bool) -> Self {
        self.collapsed = collapsed;
        self
    }
}

/// Partial update for a single row. Fields overwrite one by one; absent
/// fields are left alone. `parent_id` and `indent` only matter when the row
/// is new.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RowPatch {
    pub id: RowId,
    #[serde(default)]
    pub parent_id: Option<RowId>,
    #[serde(default)]
    pub indent: Option<u16>,
    #[serde(default)]
    pub fields: HashMap<ColumnId, CellValue>,
}

impl RowPatch {
    pub fn new(id: impl Into<RowId>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn under(mut self, parent: impl Into<RowId>) -> Self {
        self.parent_id = Some(parent.into());
        self
    }

    pub fn set(mut self, column: impl Into<ColumnId>, value: CellValue) -> Self {
        self.fields.insert(column.into(), value);
        self
    }
}
