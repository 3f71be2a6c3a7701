use serde::{Deserialize, Serialize};

use crate::error::{GridError, GridResult};
use crate::model::RowModel;
use crate::row::RowId;

/// Expand/collapse actions offered by a node's context menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "target", rename_all = "snake_case")]
pub enum NodeAction {
    /// The node and every node below it.
    ExpandDeep(RowId),
    CollapseDeep(RowId),
    /// Every node at this indent level.
    ExpandLevel(u16),
    CollapseLevel(u16),
}

impl NodeAction {
    fn collapse(&self) -> bool {
        matches!(self, NodeAction::CollapseDeep(_) | NodeAction::CollapseLevel(_))
    }
}

/// Nodes whose flag `action` would change, in display order.
///
/// Both [`is_enabled`] and [`apply`] go through here, so a menu entry is only
/// offered when applying it changes something.
pub fn select(model: &RowModel, action: &NodeAction) -> GridResult<Vec<RowId>> {
    let target = action.collapse();
    let wants = |id: &str| {
        model.is_node(id) && model.get(id).map(|row| row.collapsed != target).unwrap_or(false)
    };
    match action {
        NodeAction::ExpandDeep(root) | NodeAction::CollapseDeep(root) => {
            if !model.contains(root) {
                return Err(GridError::UnknownRow(root.clone()));
            }
            let mut scope = vec![root.clone()];
            scope.extend(model.descendants(root));
            Ok(scope.into_iter().filter(|id| wants(id)).collect())
        }
        NodeAction::ExpandLevel(level) | NodeAction::CollapseLevel(level) => Ok(model
            .rows()
            .iter()
            .filter(|row| row.indent == *level && wants(&row.id))
            .map(|row| row.id.clone())
            .collect()),
    }
}

pub fn is_enabled(model: &RowModel, action: &NodeAction) -> bool {
    select(model, action)
        .map(|selected| !selected.is_empty())
        .unwrap_or(false)
}

/// Apply `action` and return the rows whose flag changed.
pub fn apply(model: &mut RowModel, action: &NodeAction) -> GridResult<Vec<RowId>> {
    let selected = select(model, action)?;
    let target = action.collapse();
    for id in &selected {
        model.set_collapsed(id, target)?;
    }
    Ok(selected)
}
