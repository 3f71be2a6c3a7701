use grid_model::{
    bulk, Column, ColumnTable, GridState, NodeAction, Redraw, Row, RowModel, RowPatch, Viewport,
};
use serde_json::json;

fn three_rows() -> Vec<Row> {
    vec![
        Row::root("1"),
        Row::child("2", "1", 1),
        Row::child("3", "1", 1),
    ]
}

#[test]
fn collapse_and_expand_parent() {
    let mut model = RowModel::from_rows(three_rows()).unwrap();
    let before: Vec<Row> = model.rows().to_vec();

    model.set_collapsed("1", true).unwrap();
    assert_eq!(model.visible_ids(), vec!["1"]);
    assert!(!model.is_visible("2").unwrap());
    assert!(!model.is_visible("3").unwrap());

    model.set_collapsed("1", false).unwrap();
    assert_eq!(model.visible_ids(), vec!["1", "2", "3"]);
    // descendants' stored data never moved
    assert_eq!(model.rows(), before.as_slice());
}

#[test]
fn snapshot_patch_reset_cycle() {
    let columns = ColumnTable::new(
        vec![Column::new("name", 120)],
        vec![Column::new("value", 80)],
    )
    .unwrap();
    let mut grid = GridState::new(columns);
    assert!(grid
        .merge(vec![RowPatch::new("1").set("value", json!(1))])
        .is_err());

    assert_eq!(grid.replace(three_rows()).unwrap(), Redraw::All);
    assert_eq!(grid.set_viewport(Viewport::new(0, 3)), Redraw::All);

    let patch = vec![RowPatch::new("2").set("value", json!(42))];
    assert_eq!(
        grid.merge(patch.clone()).unwrap(),
        Redraw::Rows(vec!["2".to_string()])
    );
    assert_eq!(grid.merge(patch).unwrap(), Redraw::Nothing);

    // collapsing the root hides row 2, so further changes to it stay in the background
    assert_eq!(
        grid.apply_action(&NodeAction::CollapseDeep("1".into())).unwrap(),
        Redraw::All
    );
    assert_eq!(grid.window().ids(), vec!["1"]);
    assert_eq!(
        grid.merge(vec![RowPatch::new("2").set("value", json!(43))])
            .unwrap(),
        Redraw::Nothing
    );
    assert_eq!(
        grid.model().get("2").unwrap().fields["value"],
        json!(43)
    );

    grid.reset();
    assert!(grid.is_awaiting_snapshot());
    assert!(grid
        .merge(vec![RowPatch::new("2").set("value", json!(44))])
        .is_err());
    grid.replace(three_rows()).unwrap();
    assert!(grid.model().get("2").unwrap().fields.is_empty());
}

#[test]
fn scrolled_viewport_over_collapsed_tree() {
    let mut rows = Vec::new();
    for parent in 0..50 {
        let id = format!("p{parent}");
        rows.push(Row::root(id.clone()));
        for child in 0..3 {
            rows.push(Row::child(format!("{id}-{child}"), id.clone(), 1));
        }
    }
    let mut model = RowModel::from_rows(rows).unwrap();
    assert_eq!(model.collapse_from_level(0), 50);
    assert_eq!(model.visible_count(), 50);

    let viewport = Viewport::from_scroll(21 * 10, 21, 21 * 5, model.visible_count(), 20);
    assert_eq!(viewport, Viewport::new(5, 20));
    let window = model.window(viewport);
    assert_eq!(window.rows.first().map(|r| r.id.as_str()), Some("p5"));
    assert!(window.rows.iter().all(|r| r.is_node && r.collapsed));

    assert!(bulk::is_enabled(&model, &NodeAction::ExpandLevel(0)));
    bulk::apply(&mut model, &NodeAction::ExpandLevel(0)).unwrap();
    assert_eq!(model.visible_count(), 200);
}

#[test]
fn grid_window_follows_collapse_and_expand() {
    let mut grid = GridState::new(ColumnTable::default());
    grid.replace(three_rows()).unwrap();
    grid.set_viewport(Viewport::new(0, 3));

    assert_eq!(grid.toggle("1").unwrap(), Redraw::All);
    assert_eq!(grid.window().ids(), vec!["1"]);
    assert_eq!(grid.toggle("1").unwrap(), Redraw::All);
    assert_eq!(grid.window().ids(), vec!["1", "2", "3"]);
    assert_eq!(grid.viewport(), Viewport::new(0, 3));

    assert_eq!(
        grid.merge(vec![RowPatch::new("3").set("value", json!(9))])
            .unwrap(),
        Redraw::Rows(vec!["3".to_string()])
    );
}
