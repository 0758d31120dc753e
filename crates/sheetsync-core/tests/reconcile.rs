//! Integration tests for planning a full-table save.
//!
//! These tests go from a client payload to a plan and normalized rows,
//! then replay the plan over the column list the way storage would.

use sheetsync_core::{
    normalize, plan, simulate, Column, CoreError, DesiredState, Identifier, SchemaOp,
};

fn live(names: &[&str]) -> Vec<Column> {
    names
        .iter()
        .enumerate()
        .map(|(i, n)| Column::new(Identifier::parse(n).unwrap(), i, Some(500)))
        .collect()
}

fn names(columns: &[Column]) -> Vec<Identifier> {
    columns.iter().map(|c| c.name.clone()).collect()
}

fn state(json: &str) -> DesiredState {
    serde_json::from_str(json).unwrap()
}

#[test]
fn save_with_column_order_reshapes_and_aligns_rows() {
    let current = live(&["id", "name"]);
    let desired = state(
        r#"{"rows": [{"id": "1", "name": "Carol"}], "column_order": ["name", "id"]}"#,
    );

    let target = desired.target_columns().unwrap();
    let plan = plan(&current, &target).unwrap();
    assert_eq!(plan.drops().count(), 0);

    let shaped = simulate(&names(&current), &plan).unwrap();
    assert_eq!(shaped, vec!["name", "id"]);

    let rows = normalize(&desired.rows, &target.columns).unwrap();
    assert_eq!(
        rows[0].values(),
        &[Some("Carol".to_string()), Some("1".to_string())]
    );
}

#[test]
fn replaying_a_plan_on_its_own_result_is_stable() {
    let current = live(&["a", "b", "c", "d"]);
    let desired = state(r#"{"rows": [], "column_order": ["d", "b", "a"]}"#);
    let target = desired.target_columns().unwrap();

    let first = plan(&current, &target).unwrap();
    let once = simulate(&names(&current), &first).unwrap();

    let reshaped = live(&once.iter().map(Identifier::as_str).collect::<Vec<_>>());
    let second = plan(&reshaped, &target).unwrap();
    assert_eq!(second.drops().count(), 0);

    let twice = simulate(&once, &second).unwrap();
    assert_eq!(once, twice);
    assert_eq!(twice, vec!["d", "b", "a"]);
}

#[test]
fn order_excludes_row_keys_outside_it() {
    let current = live(&["id", "name", "note"]);
    let desired = state(
        r#"{"rows": [{"id": "1", "name": "Ann", "note": "x"}], "column_order": ["id", "name"]}"#,
    );
    let target = desired.target_columns().unwrap();

    let plan = plan(&current, &target).unwrap();
    assert_eq!(
        plan.operations[0],
        SchemaOp::DropColumn(Identifier::parse("note").unwrap())
    );

    let rows = normalize(&desired.rows, &target.columns).unwrap();
    assert_eq!(rows[0].values().len(), 2);
}

#[test]
fn first_row_columns_must_exist() {
    let current = live(&["id"]);
    let desired = state(r#"{"rows": [{"id": "1", "brand new": "x"}]}"#);
    let target = desired.target_columns().unwrap();

    assert_eq!(
        plan(&current, &target).unwrap_err(),
        CoreError::UnknownColumn("brand_new".to_string())
    );
}
