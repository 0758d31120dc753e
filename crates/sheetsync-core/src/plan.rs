//! Schema diff engine.
//!
//! Compares a table's live column list with a target column set and
//! produces a [`ChangePlan`]: every `DropColumn` first, then one
//! `ReorderColumn` per target column when the target enforces an order.
//!
//! The reorder sequence is not minimal. Each target column
//! is placed right after its predecessor (the first one at the front),
//! so applying the same plan twice leaves the same final shape.
//! Columns are never created here; adding a column is its own operation.

use std::collections::HashSet;
use std::fmt;

use crate::column::Column;
use crate::error::{CoreError, Result};
use crate::ident::Identifier;
use crate::state::TargetColumns;

/// Where a reordered column goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Move to the first position.
    First,
    /// Move directly after the named column.
    After(Identifier),
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => f.write_str("FIRST"),
            Self::After(col) => write!(f, "AFTER {col}"),
        }
    }
}

/// A single structural operation on one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaOp {
    /// Drop a column.
    DropColumn(Identifier),
    /// Move a column.
    ReorderColumn {
        /// The column to move.
        column: Identifier,
        /// Its new position.
        placement: Placement,
    },
}

impl SchemaOp {
    /// Returns the column this operation acts on.
    #[must_use]
    pub fn column(&self) -> &Identifier {
        match self {
            Self::DropColumn(col) | Self::ReorderColumn { column: col, .. } => col,
        }
    }

    /// Returns true for drop operations.
    #[must_use]
    pub fn is_drop(&self) -> bool {
        matches!(self, Self::DropColumn(_))
    }
}

impl fmt::Display for SchemaOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DropColumn(col) => write!(f, "drop {col}"),
            Self::ReorderColumn { column, placement } => write!(f, "move {column} {placement}"),
        }
    }
}

/// An ordered list of structural operations: drops, then reorders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangePlan {
    /// The operations, in application order.
    pub operations: Vec<SchemaOp>,
}

impl ChangePlan {
    /// Returns true if the plan changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Returns the drop operations.
    pub fn drops(&self) -> impl Iterator<Item = &SchemaOp> {
        self.operations.iter().filter(|op| op.is_drop())
    }

    /// Returns the reorder operations.
    pub fn reorders(&self) -> impl Iterator<Item = &SchemaOp> {
        self.operations.iter().filter(|op| !op.is_drop())
    }

    /// Returns the names of the columns to drop.
    #[must_use]
    pub fn dropped_columns(&self) -> Vec<&Identifier> {
        self.drops().map(SchemaOp::column).collect()
    }
}

/// Computes the plan that reshapes `current` into `target`.
///
/// - An empty target changes nothing.
/// - Every target column must already exist, otherwise the plan fails
///   with [`CoreError::UnknownColumn`].
/// - Current columns not in the target are dropped, in table order.
/// - If the target enforces an order, one reorder per target column
///   follows: the first to [`Placement::First`], each other one
///   [`Placement::After`] its predecessor in the target.
pub fn plan(current: &[Column], target: &TargetColumns) -> Result<ChangePlan> {
    if target.is_empty() {
        return Ok(ChangePlan::default());
    }

    let existing: HashSet<&str> = current.iter().map(|c| c.name.as_str()).collect();
    if let Some(missing) = target
        .columns
        .iter()
        .find(|name| !existing.contains(name.as_str()))
    {
        return Err(CoreError::UnknownColumn(missing.to_string()));
    }

    let wanted: HashSet<&str> = target.columns.iter().map(Identifier::as_str).collect();
    let mut operations: Vec<SchemaOp> = current
        .iter()
        .filter(|c| !wanted.contains(c.name.as_str()))
        .map(|c| SchemaOp::DropColumn(c.name.clone()))
        .collect();

    if target.enforces_order() {
        let mut previous: Option<&Identifier> = None;
        for column in &target.columns {
            let placement = match previous {
                None => Placement::First,
                Some(prev) => Placement::After(prev.clone()),
            };
            operations.push(SchemaOp::ReorderColumn {
                column: column.clone(),
                placement,
            });
            previous = Some(column);
        }
    }

    Ok(ChangePlan { operations })
}

/// Applies one operation to an in-memory column list.
///
/// `name_of` extracts the column name from an element. Returns whether
/// the list changed; a move to the position a column already holds is
/// a no-op. Fails with [`CoreError::UnknownColumn`] when the operation
/// or its placement anchor names a column that is not in the list.
pub fn apply_op<T, F>(columns: &mut Vec<T>, op: &SchemaOp, name_of: F) -> Result<bool>
where
    F: Fn(&T) -> &str,
{
    let position = |columns: &[T], name: &str| columns.iter().position(|c| name_of(c) == name);

    match op {
        SchemaOp::DropColumn(name) => {
            let idx = position(columns.as_slice(), name.as_str())
                .ok_or_else(|| CoreError::UnknownColumn(name.to_string()))?;
            columns.remove(idx);
            Ok(true)
        }
        SchemaOp::ReorderColumn { column, placement } => {
            let from = position(columns.as_slice(), column.as_str())
                .ok_or_else(|| CoreError::UnknownColumn(column.to_string()))?;
            let moved = columns.remove(from);
            let to = match placement {
                Placement::First => 0,
                Placement::After(anchor) => match position(columns.as_slice(), anchor.as_str()) {
                    Some(idx) => idx + 1,
                    None => {
                        columns.insert(from, moved);
                        return Err(CoreError::UnknownColumn(anchor.to_string()));
                    }
                },
            };
            columns.insert(to, moved);
            Ok(to != from)
        }
    }
}

/// Applies a whole plan to a list of names, returning the final order.
pub fn simulate(current: &[Identifier], plan: &ChangePlan) -> Result<Vec<Identifier>> {
    let mut columns = current.to_vec();
    for op in &plan.operations {
        apply_op(&mut columns, op, Identifier::as_str)?;
    }
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<Identifier> {
        names.iter().map(|n| Identifier::parse(n).unwrap()).collect()
    }

    fn columns(names: &[&str]) -> Vec<Column> {
        ids(names)
            .into_iter()
            .enumerate()
            .map(|(i, name)| Column::new(name, i, Some(500)))
            .collect()
    }

    fn ident(name: &str) -> Identifier {
        Identifier::parse(name).unwrap()
    }

    #[test]
    fn test_drop_then_reorder() {
        let plan = plan(
            &columns(&["a", "b", "c"]),
            &TargetColumns::explicit(ids(&["c", "a"])),
        )
        .unwrap();

        assert_eq!(
            plan.operations,
            vec![
                SchemaOp::DropColumn(ident("b")),
                SchemaOp::ReorderColumn {
                    column: ident("c"),
                    placement: Placement::First,
                },
                SchemaOp::ReorderColumn {
                    column: ident("a"),
                    placement: Placement::After(ident("c")),
                },
            ]
        );
        assert_eq!(plan.dropped_columns(), vec![&ident("b")]);
        assert_eq!(plan.reorders().count(), 2);
    }

    #[test]
    fn test_inferred_target_does_not_reorder() {
        let plan = plan(
            &columns(&["a", "b", "c"]),
            &TargetColumns::first_row(ids(&["c", "a"])),
        )
        .unwrap();
        assert_eq!(plan.operations, vec![SchemaOp::DropColumn(ident("b"))]);
    }

    #[test]
    fn test_empty_target_changes_nothing() {
        let plan = plan(&columns(&["a", "b"]), &TargetColumns::empty()).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_unknown_target_column() {
        let err = plan(
            &columns(&["a", "b"]),
            &TargetColumns::explicit(ids(&["a", "zz"])),
        )
        .unwrap_err();
        assert_eq!(err, CoreError::UnknownColumn("zz".to_string()));
    }

    #[test]
    fn test_reorder_already_in_place_is_noop() {
        let mut cols = ids(&["a", "b", "c"]);
        let op = SchemaOp::ReorderColumn {
            column: ident("b"),
            placement: Placement::After(ident("a")),
        };
        assert!(!apply_op(&mut cols, &op, Identifier::as_str).unwrap());
        assert_eq!(cols, ids(&["a", "b", "c"]));
    }

    #[test]
    fn test_apply_op_moves_and_drops() {
        let mut cols = ids(&["a", "b", "c"]);
        let first = SchemaOp::ReorderColumn {
            column: ident("c"),
            placement: Placement::First,
        };
        assert!(apply_op(&mut cols, &first, Identifier::as_str).unwrap());
        assert_eq!(cols, ids(&["c", "a", "b"]));

        let drop = SchemaOp::DropColumn(ident("a"));
        assert!(apply_op(&mut cols, &drop, Identifier::as_str).unwrap());
        assert_eq!(cols, ids(&["c", "b"]));
    }

    #[test]
    fn test_apply_op_unknown_anchor_leaves_list_intact() {
        let mut cols = ids(&["a", "b"]);
        let op = SchemaOp::ReorderColumn {
            column: ident("a"),
            placement: Placement::After(ident("nope")),
        };
        assert!(apply_op(&mut cols, &op, Identifier::as_str).is_err());
        assert_eq!(cols, ids(&["a", "b"]));
    }

    #[test]
    fn test_simulate_reaches_target_order() {
        let current = ids(&["id", "name", "email", "phone"]);
        let target = TargetColumns::explicit(ids(&["phone", "id", "name"]));
        let cols = columns(&["id", "name", "email", "phone"]);

        let plan = plan(&cols, &target).unwrap();
        let shaped = simulate(&current, &plan).unwrap();
        assert_eq!(shaped, target.columns);
    }

    #[test]
    fn test_display() {
        let op = SchemaOp::ReorderColumn {
            column: ident("a"),
            placement: Placement::After(ident("c")),
        };
        assert_eq!(op.to_string(), "move a AFTER c");
        assert_eq!(SchemaOp::DropColumn(ident("b")).to_string(), "drop b");
    }
}
