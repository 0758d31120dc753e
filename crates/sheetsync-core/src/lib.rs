//! # sheetsync-core
//!
//! Storage-free building blocks for tables whose schema is defined by
//! uploaded spreadsheets and edited by a front end.
//!
//! This crate provides:
//! - [`sanitize`] and the [`Identifier`] newtype, the only way a table or
//!   column name reaches SQL
//! - [`plan()`], the schema diff engine that turns a live column list
//!   and a [`TargetColumns`] into an ordered [`ChangePlan`]
//! - [`normalize`], the row replace planner that aligns submitted rows
//!   to a column order for bulk insertion
//! - [`DesiredState`], the client payload of a full-table save
//!
//! ## Example
//!
//! ```rust
//! use sheetsync_core::{plan, Column, Identifier, Placement, SchemaOp, TargetColumns};
//!
//! let current: Vec<Column> = ["a", "b", "c"]
//!     .iter()
//!     .enumerate()
//!     .map(|(i, n)| Column::new(Identifier::parse(n).unwrap(), i, Some(500)))
//!     .collect();
//! let target = TargetColumns::explicit(vec![
//!     Identifier::parse("c").unwrap(),
//!     Identifier::parse("a").unwrap(),
//! ]);
//!
//! let plan = plan(&current, &target).unwrap();
//! assert_eq!(plan.operations[0], SchemaOp::DropColumn(Identifier::parse("b").unwrap()));
//! assert!(matches!(
//!     &plan.operations[1],
//!     SchemaOp::ReorderColumn { placement: Placement::First, .. }
//! ));
//! ```

pub mod column;
pub mod error;
pub mod ident;
pub mod plan;
pub mod rows;
pub mod state;

pub use column::{declared_length, Column};
pub use error::{CoreError, Result};
pub use ident::{sanitize, sanitize_all, Identifier};
pub use plan::{apply_op, plan, simulate, ChangePlan, Placement, SchemaOp};
pub use rows::{
    normalize, normalize_value, normalize_with, rows_per_statement, truncate_chars,
    NormalizeOptions, NormalizedRow, Row,
};
pub use state::{ColumnSource, DesiredState, TargetColumns};
