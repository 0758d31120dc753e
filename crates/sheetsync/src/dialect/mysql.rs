//! MySQL dialect.
//!
//! Render-only: used to preview the statements a plan would issue on a
//! server that can move columns in place. Every reorder is emitted as a
//! `MODIFY COLUMN`, even when the column is already in position.

use sheetsync_core::{apply_op, Placement, SchemaOp};

use super::{info_name, StorageDialect};
use crate::error::Result;
use crate::registry::TableLayout;

/// MySQL storage dialect.
#[derive(Debug, Clone)]
pub struct MySqlDialect {
    column_width: usize,
}

impl MySqlDialect {
    /// Creates a dialect that re-declares moved columns with this width.
    #[must_use]
    pub fn new(column_width: usize) -> Self {
        Self { column_width }
    }
}

impl StorageDialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn schema_op_sql(&self, op: &SchemaOp, layout: &mut TableLayout) -> Result<Vec<String>> {
        apply_op(&mut layout.columns, op, info_name)?;
        let table = self.quote_identifier(layout.table.as_str());
        let sql = match op {
            SchemaOp::DropColumn(column) => format!(
                "ALTER TABLE {table} DROP COLUMN {}",
                self.quote_identifier(column.as_str())
            ),
            SchemaOp::ReorderColumn { column, placement } => {
                let position = match placement {
                    Placement::First => "FIRST".to_string(),
                    Placement::After(anchor) => {
                        format!("AFTER {}", self.quote_identifier(anchor.as_str()))
                    }
                };
                format!(
                    "ALTER TABLE {table} MODIFY COLUMN {} {} {position}",
                    self.quote_identifier(column.as_str()),
                    self.text_type(self.column_width)
                )
            }
        };
        Ok(vec![sql])
    }
}
