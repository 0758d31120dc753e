//! SQLite dialect.
//!
//! SQLite cannot move a column, so reordering uses the table
//! recreation strategy: create a shadow table in the new column order,
//! copy the data, drop the old table, rename the shadow. Dropping a
//! primary key column needs the same treatment.

use sheetsync_core::{apply_op, SchemaOp};

use super::{info_name, StorageDialect};
use crate::error::Result;
use crate::registry::{ColumnInfo, TableLayout};

/// Prefix of the shadow table used while rebuilding. Tables with this
/// prefix are never created on behalf of callers.
pub const REBUILD_PREFIX: &str = "_sheetsync_rebuild_";

/// SQLite storage dialect.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Generates a column definition that keeps the catalog details.
    fn column_definition(&self, column: &ColumnInfo, inline_pk: bool) -> String {
        let mut parts = vec![self.quote_identifier(column.name().as_str())];
        if !column.declared_type.is_empty() {
            parts.push(column.declared_type.clone());
        }
        if inline_pk {
            parts.push("PRIMARY KEY".to_string());
        }
        if column.not_null && !inline_pk {
            parts.push("NOT NULL".to_string());
        }
        if let Some(ref default) = column.default {
            parts.push(format!("DEFAULT {default}"));
        }
        parts.join(" ")
    }

    /// Generates the statements that recreate `layout.table` with the
    /// columns of `layout`, in that order. An existing table with the
    /// shadow name makes the `CREATE` fail.
    fn rebuild_sql(&self, layout: &TableLayout) -> Vec<String> {
        let table = self.quote_identifier(layout.table.as_str());
        let shadow = self.quote_identifier(&format!("{REBUILD_PREFIX}{}", layout.table));

        let pk = layout.primary_key();
        let inline = pk.len() == 1;
        let mut defs: Vec<String> = layout
            .columns
            .iter()
            .map(|c| self.column_definition(c, inline && c.is_primary_key()))
            .collect();
        if pk.len() > 1 {
            let keys: Vec<String> = pk
                .iter()
                .map(|c| self.quote_identifier(c.name().as_str()))
                .collect();
            defs.push(format!("PRIMARY KEY ({})", keys.join(", ")));
        }

        let columns: Vec<String> = layout
            .columns
            .iter()
            .map(|c| self.quote_identifier(c.name().as_str()))
            .collect();
        let columns = columns.join(", ");

        vec![
            format!("CREATE TABLE {shadow} ({})", defs.join(", ")),
            format!("INSERT INTO {shadow} ({columns}) SELECT {columns} FROM {table}"),
            format!("DROP TABLE {table}"),
            format!("ALTER TABLE {shadow} RENAME TO {table}"),
        ]
    }
}

impl StorageDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn schema_op_sql(&self, op: &SchemaOp, layout: &mut TableLayout) -> Result<Vec<String>> {
        match op {
            SchemaOp::DropColumn(column) => {
                let in_pk = layout
                    .columns
                    .iter()
                    .any(|c| c.name() == column && c.is_primary_key());
                apply_op(&mut layout.columns, op, info_name)?;
                if in_pk {
                    Ok(self.rebuild_sql(layout))
                } else {
                    Ok(vec![format!(
                        "ALTER TABLE {} DROP COLUMN {}",
                        self.quote_identifier(layout.table.as_str()),
                        self.quote_identifier(column.as_str())
                    )])
                }
            }
            SchemaOp::ReorderColumn { .. } => {
                if apply_op(&mut layout.columns, op, info_name)? {
                    Ok(self.rebuild_sql(layout))
                } else {
                    Ok(Vec::new())
                }
            }
        }
    }
}
