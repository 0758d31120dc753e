//! Storage dialects.
//!
//! A dialect turns table operations into SQL for one engine. The
//! statements for a structural [`SchemaOp`] depend on the live layout,
//! so [`StorageDialect::schema_op_sql`] takes the layout and updates it
//! to the shape the statements leave behind.

mod mysql;
mod sqlite;

pub use mysql::MySqlDialect;
pub use sqlite::{SqliteDialect, REBUILD_PREFIX};

use sheetsync_core::{ChangePlan, Identifier, SchemaOp};

use crate::error::Result;
use crate::registry::{ColumnInfo, TableLayout};

/// Quotes an identifier with double quotes.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Returns the name of a layout column, for [`sheetsync_core::apply_op`].
pub(crate) fn info_name(info: &ColumnInfo) -> &str {
    info.name().as_str()
}

/// Trait for engine-specific SQL generation.
pub trait StorageDialect: Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Quote an identifier (table name, column name).
    fn quote_identifier(&self, name: &str) -> String {
        quote_identifier(name)
    }

    /// Returns the text column type of the given width.
    fn text_type(&self, width: usize) -> String {
        format!("VARCHAR({width})")
    }

    /// Generates SQL for creating a table of text columns.
    fn create_table_sql(
        &self,
        table: &Identifier,
        columns: &[Identifier],
        width: usize,
        if_not_exists: bool,
    ) -> String {
        let mut sql = String::from("CREATE TABLE ");
        if if_not_exists {
            sql.push_str("IF NOT EXISTS ");
        }
        sql.push_str(&self.quote_identifier(table.as_str()));
        sql.push_str(" (");
        let defs: Vec<String> = columns
            .iter()
            .map(|c| format!("{} {}", self.quote_identifier(c.as_str()), self.text_type(width)))
            .collect();
        sql.push_str(&defs.join(", "));
        sql.push(')');
        sql
    }

    /// Generates SQL for adding a nullable text column.
    fn add_column_sql(&self, table: &Identifier, column: &Identifier, width: usize) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            self.quote_identifier(table.as_str()),
            self.quote_identifier(column.as_str()),
            self.text_type(width)
        )
    }

    /// Generates SQL for renaming a column.
    fn rename_column_sql(&self, table: &Identifier, old: &Identifier, new: &Identifier) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.quote_identifier(table.as_str()),
            self.quote_identifier(old.as_str()),
            self.quote_identifier(new.as_str())
        )
    }

    /// Generates SQL for dropping a table.
    fn drop_table_sql(&self, table: &Identifier) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote_identifier(table.as_str()))
    }

    /// Generates SQL for deleting every row of a table.
    fn delete_rows_sql(&self, table: &Identifier) -> String {
        format!("DELETE FROM {}", self.quote_identifier(table.as_str()))
    }

    /// Generates the statements for one structural operation and applies
    /// the operation to `layout`.
    ///
    /// May return no statements when the operation leaves the layout
    /// unchanged.
    fn schema_op_sql(&self, op: &SchemaOp, layout: &mut TableLayout) -> Result<Vec<String>>;
}

/// Renders a whole plan against a layout, in plan order.
///
/// The layout ends up in the shape the statements produce.
pub fn render_plan(
    dialect: &dyn StorageDialect,
    layout: &mut TableLayout,
    plan: &ChangePlan,
) -> Result<Vec<String>> {
    let mut statements = Vec::new();
    for op in &plan.operations {
        statements.extend(dialect.schema_op_sql(op, layout)?);
    }
    Ok(statements)
}
