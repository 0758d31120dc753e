//! Table registry.
//!
//! A read-only view over the SQLite catalog: which tables exist, the
//! live column list of a table, its primary key and its rows. The free
//! functions take any executor so they can run on the pool or inside an
//! open transaction; [`TableRegistry`] wraps them for pool use.

use serde::Serialize;
use sheetsync_core::{declared_length, Column, Identifier, Row};
use sqlx::sqlite::{Sqlite, SqlitePool, SqliteRow};
use sqlx::{Executor, Row as _};

use crate::dialect::quote_identifier;
use crate::error::{Error, Result};

/// Primary key assumed when the catalog reports none.
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// A live column with the catalog details needed to re-declare it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    /// Name, position and declared length.
    pub column: Column,
    /// Declared type as written in the schema (may be empty).
    pub declared_type: String,
    /// Whether the column is `NOT NULL`.
    pub not_null: bool,
    /// Default value expression, if any.
    pub default: Option<String>,
    /// 1-based position in the primary key, 0 if not part of it.
    pub pk_ordinal: u32,
}

impl ColumnInfo {
    /// Returns the column name.
    #[must_use]
    pub fn name(&self) -> &Identifier {
        &self.column.name
    }

    /// Returns true if the column is part of the primary key.
    #[must_use]
    pub fn is_primary_key(&self) -> bool {
        self.pk_ordinal > 0
    }
}

/// The live column list of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableLayout {
    /// Table name.
    pub table: Identifier,
    /// Columns in table order.
    pub columns: Vec<ColumnInfo>,
}

impl TableLayout {
    /// Returns the columns without catalog details.
    #[must_use]
    pub fn columns(&self) -> Vec<Column> {
        self.columns
            .iter()
            .enumerate()
            .map(|(position, info)| Column {
                position,
                ..info.column.clone()
            })
            .collect()
    }

    /// Returns the column names in order.
    #[must_use]
    pub fn names(&self) -> Vec<Identifier> {
        self.columns.iter().map(|c| c.name().clone()).collect()
    }

    /// Returns true if the table has a column with this name.
    #[must_use]
    pub fn contains(&self, name: &Identifier) -> bool {
        self.columns.iter().any(|c| c.name() == name)
    }

    /// Returns true if `name` would clash with an existing column. SQLite
    /// compares column names case-insensitively.
    #[must_use]
    pub fn collides(&self, name: &Identifier) -> bool {
        self.columns
            .iter()
            .any(|c| c.name().as_str().eq_ignore_ascii_case(name.as_str()))
    }

    /// Returns the primary key columns ordered by key position.
    #[must_use]
    pub fn primary_key(&self) -> Vec<&ColumnInfo> {
        let mut pk: Vec<&ColumnInfo> = self.columns.iter().filter(|c| c.is_primary_key()).collect();
        pk.sort_by_key(|c| c.pk_ordinal);
        pk
    }

    /// Returns the column rows are addressed by: the first primary key
    /// column, or `id` when the table has no primary key.
    pub fn primary_key_name(&self) -> Result<Identifier> {
        match self.primary_key().first() {
            Some(info) => Ok(info.name().clone()),
            None => Ok(Identifier::parse(DEFAULT_PRIMARY_KEY)?),
        }
    }
}

/// Lists user tables, sorted by name.
pub async fn list_tables<'e, E>(executor: E) -> Result<Vec<String>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' ORDER BY name",
    )
    .fetch_all(executor)
    .await
    .map_err(Error::CatalogUnavailable)?;

    Ok(rows.into_iter().map(|(name,)| name).collect())
}

/// Reads the live column list of a table.
///
/// Fails with [`Error::TableNotFound`] if the table does not exist.
pub async fn describe<'e, E>(executor: E, table: &Identifier) -> Result<TableLayout>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows: Vec<(i64, String, String, i64, Option<String>, i64)> = sqlx::query_as(
        r#"SELECT cid, name, type, "notnull", dflt_value, pk FROM pragma_table_info(?) ORDER BY cid"#,
    )
    .bind(table.as_str())
    .fetch_all(executor)
    .await
    .map_err(Error::CatalogUnavailable)?;

    if rows.is_empty() {
        return Err(Error::TableNotFound(table.to_string()));
    }

    let mut columns = Vec::with_capacity(rows.len());
    for (position, (_cid, name, declared_type, not_null, default, pk)) in rows.into_iter().enumerate() {
        columns.push(ColumnInfo {
            column: Column::new(
                Identifier::parse(&name)?,
                position,
                declared_length(&declared_type),
            ),
            declared_type,
            not_null: not_null != 0,
            default,
            pk_ordinal: u32::try_from(pk).unwrap_or(0),
        });
    }

    Ok(TableLayout {
        table: table.clone(),
        columns,
    })
}

/// Returns true if the table exists.
pub async fn table_exists<'e, E>(executor: E, table: &Identifier) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table.as_str())
            .fetch_optional(executor)
            .await
            .map_err(Error::CatalogUnavailable)?;
    Ok(row.is_some())
}

/// Builds a `SELECT` that returns every column cast to text.
fn select_text_sql(layout: &TableLayout) -> String {
    let columns: Vec<String> = layout
        .columns
        .iter()
        .map(|c| {
            let quoted = quote_identifier(c.name().as_str());
            format!("CAST({quoted} AS TEXT) AS {quoted}")
        })
        .collect();
    format!(
        "SELECT {} FROM {}",
        columns.join(", "),
        quote_identifier(layout.table.as_str())
    )
}

fn decode_row(layout: &TableLayout, row: &SqliteRow) -> Result<Row> {
    let mut out = Row::with_capacity(layout.columns.len());
    for (idx, info) in layout.columns.iter().enumerate() {
        let value: Option<String> = row.try_get(idx)?;
        out.insert(info.name().to_string(), value);
    }
    Ok(out)
}

/// Reads every row of a table, values as text or null, in column order.
pub async fn read_rows<'e, E>(executor: E, layout: &TableLayout) -> Result<Vec<Row>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(&select_text_sql(layout))
        .fetch_all(executor)
        .await?;
    rows.iter().map(|row| decode_row(layout, row)).collect()
}

/// Reads the row whose `key` column equals `value`.
pub async fn fetch_row<'e, E>(
    executor: E,
    layout: &TableLayout,
    key: &Identifier,
    value: &str,
) -> Result<Option<Row>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "{} WHERE {} = ? LIMIT 1",
        select_text_sql(layout),
        quote_identifier(key.as_str())
    );
    let row = sqlx::query(&sql).bind(value).fetch_optional(executor).await?;
    row.map(|r| decode_row(layout, &r)).transpose()
}

/// Read-only catalog access over a pool.
#[derive(Debug, Clone)]
pub struct TableRegistry {
    pool: SqlitePool,
}

impl TableRegistry {
    /// Creates a registry over the given pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Lists user tables, sorted by name.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        list_tables(&self.pool).await
    }

    /// Reads the live column list of a table.
    pub async fn describe(&self, table: &Identifier) -> Result<TableLayout> {
        describe(&self.pool, table).await
    }

    /// Returns the primary key column, falling back to `id`.
    pub async fn primary_key_of(&self, table: &Identifier) -> Result<Identifier> {
        self.describe(table).await?.primary_key_name()
    }

    /// Returns true if the table exists.
    pub async fn exists(&self, table: &Identifier) -> Result<bool> {
        table_exists(&self.pool, table).await
    }

    /// Reads every row of a table.
    pub async fn read_rows(&self, table: &Identifier) -> Result<Vec<Row>> {
        let layout = self.describe(table).await?;
        read_rows(&self.pool, &layout).await
    }
}
