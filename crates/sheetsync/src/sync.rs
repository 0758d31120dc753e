//! Full-table save.
//!
//! [`Synchronizer::synchronize`] replaces the contents of a table with a
//! [`DesiredState`] inside one transaction: read the live columns, plan,
//! drop, reorder, delete every row, insert the new rows, commit. Any
//! failure rolls the whole save back and reports the stage it failed in.

use serde::Serialize;
use sheetsync_core::{
    normalize, plan, rows_per_statement, DesiredState, Identifier, NormalizedRow, SchemaOp,
    TargetColumns,
};
use sqlx::sqlite::{Sqlite, SqliteConnection, SqlitePool};
use sqlx::QueryBuilder;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::dialect::{SqliteDialect, StorageDialect};
use crate::error::{Error, Result, SyncStage};
use crate::registry::{self, TableLayout};

/// Message returned after a save that inserted rows.
pub const SAVED: &str = "Table saved successfully";
/// Message returned after a save with no rows.
pub const SAVED_EMPTY: &str = "Table saved successfully (all rows deleted)";

/// Outcome of a successful save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Table that was saved.
    pub table: Identifier,
    /// Column order after the save.
    pub columns: Vec<Identifier>,
    /// Columns that were dropped.
    pub dropped: Vec<Identifier>,
    /// Structural statements executed.
    pub statements: usize,
    /// Rows inserted.
    pub rows_inserted: u64,
    /// Human readable outcome.
    pub message: String,
}

/// Bulk-inserts normalized rows, batching so no statement exceeds
/// `max_params` bound parameters. Returns the number of rows inserted.
pub async fn insert_rows(
    conn: &mut SqliteConnection,
    dialect: &dyn StorageDialect,
    table: &Identifier,
    columns: &[Identifier],
    rows: &[NormalizedRow],
    max_params: usize,
) -> Result<u64> {
    if rows.is_empty() || columns.is_empty() {
        return Ok(0);
    }

    let quoted: Vec<String> = columns
        .iter()
        .map(|c| dialect.quote_identifier(c.as_str()))
        .collect();
    let head = format!(
        "INSERT INTO {} ({}) ",
        dialect.quote_identifier(table.as_str()),
        quoted.join(", ")
    );

    let mut inserted = 0;
    for chunk in rows.chunks(rows_per_statement(columns.len(), max_params)) {
        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(&head);
        builder.push_values(chunk, |mut values, row| {
            for value in row.values() {
                values.push_bind(value.clone());
            }
        });
        debug!(table = %table, rows = chunk.len(), "Inserting batch");
        inserted += builder.build().execute(&mut *conn).await?.rows_affected();
    }
    Ok(inserted)
}

/// Executes one structural operation, keeping `layout` in step.
/// Returns the number of statements issued.
async fn execute_op(
    conn: &mut SqliteConnection,
    dialect: &dyn StorageDialect,
    op: &SchemaOp,
    layout: &mut TableLayout,
) -> Result<usize> {
    let statements = dialect.schema_op_sql(op, layout)?;
    for sql in &statements {
        debug!(sql = %sql, "Executing");
        sqlx::query(sql).execute(&mut *conn).await?;
    }
    Ok(statements.len())
}

/// Applies full-table saves.
#[derive(Debug, Clone)]
pub struct Synchronizer {
    pool: SqlitePool,
    dialect: SqliteDialect,
    insert_batch_params: usize,
}

impl Synchronizer {
    /// Creates a synchronizer over the given pool.
    #[must_use]
    pub fn new(pool: SqlitePool, config: &ServiceConfig) -> Self {
        Self {
            pool,
            dialect: SqliteDialect::new(),
            insert_batch_params: config.insert_batch_params,
        }
    }

    /// Replaces the structure and contents of `table` with `state`.
    ///
    /// Either every step takes effect or none does. Target column names
    /// are validated before any storage call; every later failure is an
    /// [`Error::SyncFailed`] carrying the stage it happened in.
    pub async fn synchronize(&self, table: &Identifier, state: &DesiredState) -> Result<SyncReport> {
        let target = state.target_columns()?;
        info!(
            table = %table,
            rows = state.rows.len(),
            columns = target.columns.len(),
            "Saving table"
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::from(e).at_stage(SyncStage::Begin))?;

        match self.apply(&mut tx, table, state, &target).await {
            Ok(report) => {
                tx.commit()
                    .await
                    .map_err(|e| Error::from(e).at_stage(SyncStage::Commit))?;
                info!(
                    table = %table,
                    dropped = report.dropped.len(),
                    rows = report.rows_inserted,
                    "Table saved"
                );
                Ok(report)
            }
            Err(err) => {
                warn!(table = %table, error = %err, "Save failed, rolling back");
                if let Err(rollback) = tx.rollback().await {
                    warn!(table = %table, error = %rollback, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn apply(
        &self,
        conn: &mut SqliteConnection,
        table: &Identifier,
        state: &DesiredState,
        target: &TargetColumns,
    ) -> Result<SyncReport> {
        let mut layout = registry::describe(&mut *conn, table)
            .await
            .map_err(|e| e.at_stage(SyncStage::Describe))?;

        let plan = plan(&layout.columns(), target).map_err(|e| Error::from(e).at_stage(SyncStage::Plan))?;
        if !plan.is_empty() {
            debug!(table = %table, operations = plan.operations.len(), "Planned schema changes");
        }

        let mut statements = 0;
        for op in plan.drops() {
            statements += execute_op(conn, &self.dialect, op, &mut layout)
                .await
                .map_err(|e| e.at_stage(SyncStage::DropColumns))?;
        }
        for op in plan.reorders() {
            statements += execute_op(conn, &self.dialect, op, &mut layout)
                .await
                .map_err(|e| e.at_stage(SyncStage::ReorderColumns))?;
        }

        sqlx::query(&self.dialect.delete_rows_sql(table))
            .execute(&mut *conn)
            .await
            .map_err(|e| Error::from(e).at_stage(SyncStage::DeleteRows))?;

        let rows_inserted = if state.rows.is_empty() {
            0
        } else {
            let rows = normalize(&state.rows, &target.columns)
                .map_err(|e| Error::from(e).at_stage(SyncStage::InsertRows))?;
            insert_rows(
                conn,
                &self.dialect,
                table,
                &target.columns,
                &rows,
                self.insert_batch_params,
            )
            .await
            .map_err(|e| e.at_stage(SyncStage::InsertRows))?
        };

        Ok(SyncReport {
            table: table.clone(),
            columns: layout.names(),
            dropped: plan.dropped_columns().into_iter().cloned().collect(),
            statements,
            rows_inserted,
            message: if state.rows.is_empty() { SAVED_EMPTY } else { SAVED }.to_string(),
        })
    }
}
