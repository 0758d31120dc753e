//! The operations exposed to callers.
//!
//! [`TableService`] is the single entry point a transport (the CLI, an
//! HTTP layer) talks to. Reads need no credential. Every mutation first
//! resolves the credential, then validates names, and only then touches
//! storage; a successful mutation is recorded in the audit trail.

use serde::Serialize;
use sheetsync_core::{ChangePlan, CoreError, DesiredState, Identifier, Row};
use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::QueryBuilder;
use tracing::{debug, info};

use crate::audit::{AuditEntry, AuditLog, AuditRecord};
use crate::config::ServiceConfig;
use crate::dialect::{render_plan, SqliteDialect, StorageDialect};
use crate::error::{Error, Result};
use crate::identity::{Actor, IdentityResolver};
use crate::ingest::{CsvRowStream, IngestReport, Ingestor};
use crate::registry::{self, TableRegistry};
use crate::sync::{SyncReport, Synchronizer};

/// One changed cell of an updated row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnChange {
    /// Column that changed.
    pub column: Identifier,
    /// Value before the update.
    pub old: Option<String>,
    /// Value after the update.
    pub new: Option<String>,
}

/// Outcome of [`TableService::update_row`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowUpdate {
    /// Primary key value of the row.
    pub row_id: String,
    /// Cells that changed; empty when nothing did.
    pub changes: Vec<ColumnChange>,
}

impl RowUpdate {
    /// Returns a human readable outcome.
    #[must_use]
    pub fn message(&self) -> &'static str {
        if self.changes.is_empty() {
            "No changes detected"
        } else {
            "Row updated successfully"
        }
    }
}

/// What a save would do, without doing it.
#[derive(Debug, Clone, Serialize)]
pub struct SavePreview {
    /// Dialect the statements are written for.
    pub dialect: &'static str,
    /// Structural operations, in order.
    pub operations: Vec<String>,
    /// Statements the operations render to.
    pub statements: Vec<String>,
    /// Column order after the structural changes.
    pub columns: Vec<Identifier>,
}

fn display(value: Option<&str>) -> &str {
    value.unwrap_or("NULL")
}

/// Table operations over one database.
pub struct TableService<R> {
    pool: SqlitePool,
    config: ServiceConfig,
    registry: TableRegistry,
    dialect: SqliteDialect,
    synchronizer: Synchronizer,
    ingestor: Ingestor,
    audit: AuditLog,
    resolver: R,
}

impl<R: IdentityResolver> TableService<R> {
    /// Creates the service and starts its audit writer.
    pub async fn new(pool: SqlitePool, resolver: R, config: ServiceConfig) -> Result<Self> {
        let audit = AuditLog::start(pool.clone(), &config).await?;
        Ok(Self {
            registry: TableRegistry::new(pool.clone()),
            synchronizer: Synchronizer::new(pool.clone(), &config),
            ingestor: Ingestor::new(pool.clone(), &config),
            dialect: SqliteDialect::new(),
            audit,
            resolver,
            config,
            pool,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Returns the audit log.
    #[must_use]
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    async fn authorize(&self, credential: Option<&str>) -> Result<Actor> {
        let credential = credential
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::Unauthorized("missing credential".to_string()))?;
        let actor = self.resolver.resolve(credential).await?;
        debug!(actor = %actor, "Resolved credential");
        Ok(actor)
    }

    /// Parses a table name and rejects the service's own tables.
    fn user_table(&self, table: &str) -> Result<Identifier> {
        let table = Identifier::parse(table)?;
        if self.config.is_reserved(table.as_str()) {
            return Err(Error::ReservedTable(table.into_string()));
        }
        Ok(table)
    }

    /// Lists user tables, sorted by name.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        let tables = self.registry.list_tables().await?;
        Ok(tables
            .into_iter()
            .filter(|t| !self.config.is_reserved(t))
            .collect())
    }

    /// Reads every row of a table, as text or null, in column order.
    pub async fn read_table(&self, table: &str) -> Result<Vec<Row>> {
        let table = self.user_table(table)?;
        self.registry.read_rows(&table).await
    }

    /// Reads the audit trail in write order, optionally for one table.
    pub async fn audit_entries(&self, table: Option<&str>) -> Result<Vec<AuditRecord>> {
        self.audit.entries(table).await
    }

    /// Creates a table from CSV input. The table is named after
    /// `file_name` with its extension stripped, sanitized and lowercased.
    pub async fn ingest<I>(
        &self,
        credential: Option<&str>,
        file_name: &str,
        input: I,
    ) -> Result<IngestReport>
    where
        I: std::io::Read,
    {
        let actor = self.authorize(credential).await?;
        let table = self.user_table(Ingestor::table_name(file_name)?.as_str())?;

        let report = self
            .ingestor
            .ingest_into(&table, CsvRowStream::new(input)?)
            .await?;

        self.audit.record(AuditEntry::new(
            &actor,
            table.as_str(),
            format!("Created table and inserted {} rows", report.rows),
        ));
        Ok(report)
    }

    /// Replaces the structure and contents of a table.
    pub async fn save(
        &self,
        credential: Option<&str>,
        table: &str,
        state: &DesiredState,
    ) -> Result<SyncReport> {
        let actor = self.authorize(credential).await?;
        let table = self.user_table(table)?;

        let report = self.synchronizer.synchronize(&table, state).await?;

        let description = if state.rows.is_empty() {
            format!("Saved table {table}: deleted all rows")
        } else {
            format!("Saved table {table}: updated {} rows", report.rows_inserted)
        };
        self.audit
            .record(AuditEntry::new(&actor, table.as_str(), description));
        Ok(report)
    }

    /// Renders the statements a save would issue in `dialect`, without
    /// executing anything.
    pub async fn preview_save(
        &self,
        table: &str,
        state: &DesiredState,
        dialect: &dyn StorageDialect,
    ) -> Result<SavePreview> {
        let table = self.user_table(table)?;
        let target = state.target_columns()?;
        let mut layout = self.registry.describe(&table).await?;
        let plan: ChangePlan = sheetsync_core::plan(&layout.columns(), &target)?;

        let mut statements = render_plan(dialect, &mut layout, &plan)?;
        statements.push(dialect.delete_rows_sql(&table));

        Ok(SavePreview {
            dialect: dialect.name(),
            operations: plan.operations.iter().map(ToString::to_string).collect(),
            statements,
            columns: layout.names(),
        })
    }

    /// Updates one row, addressed by its primary key value.
    ///
    /// Only cells whose value differs are written; each one gets its own
    /// audit record.
    pub async fn update_row(
        &self,
        credential: Option<&str>,
        table: &str,
        row_id: &str,
        changes: &Row,
    ) -> Result<RowUpdate> {
        let actor = self.authorize(credential).await?;
        let table = self.user_table(table)?;
        let requested = changes
            .iter()
            .map(|(key, value)| -> Result<(Identifier, Option<String>)> {
                Ok((Identifier::parse(key)?, value.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut tx = self.pool.begin().await?;
        let layout = registry::describe(&mut *tx, &table).await?;
        let key = layout.primary_key_name()?;
        let current = registry::fetch_row(&mut *tx, &layout, &key, row_id)
            .await?
            .ok_or_else(|| Error::RowNotFound {
                table: table.to_string(),
                row_id: row_id.to_string(),
            })?;

        let mut update = RowUpdate {
            row_id: row_id.to_string(),
            changes: Vec::new(),
        };
        for (column, new) in requested {
            if !layout.contains(&column) {
                return Err(CoreError::UnknownColumn(column.into_string()).into());
            }
            let old = current.get(column.as_str()).cloned().flatten();
            if old != new {
                update.changes.push(ColumnChange { column, old, new });
            }
        }
        if update.changes.is_empty() {
            debug!(table = %table, row = row_id, "No changes detected");
            return Ok(update);
        }

        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
            "UPDATE {} SET ",
            self.dialect.quote_identifier(table.as_str())
        ));
        let mut assignments = builder.separated(", ");
        for change in &update.changes {
            assignments.push(format!(
                "{} = ",
                self.dialect.quote_identifier(change.column.as_str())
            ));
            assignments.push_bind_unseparated(change.new.clone());
        }
        builder.push(format!(" WHERE {} = ", self.dialect.quote_identifier(key.as_str())));
        builder.push_bind(row_id.to_string());
        builder.build().execute(&mut *tx).await?;
        tx.commit().await?;

        info!(table = %table, row = row_id, changed = update.changes.len(), "Row updated");
        for change in &update.changes {
            self.audit.record(
                AuditEntry::new(
                    &actor,
                    table.as_str(),
                    format!(
                        "Updated {} in row {} from {} to {}",
                        change.column,
                        row_id,
                        display(change.old.as_deref()),
                        display(change.new.as_deref())
                    ),
                )
                .column(change.column.as_str())
                .row(row_id),
            );
        }
        Ok(update)
    }

    /// Adds a nullable text column and returns its generated name.
    pub async fn add_column(
        &self,
        credential: Option<&str>,
        table: &str,
        label: &str,
    ) -> Result<Identifier> {
        let actor = self.authorize(credential).await?;
        let table = self.user_table(table)?;
        let column = Identifier::sanitize(label)?;

        let layout = self.registry.describe(&table).await?;
        if layout.collides(&column) {
            return Err(CoreError::DuplicateIdentifier(column.into_string()).into());
        }

        let sql = self
            .dialect
            .add_column_sql(&table, &column, self.config.added_column_width);
        debug!(sql = %sql, "Executing");
        sqlx::query(&sql).execute(&self.pool).await?;
        info!(table = %table, column = %column, "Column added");

        self.audit.record(
            AuditEntry::new(&actor, table.as_str(), format!("Added new column {column}"))
                .column(column.as_str()),
        );
        Ok(column)
    }

    /// Renames a column. The new name is sanitized and returned.
    pub async fn rename_column(
        &self,
        credential: Option<&str>,
        table: &str,
        old: &str,
        new_label: &str,
    ) -> Result<Identifier> {
        let actor = self.authorize(credential).await?;
        let table = self.user_table(table)?;
        let old = Identifier::parse(old)?;
        let new = Identifier::sanitize(new_label)?;

        let layout = self.registry.describe(&table).await?;
        if !layout.contains(&old) {
            return Err(CoreError::UnknownColumn(old.into_string()).into());
        }
        if layout.collides(&new) {
            return Err(CoreError::DuplicateIdentifier(new.into_string()).into());
        }

        let sql = self.dialect.rename_column_sql(&table, &old, &new);
        debug!(sql = %sql, "Executing");
        sqlx::query(&sql).execute(&self.pool).await?;
        info!(table = %table, from = %old, to = %new, "Column renamed");

        self.audit.record(
            AuditEntry::new(
                &actor,
                table.as_str(),
                format!("Renamed column {old} to {new}"),
            )
            .column(format!("{old} to {new}")),
        );
        Ok(new)
    }

    /// Drops a table.
    pub async fn delete_table(&self, credential: Option<&str>, table: &str) -> Result<()> {
        let actor = self.authorize(credential).await?;
        let table = self.user_table(table)?;

        if !self.registry.exists(&table).await? {
            return Err(Error::TableNotFound(table.into_string()));
        }
        let sql = self.dialect.drop_table_sql(&table);
        debug!(sql = %sql, "Executing");
        sqlx::query(&sql).execute(&self.pool).await?;
        info!(table = %table, "Table deleted");

        self.audit.record(AuditEntry::new(
            &actor,
            table.as_str(),
            format!("Deleted table {table}"),
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::ALL;
    use crate::dialect::MySqlDialect;
    use crate::error::ErrorKind;
    use crate::identity::StaticTokens;
    use crate::testing::memory_pool;

    const TOKEN: Option<&str> = Some("t0ken");

    async fn service() -> TableService<StaticTokens> {
        let pool = memory_pool().await;
        sqlx::query(r#"CREATE TABLE "staff" ("id" VARCHAR(500) PRIMARY KEY, "name" VARCHAR(500), "dept" VARCHAR(500))"#)
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(r#"INSERT INTO "staff" VALUES ('1', 'Bob', 'ops'), ('2', 'Ann', NULL)"#)
            .execute(&pool)
            .await
            .unwrap();
        TableService::new(
            pool,
            StaticTokens::new().with_token("t0ken", "alice"),
            ServiceConfig::default(),
        )
        .await
        .unwrap()
    }

    fn changes(pairs: &[(&str, Option<&str>)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
            .collect()
    }

    #[tokio::test]
    async fn test_list_tables_hides_reserved() {
        let service = service().await;
        assert_eq!(service.list_tables().await.unwrap(), vec!["staff"]);

        let err = service.read_table("audit_log").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidIdentifier);
        let err = service.delete_table(TOKEN, "audit_log").await.unwrap_err();
        assert!(matches!(err, Error::ReservedTable(_)));
    }

    #[tokio::test]
    async fn test_reserved_tables_ignore_case() {
        let service = service().await;
        let state = DesiredState::default();
        let cells = changes(&[("logs", Some("x"))]);

        for table in ["AUDIT_LOG", "Api_Tokens"] {
            let results = [
                service.read_table(table).await.map(|_| ()),
                service.save(TOKEN, table, &state).await.map(|_| ()),
                service.update_row(TOKEN, table, "1", &cells).await.map(|_| ()),
                service.add_column(TOKEN, table, "extra").await.map(|_| ()),
                service
                    .rename_column(TOKEN, table, "logs", "notes")
                    .await
                    .map(|_| ()),
                service.delete_table(TOKEN, table).await,
            ];
            for result in results {
                assert!(matches!(result, Err(Error::ReservedTable(_))), "{table}: {result:?}");
            }
        }

        sqlx::query(r#"CREATE TABLE "AUDIT_LOG_ARCHIVE" ("id" TEXT)"#)
            .execute(&service.pool)
            .await
            .unwrap();
        assert_eq!(
            service.list_tables().await.unwrap(),
            vec!["AUDIT_LOG_ARCHIVE", "staff"]
        );
        let tables = TableRegistry::new(service.pool.clone()).list_tables().await.unwrap();
        assert!(tables.iter().any(|t| t == "audit_log"));
    }

    #[tokio::test]
    async fn test_rebuild_prefix_is_not_ingestible() {
        let service = service().await;

        let err = service
            .ingest(TOKEN, "_sheetsync_rebuild_staff.csv", "name\nprecious\n".as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ReservedTable(_)));
        assert_eq!(service.list_tables().await.unwrap(), vec!["staff"]);
    }

    #[tokio::test]
    async fn test_lost_audit_table_does_not_fail_mutations() {
        let service = service().await;
        sqlx::query(r#"DROP TABLE "audit_log""#)
            .execute(&service.pool)
            .await
            .unwrap();

        let state: DesiredState = serde_json::from_str(
            r#"{"rows": [{"id": "1", "name": "Bob"}, {"id": "3", "name": "Eve"}], "column_order": ["id", "name"]}"#,
        )
        .unwrap();
        let report = service.save(TOKEN, "staff", &state).await.unwrap();
        assert_eq!(report.rows_inserted, 2);

        let update = service
            .update_row(TOKEN, "staff", "3", &changes(&[("name", Some("Eva"))]))
            .await
            .unwrap();
        assert_eq!(update.changes.len(), 1);
        service.audit().flush().await;

        let rows = service.read_table("staff").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["name"].as_deref(), Some("Eva"));
        assert_eq!(rows[0].len(), 2);
        assert!(service.audit_entries(None).await.is_err());
    }

    #[tokio::test]
    async fn test_update_row_records_each_change() {
        let service = service().await;

        let update = service
            .update_row(
                TOKEN,
                "staff",
                "2",
                &changes(&[("name", Some("Ann")), ("dept", Some("hr"))]),
            )
            .await
            .unwrap();
        assert_eq!(update.changes.len(), 1);
        assert_eq!(update.changes[0].old, None);
        assert_eq!(update.message(), "Row updated successfully");

        let rows = service.read_table("staff").await.unwrap();
        assert_eq!(rows[1]["dept"].as_deref(), Some("hr"));

        service.audit().flush().await;
        let records = service.audit_entries(Some("staff")).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].description, "Updated dept in row 2 from NULL to hr");
        assert_eq!(records[0].column, "dept");
        assert_eq!(records[0].row_id, "2");
        assert_eq!(records[0].actor, "alice");
    }

    #[tokio::test]
    async fn test_update_row_noop_and_failures() {
        let service = service().await;

        let update = service
            .update_row(TOKEN, "staff", "1", &changes(&[("name", Some("Bob"))]))
            .await
            .unwrap();
        assert_eq!(update.message(), "No changes detected");

        let err = service
            .update_row(TOKEN, "staff", "9", &changes(&[("name", Some("X"))]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = service
            .update_row(TOKEN, "staff", "1", &changes(&[("salary", Some("1"))]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownColumn);
    }

    #[tokio::test]
    async fn test_add_and_rename_column() {
        let service = service().await;

        let added = service.add_column(TOKEN, "staff", "Start Date").await.unwrap();
        assert_eq!(added, "Start_Date");
        let err = service.add_column(TOKEN, "staff", "start date").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidIdentifier);
        let err = service.add_column(TOKEN, "staff", "???").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidIdentifier);

        let renamed = service
            .rename_column(TOKEN, "staff", "dept", "team name")
            .await
            .unwrap();
        assert_eq!(renamed, "team_name");
        let err = service
            .rename_column(TOKEN, "staff", "dept", "other")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownColumn);
        let err = service
            .rename_column(TOKEN, "staff", "name", "team name")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidIdentifier);

        service.audit().flush().await;
        let records = service.audit_entries(Some("staff")).await.unwrap();
        let last = records.last().unwrap();
        assert_eq!(last.column, "dept to team_name");
        assert_eq!(last.description, "Renamed column dept to team_name");
    }

    #[tokio::test]
    async fn test_delete_table() {
        let service = service().await;

        service.delete_table(TOKEN, "staff").await.unwrap();
        assert!(service.list_tables().await.unwrap().is_empty());
        let err = service.delete_table(TOKEN, "staff").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        service.audit().flush().await;
        let records = service.audit_entries(None).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].description, "Deleted table staff");
        assert_eq!(records[0].column, ALL);
    }

    #[tokio::test]
    async fn test_ingest_names_table_after_file() {
        let service = service().await;

        let report = service
            .ingest(TOKEN, "Q1 Sales.CSV", "Region,Total\nnorth,10\n".as_bytes())
            .await
            .unwrap();
        assert_eq!(report.table, "q1_sales");
        assert_eq!(service.list_tables().await.unwrap(), vec!["q1_sales", "staff"]);

        let err = service
            .ingest(TOKEN, "audit_log.csv", "a\n1\n".as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ReservedTable(_)));
    }

    #[tokio::test]
    async fn test_preview_save_in_mysql() {
        let service = service().await;
        let state: DesiredState =
            serde_json::from_str(r#"{"rows": [], "column_order": ["name", "id"]}"#).unwrap();

        let preview = service
            .preview_save("staff", &state, &MySqlDialect::new(500))
            .await
            .unwrap();
        assert_eq!(preview.dialect, "mysql");
        assert_eq!(
            preview.statements,
            vec![
                "ALTER TABLE `staff` DROP COLUMN `dept`",
                "ALTER TABLE `staff` MODIFY COLUMN `name` VARCHAR(500) FIRST",
                "ALTER TABLE `staff` MODIFY COLUMN `id` VARCHAR(500) AFTER `name`",
                "DELETE FROM `staff`",
            ]
        );
        assert_eq!(preview.columns, vec!["name", "id"]);

        let rows = service.read_table("staff").await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_mutations_require_credential() {
        let service = service().await;

        for credential in [None, Some(""), Some("wrong")] {
            let err = service
                .add_column(credential, "staff", "x")
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Unauthorized);
        }
        assert_eq!(service.read_table("staff").await.unwrap()[0].len(), 3);
    }
}
