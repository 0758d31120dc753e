//! Audit trail.
//!
//! Every successful mutation is appended to the audit table. Writes go
//! through a background task fed by a channel, so recording never blocks
//! or fails the operation that produced it: a failed write is logged
//! with `warn!` and dropped.

use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, Utc};
use serde::Serialize;
use sheetsync_core::Identifier;
use sqlx::sqlite::SqlitePool;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::config::ServiceConfig;
use crate::dialect::quote_identifier;
use crate::error::Result;
use crate::identity::Actor;

/// Marker for a change that spans every column or every row.
pub const ALL: &str = "ALL";

/// One change to be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    /// Who made the change.
    pub actor: String,
    /// Table the change applies to.
    pub table: String,
    /// Column the change applies to, or [`ALL`].
    pub column: String,
    /// Row the change applies to, or [`ALL`].
    pub row_id: String,
    /// Human readable description.
    pub description: String,
}

impl AuditEntry {
    /// Creates an entry covering every column and row of a table.
    #[must_use]
    pub fn new(actor: &Actor, table: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            actor: actor.name().to_string(),
            table: table.into(),
            column: ALL.to_string(),
            row_id: ALL.to_string(),
            description: description.into(),
        }
    }

    /// Narrows the entry to one column.
    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    /// Narrows the entry to one row.
    #[must_use]
    pub fn row(mut self, row_id: impl Into<String>) -> Self {
        self.row_id = row_id.into();
        self
    }
}

/// A stored audit record.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    /// Row id in the audit table.
    pub id: i64,
    /// When the change was recorded.
    pub timestamp: DateTime<FixedOffset>,
    /// Who made the change.
    pub actor: String,
    /// Table the change applies to.
    pub table: String,
    /// Column, or [`ALL`].
    pub column: String,
    /// Row, or [`ALL`].
    pub row_id: String,
    /// Human readable description.
    pub description: String,
}

#[derive(Debug)]
enum Command {
    Record(AuditEntry),
    Flush(oneshot::Sender<()>),
}

/// Handle to the audit table and its writer task.
#[derive(Debug)]
pub struct AuditLog {
    pool: SqlitePool,
    table: Identifier,
    sender: mpsc::UnboundedSender<Command>,
}

impl AuditLog {
    /// Creates the audit table if needed and starts the writer task.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn start(pool: SqlitePool, config: &ServiceConfig) -> Result<Self> {
        let table = Identifier::parse(&config.audit_table)?;
        sqlx::query(&create_table_sql(&table)).execute(&pool).await?;

        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(
            pool.clone(),
            table.clone(),
            config.audit_offset(),
            receiver,
        ));

        Ok(Self {
            pool,
            table,
            sender,
        })
    }

    /// Queues an entry. Never fails.
    pub fn record(&self, entry: AuditEntry) {
        if let Err(err) = self.sender.send(Command::Record(entry)) {
            warn!(entry = ?err.0, "Audit writer stopped, dropping record");
        }
    }

    /// Waits until every entry queued so far has been written or dropped.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.sender.send(Command::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    /// Reads stored records in the order they were written, optionally
    /// for one table.
    pub async fn entries(&self, table: Option<&str>) -> Result<Vec<AuditRecord>> {
        let mut sql = format!(
            "SELECT id, timestamp, admin_name, table_name, column_name, row_id, logs FROM {}",
            quote_identifier(self.table.as_str())
        );
        if table.is_some() {
            sql.push_str(" WHERE table_name = ?");
        }
        sql.push_str(" ORDER BY id");

        let mut query = sqlx::query_as::<_, (i64, String, String, String, String, String, String)>(&sql);
        if let Some(table) = table {
            query = query.bind(table);
        }
        let rows = query.fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, timestamp, actor, table, column, row_id, description)| AuditRecord {
                    id,
                    timestamp: parse_timestamp(&timestamp),
                    actor,
                    table,
                    column,
                    row_id,
                    description,
                },
            )
            .collect())
    }
}

fn create_table_sql(table: &Identifier) -> String {
    format!(
        r#"CREATE TABLE IF NOT EXISTS {} (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    admin_name TEXT NOT NULL,
    table_name TEXT NOT NULL,
    column_name TEXT NOT NULL,
    row_id TEXT NOT NULL,
    logs TEXT NOT NULL
)"#,
        quote_identifier(table.as_str())
    )
}

fn parse_timestamp(raw: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(raw).unwrap_or_else(|_| {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
            .map(|dt| dt.and_utc().fixed_offset())
            .unwrap_or_else(|_| DateTime::<Utc>::default().fixed_offset())
    })
}

async fn write_entry(
    pool: &SqlitePool,
    table: &Identifier,
    offset: FixedOffset,
    entry: &AuditEntry,
) -> Result<()> {
    let timestamp = Utc::now()
        .with_timezone(&offset)
        .to_rfc3339_opts(SecondsFormat::Micros, false);
    sqlx::query(&format!(
        "INSERT INTO {} (timestamp, admin_name, table_name, column_name, row_id, logs) VALUES (?, ?, ?, ?, ?, ?)",
        quote_identifier(table.as_str())
    ))
    .bind(timestamp)
    .bind(&entry.actor)
    .bind(&entry.table)
    .bind(&entry.column)
    .bind(&entry.row_id)
    .bind(&entry.description)
    .execute(pool)
    .await?;
    Ok(())
}

async fn write_loop(
    pool: SqlitePool,
    table: Identifier,
    offset: FixedOffset,
    mut receiver: mpsc::UnboundedReceiver<Command>,
) {
    while let Some(command) = receiver.recv().await {
        match command {
            Command::Record(entry) => match write_entry(&pool, &table, offset, &entry).await {
                Ok(()) => debug!(table = %entry.table, description = %entry.description, "Audit record written"),
                Err(err) => warn!(
                    error = %err,
                    table = %entry.table,
                    description = %entry.description,
                    "Failed to write audit record"
                ),
            },
            Command::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Audit writer stopped");
}
