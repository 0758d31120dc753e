//! Transactional save, schema reconciliation and audit trail for
//! spreadsheet-backed SQLite tables.
//!
//! `sheetsync` keeps tables whose columns come from uploaded spreadsheets
//! in step with a front end that edits them:
//! - Tables are created from CSV uploads (the **ingestion pipeline**)
//! - A full-table **save** drops, reorders and refills a table in one
//!   transaction, or changes nothing
//! - Row updates and column operations are short transactions of their own
//! - Every successful change lands in an append-only **audit trail**
//!
//! # Architecture
//!
//! - **Registry** - Read-only view of the live catalog
//! - **Dialect** - Engine-specific SQL for each operation
//! - **Synchronizer** - The transactional full-table save
//! - **Ingestor** - Table creation from decoded rows
//! - **Audit** - Background writer for the audit table
//! - **Identity** - Credential to actor resolution
//! - **Service** - The facade tying the above together
//!
//! The storage-free parts (identifier sanitizing, planning, row
//! normalization) live in `sheetsync-core` and are re-exported here.
//!
//! # Example
//!
//! ```rust,ignore
//! use sheetsync::prelude::*;
//! use sqlx::sqlite::SqlitePoolOptions;
//!
//! let pool = SqlitePoolOptions::new().connect("sqlite:sheets.db").await?;
//! let tokens = StaticTokens::new().with_token("s3cret", "alice");
//! let service = TableService::new(pool, tokens, ServiceConfig::default()).await?;
//!
//! let state: DesiredState = serde_json::from_str(
//!     r#"{"rows": [{"id": "1", "name": "Carol"}], "column_order": ["name", "id"]}"#,
//! )?;
//! let report = service.save(Some("s3cret"), "staff", &state).await?;
//! println!("{}", report.message);
//! ```

pub mod audit;
pub mod config;
pub mod dialect;
pub mod error;
pub mod identity;
pub mod ingest;
pub mod registry;
pub mod service;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use sheetsync_core as core;

pub use audit::{AuditEntry, AuditLog, AuditRecord};
pub use config::ServiceConfig;
pub use dialect::{render_plan, MySqlDialect, SqliteDialect, StorageDialect};
pub use error::{Error, ErrorKind, Result, SyncStage};
pub use identity::{Actor, IdentityResolver, IssuedToken, StaticTokens, TokenStore};
pub use ingest::{CsvRowStream, IngestReport, Ingestor, RawRow};
pub use registry::{ColumnInfo, TableLayout, TableRegistry};
pub use service::{ColumnChange, RowUpdate, SavePreview, TableService};
pub use sync::{SyncReport, Synchronizer};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::audit::{AuditEntry, AuditLog, AuditRecord};
    pub use crate::config::ServiceConfig;
    pub use crate::dialect::{MySqlDialect, SqliteDialect, StorageDialect};
    pub use crate::error::{Error, ErrorKind, Result, SyncStage};
    pub use crate::identity::{Actor, IdentityResolver, StaticTokens, TokenStore};
    pub use crate::ingest::{CsvRowStream, IngestReport};
    pub use crate::service::{RowUpdate, TableService};
    pub use crate::sync::SyncReport;
    pub use sheetsync_core::{DesiredState, Identifier, Row};
}
