//! Service configuration.

use std::path::Path;

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::dialect::REBUILD_PREFIX;
use crate::error::Result;

/// Tunables shared by every component.
///
/// Every field has a default, so a config file only needs the values it
/// overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Name of the audit log table.
    pub audit_table: String,
    /// Name of the API token table.
    pub token_table: String,
    /// Declared width of columns created by ingestion.
    pub ingest_column_width: usize,
    /// Ingested values are truncated to this many characters.
    pub ingest_value_limit: usize,
    /// Declared width of columns added by `add_column`.
    pub added_column_width: usize,
    /// Width a dialect declares when it must re-declare a moved column.
    pub reorder_column_width: usize,
    /// Upper bound on bound parameters in one bulk `INSERT`.
    pub insert_batch_params: usize,
    /// Offset from UTC, in minutes, that audit timestamps are written in.
    pub audit_utc_offset_minutes: i32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            audit_table: "audit_log".to_string(),
            token_table: "api_tokens".to_string(),
            ingest_column_width: 500,
            ingest_value_limit: 255,
            added_column_width: 255,
            reorder_column_width: 500,
            insert_batch_params: 999,
            audit_utc_offset_minutes: 0,
        }
    }
}

impl ServiceConfig {
    /// Loads a config from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Returns the fixed offset audit timestamps use.
    ///
    /// Out-of-range offsets fall back to UTC.
    #[must_use]
    pub fn audit_offset(&self) -> FixedOffset {
        self.audit_utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }

    /// Returns true if `table` is owned by the service itself.
    ///
    /// SQLite resolves table names case-insensitively, so the comparison
    /// is too.
    #[must_use]
    pub fn is_reserved(&self, table: &str) -> bool {
        table.eq_ignore_ascii_case(&self.audit_table)
            || table.eq_ignore_ascii_case(&self.token_table)
            || table
                .get(..REBUILD_PREFIX.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(REBUILD_PREFIX))
    }
}
