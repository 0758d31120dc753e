//! Error types for storage-backed operations.

use std::fmt;

use sheetsync_core::CoreError;

/// The step of a full-table save that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    /// Opening the transaction.
    Begin,
    /// Reading the live column list.
    Describe,
    /// Computing the target columns and the change plan.
    Plan,
    /// Dropping columns.
    DropColumns,
    /// Reordering columns.
    ReorderColumns,
    /// Deleting every existing row.
    DeleteRows,
    /// Normalizing and inserting the new rows.
    InsertRows,
    /// Committing.
    Commit,
}

impl SyncStage {
    /// Returns the stage name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Begin => "begin",
            Self::Describe => "describe",
            Self::Plan => "plan",
            Self::DropColumns => "drop columns",
            Self::ReorderColumns => "reorder columns",
            Self::DeleteRows => "delete rows",
            Self::InsertRows => "insert rows",
            Self::Commit => "commit",
        }
    }
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification of an [`Error`], stable for callers to match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid credential.
    Unauthorized,
    /// A name sanitized to nothing, collides, or is reserved.
    InvalidIdentifier,
    /// A referenced column does not exist.
    UnknownColumn,
    /// Rows were supplied without any target column.
    ColumnMismatch,
    /// The table or row does not exist.
    NotFound,
    /// The catalog could not be read.
    CatalogUnavailable,
    /// The engine rejected a statement.
    StorageFailure,
    /// Ingestion input had no rows.
    EmptyInput,
    /// The input could not be decoded.
    InvalidInput,
}

/// Errors returned by the storage layer and the service facade.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The credential was missing or could not be resolved.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Validation or planning failed before touching storage.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The table is owned by this service and cannot be changed through it.
    #[error("table {0} is reserved")]
    ReservedTable(String),

    /// The table does not exist.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// No row has the given primary key value.
    #[error("row {row_id} not found in {table}")]
    RowNotFound {
        /// Table name.
        table: String,
        /// Primary key value.
        row_id: String,
    },

    /// Reading the catalog failed.
    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(#[source] sqlx::Error),

    /// A statement failed.
    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),

    /// The input stream yielded no rows.
    #[error("input contained no rows")]
    EmptyInput,

    /// CSV decoding failed.
    #[error("could not decode CSV: {0}")]
    Decode(#[from] csv::Error),

    /// JSON decoding failed.
    #[error("could not decode JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A full-table save failed and was rolled back.
    #[error("save failed during {stage}: {source}")]
    SyncFailed {
        /// The step that failed.
        stage: SyncStage,
        /// What went wrong.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wraps an error with the save stage it happened in.
    #[must_use]
    pub fn at_stage(self, stage: SyncStage) -> Self {
        match self {
            already @ Self::SyncFailed { .. } => already,
            other => Self::SyncFailed {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Returns the failing save stage, if this is a save failure.
    #[must_use]
    pub fn stage(&self) -> Option<SyncStage> {
        match self {
            Self::SyncFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Classifies the error. Save failures report the kind of their cause.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Core(CoreError::InvalidIdentifier(_) | CoreError::DuplicateIdentifier(_))
            | Self::ReservedTable(_) => ErrorKind::InvalidIdentifier,
            Self::Core(CoreError::UnknownColumn(_)) => ErrorKind::UnknownColumn,
            Self::Core(CoreError::ColumnMismatch { .. }) => ErrorKind::ColumnMismatch,
            Self::TableNotFound(_) | Self::RowNotFound { .. } => ErrorKind::NotFound,
            Self::CatalogUnavailable(_) => ErrorKind::CatalogUnavailable,
            Self::Storage(_) | Self::Io(_) => ErrorKind::StorageFailure,
            Self::EmptyInput => ErrorKind::EmptyInput,
            Self::Decode(_) | Self::Json(_) => ErrorKind::InvalidInput,
            Self::SyncFailed { source, .. } => source.kind(),
        }
    }
}

/// Result type alias for storage-backed operations.
pub type Result<T> = std::result::Result<T, Error>;
