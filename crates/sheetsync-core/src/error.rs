//! Error types for the planning layer.

use thiserror::Error;

/// Errors raised while validating identifiers or planning changes.
///
/// None of these touch storage: they are detected before any statement
/// is sent to the database.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The input sanitized to an empty identifier, or is not in
    /// sanitized form where one was required.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// Two inputs sanitized to the same identifier.
    #[error("duplicate identifier: {0}")]
    DuplicateIdentifier(String),

    /// A column referenced by a plan does not exist in the table.
    #[error("unknown column: {0}")]
    UnknownColumn(String),

    /// Rows were supplied without any column to store them in.
    #[error("{rows} row(s) supplied but the target column set is empty")]
    ColumnMismatch {
        /// Number of rows that could not be placed.
        rows: usize,
    },
}

/// Result type alias for planning operations.
pub type Result<T> = std::result::Result<T, CoreError>;
