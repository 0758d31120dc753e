//! Column model.

use serde::Serialize;

use crate::ident::Identifier;

/// A column of a live table, as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    /// Column name.
    pub name: Identifier,
    /// 0-based ordinal position.
    pub position: usize,
    /// Declared maximum length of the text type, if the catalog has one.
    pub max_length: Option<usize>,
}

impl Column {
    /// Creates a new column.
    #[must_use]
    pub fn new(name: Identifier, position: usize, max_length: Option<usize>) -> Self {
        Self {
            name,
            position,
            max_length,
        }
    }
}

/// Extracts the length from a declared type such as `VARCHAR(500)`.
///
/// Returns `None` for types without a single length argument.
#[must_use]
pub fn declared_length(declared_type: &str) -> Option<usize> {
    let open = declared_type.find('(')?;
    let close = declared_type[open..].find(')')? + open;
    declared_type[open + 1..close].trim().parse().ok()
}
