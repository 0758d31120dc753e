//! Row replace planning.
//!
//! Rows arrive as `key -> value` mappings whose keys may not be in
//! identifier form yet. Planning aligns every row positionally to the
//! target column order so it can be bound into a bulk `INSERT`.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::error::{CoreError, Result};
use crate::ident::{sanitize, Identifier};

/// A row as submitted or stored: column name to text value or null.
pub type Row = IndexMap<String, Option<String>>;

/// A row aligned to a column order, ready to bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRow(pub Vec<Option<String>>);

impl NormalizedRow {
    /// Returns the values in column order.
    #[must_use]
    pub fn values(&self) -> &[Option<String>] {
        &self.0
    }
}

/// Options controlling value normalization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Truncate values to at most this many characters.
    pub max_chars: Option<usize>,
}

impl NormalizeOptions {
    /// Options that truncate values to `max_chars` characters.
    #[must_use]
    pub fn truncate_to(max_chars: usize) -> Self {
        Self {
            max_chars: Some(max_chars),
        }
    }
}

/// Normalizes a single value: missing, empty and whitespace-only
/// values all become null.
#[must_use]
pub fn normalize_value(value: Option<&str>) -> Option<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
}

/// Truncates a string to at most `max_chars` characters.
#[must_use]
pub fn truncate_chars(value: &str, max_chars: usize) -> &str {
    match value.char_indices().nth(max_chars) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

/// Aligns rows to `columns`, normalizing values.
///
/// See [`normalize_with`].
pub fn normalize(rows: &[Row], columns: &[Identifier]) -> Result<Vec<NormalizedRow>> {
    normalize_with(rows, columns, NormalizeOptions::default())
}

/// Aligns rows to `columns`, normalizing values.
///
/// Keys are matched after sanitizing, so a submitted key `unit.price`
/// fills column `unit_price`. Keys with no matching column are ignored.
/// Fails with [`CoreError::ColumnMismatch`] only when rows are supplied
/// but there are no columns to put them in.
pub fn normalize_with(
    rows: &[Row],
    columns: &[Identifier],
    options: NormalizeOptions,
) -> Result<Vec<NormalizedRow>> {
    if columns.is_empty() && !rows.is_empty() {
        return Err(CoreError::ColumnMismatch { rows: rows.len() });
    }

    Ok(rows
        .iter()
        .map(|row| {
            let by_column: HashMap<String, Option<&str>> = row
                .iter()
                .map(|(key, value)| (sanitize(key), value.as_deref()))
                .collect();

            NormalizedRow(
                columns
                    .iter()
                    .map(|col| {
                        let value = by_column.get(col.as_str()).copied().flatten();
                        let value = match options.max_chars {
                            Some(limit) => value.map(|v| truncate_chars(v, limit)),
                            None => value,
                        };
                        normalize_value(value)
                    })
                    .collect(),
            )
        })
        .collect())
}

/// Number of rows that fit in one `INSERT` given a bound-parameter cap.
#[must_use]
pub fn rows_per_statement(column_count: usize, max_params: usize) -> usize {
    if column_count == 0 {
        return 1;
    }
    (max_params / column_count).max(1)
}
