//! Client-submitted desired table state.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};

use crate::error::Result;
use crate::ident::{sanitize_all, Identifier};
use crate::rows::Row;

/// The full state a client wants a table to be in after a save.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DesiredState {
    /// Every row the table should contain, in order.
    #[serde(default, alias = "data", deserialize_with = "deserialize_rows")]
    pub rows: Vec<Row>,
    /// Desired column order. When present it is authoritative: columns
    /// missing from it are dropped and row keys outside it are ignored.
    #[serde(default, alias = "columnOrder")]
    pub column_order: Option<Vec<String>>,
}

/// Where a target column set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnSource {
    /// Supplied explicitly as `column_order`.
    Explicit,
    /// Inferred from the keys of the first row, in key order.
    FirstRow,
    /// No order and no rows: nothing to infer.
    Empty,
}

/// The column set a save reconciles the table towards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetColumns {
    /// Target columns, in order.
    pub columns: Vec<Identifier>,
    /// How the columns were determined.
    pub source: ColumnSource,
}

impl TargetColumns {
    /// A target given explicitly by the client.
    #[must_use]
    pub fn explicit(columns: Vec<Identifier>) -> Self {
        Self {
            columns,
            source: ColumnSource::Explicit,
        }
    }

    /// A target inferred from the first row's keys.
    #[must_use]
    pub fn first_row(columns: Vec<Identifier>) -> Self {
        Self {
            columns,
            source: ColumnSource::FirstRow,
        }
    }

    /// An empty target: no structural change is attempted.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            source: ColumnSource::Empty,
        }
    }

    /// Returns true if there are no target columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns true if the target order should be enforced on the table.
    #[must_use]
    pub fn enforces_order(&self) -> bool {
        self.source == ColumnSource::Explicit
    }
}

impl DesiredState {
    /// Creates a desired state from rows and an optional column order.
    #[must_use]
    pub fn new(rows: Vec<Row>, column_order: Option<Vec<String>>) -> Self {
        Self { rows, column_order }
    }

    /// Computes the target column set.
    ///
    /// An explicit `column_order` wins; otherwise the first row's keys
    /// define the columns, in key order. With neither, the target is
    /// empty. Names are sanitized and must be unique.
    pub fn target_columns(&self) -> Result<TargetColumns> {
        if let Some(order) = &self.column_order {
            let columns = sanitize_all(order.iter().map(String::as_str))?;
            return Ok(TargetColumns::explicit(columns));
        }
        match self.rows.first() {
            Some(first) => {
                let columns = sanitize_all(first.keys().map(String::as_str))?;
                Ok(TargetColumns::first_row(columns))
            }
            None => Ok(TargetColumns::empty()),
        }
    }
}

/// A cell as a front end may send it. Everything is stored as text.
#[derive(Deserialize)]
#[serde(untagged)]
enum Cell {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl Cell {
    fn into_text(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }
}

fn deserialize_rows<'de, D>(deserializer: D) -> std::result::Result<Vec<Row>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<IndexMap<String, Option<Cell>>> = Vec::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|(key, cell)| (key, cell.map(Cell::into_text)))
                .collect()
        })
        .collect())
}
