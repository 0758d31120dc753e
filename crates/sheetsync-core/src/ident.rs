//! Schema identifier sanitizing.
//!
//! Table and column names in this system come from untrusted free text:
//! uploaded file names, spreadsheet headers and labels typed into a
//! front end. [`sanitize`] turns such text into a string that only
//! contains `[A-Za-z0-9_]` and never starts with a digit, and
//! [`Identifier`] is the only type the storage layer accepts as a name.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Serialize, Serializer};

use crate::error::{CoreError, Result};

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static pattern"));

static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_]").expect("static pattern"));

/// Normalizes free text into identifier form.
///
/// Runs of whitespace become a single `_`, `.` becomes `_`, every other
/// character outside `[A-Za-z0-9_]` is removed and a leading digit gets
/// a `_` prefix. The function is pure and idempotent. An input with no
/// usable characters yields the empty string, which callers must reject.
///
/// ```
/// use sheetsync_core::sanitize;
///
/// assert_eq!(sanitize("Employee Name"), "Employee_Name");
/// assert_eq!(sanitize("2024data"), "_2024data");
/// assert_eq!(sanitize("unit.price ($)"), "unit_price_");
/// assert_eq!(sanitize(""), "");
/// ```
#[must_use]
pub fn sanitize(raw: &str) -> String {
    let spaced = WHITESPACE_RUN.replace_all(raw, "_");
    let dotted = spaced.replace('.', "_");
    let cleaned = DISALLOWED.replace_all(&dotted, "");
    if cleaned.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{cleaned}")
    } else {
        cleaned.into_owned()
    }
}

/// A validated schema identifier.
///
/// Values are guaranteed to be non-empty and already in the form
/// produced by [`sanitize`], which makes them safe to quote into SQL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(String);

impl Identifier {
    /// Sanitizes free text into an identifier.
    ///
    /// Fails with [`CoreError::InvalidIdentifier`] when nothing usable is
    /// left after sanitizing.
    pub fn sanitize(raw: &str) -> Result<Self> {
        let name = sanitize(raw);
        if name.is_empty() {
            return Err(CoreError::InvalidIdentifier(raw.to_string()));
        }
        Ok(Self(name))
    }

    /// Accepts a name that must already be in sanitized form.
    ///
    /// Used for names that refer to existing objects (path segments,
    /// catalog entries), where silently rewriting the name would point
    /// at a different table or column.
    pub fn parse(name: &str) -> Result<Self> {
        if name.is_empty() || sanitize(name) != name {
            return Err(CoreError::InvalidIdentifier(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a lowercased copy.
    #[must_use]
    pub fn to_lowercase(&self) -> Self {
        Self(self.0.to_ascii_lowercase())
    }

    /// Consumes the identifier, returning the inner string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Identifier {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Identifier {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Sanitizes a list of labels, rejecting empty results and duplicates.
pub fn sanitize_all<'a, I>(labels: I) -> Result<Vec<Identifier>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out: Vec<Identifier> = Vec::new();
    for label in labels {
        let ident = Identifier::sanitize(label)?;
        if out.contains(&ident) {
            return Err(CoreError::DuplicateIdentifier(ident.into_string()));
        }
        out.push(ident);
    }
    Ok(out)
}
