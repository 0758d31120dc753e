//! Ingestion pipeline.
//!
//! Creates a table from a stream of decoded rows: the first row's keys
//! become the columns, every row is inserted. The whole ingestion runs
//! in one transaction.

use std::io::Read;
use std::path::Path;

use indexmap::IndexMap;
use serde::Serialize;
use sheetsync_core::{
    normalize_with, rows_per_statement, sanitize_all, Identifier, NormalizeOptions, Row,
};
use sqlx::sqlite::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::config::ServiceConfig;
use crate::dialect::{SqliteDialect, StorageDialect};
use crate::error::{Error, Result};
use crate::sync::insert_rows;

/// One decoded input row: header to cell text, in header order.
pub type RawRow = IndexMap<String, String>;

/// Lazily decodes CSV records into [`RawRow`]s keyed by the header row.
///
/// Short records yield only the fields present; the missing columns end
/// up null after normalization.
pub struct CsvRowStream<R: Read> {
    reader: csv::Reader<R>,
    headers: csv::StringRecord,
}

impl<R: Read> CsvRowStream<R> {
    /// Reads the header row and prepares to stream records.
    pub fn new(input: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(input);
        let headers = reader.headers()?.clone();
        Ok(Self { reader, headers })
    }

    /// Returns the header row.
    #[must_use]
    pub fn headers(&self) -> &csv::StringRecord {
        &self.headers
    }
}

impl<R: Read> Iterator for CsvRowStream<R> {
    type Item = Result<RawRow>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut record = csv::StringRecord::new();
        match self.reader.read_record(&mut record) {
            Ok(true) => Some(Ok(self
                .headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect())),
            Ok(false) => None,
            Err(err) => Some(Err(err.into())),
        }
    }
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Table the rows went into.
    pub table: Identifier,
    /// Columns, from the first row.
    pub columns: Vec<Identifier>,
    /// Rows inserted.
    pub rows: u64,
}

/// Creates tables from decoded row streams.
#[derive(Debug, Clone)]
pub struct Ingestor {
    pool: SqlitePool,
    dialect: SqliteDialect,
    column_width: usize,
    value_limit: usize,
    batch_params: usize,
}

impl Ingestor {
    /// Creates an ingestor over the given pool.
    #[must_use]
    pub fn new(pool: SqlitePool, config: &ServiceConfig) -> Self {
        Self {
            pool,
            dialect: SqliteDialect::new(),
            column_width: config.ingest_column_width,
            value_limit: config.ingest_value_limit,
            batch_params: config.insert_batch_params,
        }
    }

    /// Derives a table name from an upload name: extension stripped,
    /// sanitized, lowercased.
    pub fn table_name(hint: &str) -> Result<Identifier> {
        let stem = Path::new(hint)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(hint);
        Ok(Identifier::sanitize(stem)?.to_lowercase())
    }

    /// Creates the table named by `hint` if absent and inserts every row.
    ///
    /// Fails with [`Error::EmptyInput`] before touching storage when the
    /// stream has no rows.
    pub async fn ingest<I>(&self, hint: &str, rows: I) -> Result<IngestReport>
    where
        I: IntoIterator<Item = Result<RawRow>>,
    {
        let table = Self::table_name(hint)?;
        self.ingest_into(&table, rows).await
    }

    /// Like [`Ingestor::ingest`] with an already derived table name.
    pub async fn ingest_into<I>(&self, table: &Identifier, rows: I) -> Result<IngestReport>
    where
        I: IntoIterator<Item = Result<RawRow>>,
    {
        let mut rows = rows.into_iter();
        let first = rows.next().ok_or(Error::EmptyInput)??;
        let columns = sanitize_all(first.keys().map(String::as_str))?;

        let mut tx = self.pool.begin().await?;
        let create = self
            .dialect
            .create_table_sql(table, &columns, self.column_width, true);
        debug!(sql = %create, "Executing");
        sqlx::query(&create).execute(&mut *tx).await?;

        let per_statement = rows_per_statement(columns.len(), self.batch_params);
        let mut batch = vec![to_row(first)];
        let mut inserted = 0;
        for raw in rows {
            batch.push(to_row(raw?));
            if batch.len() >= per_statement {
                inserted += self.flush(&mut tx, table, &columns, &mut batch).await?;
            }
        }
        inserted += self.flush(&mut tx, table, &columns, &mut batch).await?;

        tx.commit().await?;
        info!(table = %table, columns = columns.len(), rows = inserted, "Ingested table");

        Ok(IngestReport {
            table: table.clone(),
            columns,
            rows: inserted,
        })
    }

    async fn flush(
        &self,
        conn: &mut SqliteConnection,
        table: &Identifier,
        columns: &[Identifier],
        batch: &mut Vec<Row>,
    ) -> Result<u64> {
        let rows = normalize_with(batch, columns, NormalizeOptions::truncate_to(self.value_limit))?;
        batch.clear();
        insert_rows(conn, &self.dialect, table, columns, &rows, self.batch_params).await
    }
}

fn to_row(raw: RawRow) -> Row {
    raw.into_iter().map(|(k, v)| (k, Some(v))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::registry::TableRegistry;
    use crate::testing::memory_pool;

    const STAFF_CSV: &str = "Employee Name,unit.price,2024 total\nBob,1.5,10\nAnn,,\nEve,3\n";

    #[test]
    fn test_table_name_from_upload() {
        assert_eq!(Ingestor::table_name("Staff List.csv").unwrap(), "staff_list");
        assert_eq!(Ingestor::table_name("2024.sales.csv").unwrap(), "_2024_sales");
        assert!(Ingestor::table_name("!!!.csv").is_err());
    }

    #[test]
    fn test_csv_stream_is_keyed_by_header() {
        let rows: Vec<RawRow> = CsvRowStream::new(STAFF_CSV.as_bytes())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["Employee Name"], "Bob");
        assert_eq!(rows[1]["unit.price"], "");
        assert_eq!(rows[2].len(), 2);
    }

    #[tokio::test]
    async fn test_ingest_creates_and_fills_table() {
        let pool = memory_pool().await;
        let ingestor = Ingestor::new(pool.clone(), &ServiceConfig::default());

        let stream = CsvRowStream::new(STAFF_CSV.as_bytes()).unwrap();
        let report = ingestor.ingest("Staff.csv", stream).await.unwrap();
        assert_eq!(report.table, "staff");
        assert_eq!(report.columns, vec!["Employee_Name", "unit_price", "_2024_total"]);
        assert_eq!(report.rows, 3);

        let registry = TableRegistry::new(pool);
        let layout = registry.describe(&report.table).await.unwrap();
        assert!(layout.columns.iter().all(|c| c.column.max_length == Some(500)));

        let rows = registry.read_rows(&report.table).await.unwrap();
        assert_eq!(rows[1]["unit_price"], None);
        assert_eq!(rows[2]["_2024_total"], None);
    }

    #[tokio::test]
    async fn test_ingest_truncates_values() {
        let pool = memory_pool().await;
        let config = ServiceConfig {
            ingest_value_limit: 4,
            ..ServiceConfig::default()
        };
        let ingestor = Ingestor::new(pool.clone(), &config);

        let input = "name\nBartholomew\n";
        let report = ingestor
            .ingest("people", CsvRowStream::new(input.as_bytes()).unwrap())
            .await
            .unwrap();
        let rows = TableRegistry::new(pool).read_rows(&report.table).await.unwrap();
        assert_eq!(rows[0]["name"].as_deref(), Some("Bart"));
    }

    #[tokio::test]
    async fn test_empty_input_creates_nothing() {
        let pool = memory_pool().await;
        let ingestor = Ingestor::new(pool.clone(), &ServiceConfig::default());

        let err = ingestor
            .ingest("empty.csv", CsvRowStream::new("a,b\n".as_bytes()).unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyInput);
        assert!(TableRegistry::new(pool).list_tables().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_decode_error_rolls_back() {
        let pool = memory_pool().await;
        let ingestor = Ingestor::new(pool.clone(), &ServiceConfig::default());

        let rows = vec![
            Ok(RawRow::from([("a".to_string(), "1".to_string())])),
            Err(Error::EmptyInput),
        ];
        assert!(ingestor.ingest("broken", rows).await.is_err());
        assert!(TableRegistry::new(pool).list_tables().await.unwrap().is_empty());
    }
}
