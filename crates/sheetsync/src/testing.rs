//! Test helpers.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// Opens a single-connection in-memory database that lives as long as
/// the pool.
pub async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}
