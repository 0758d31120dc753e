#![allow(dead_code)]

use sheetsync::prelude::*;
use sheetsync::TableRegistry;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub const TOKEN: Option<&str> = Some("editor-token");

pub async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

pub async fn exec(pool: &SqlitePool, sql: &str) {
    sqlx::query(sql)
        .execute(pool)
        .await
        .unwrap_or_else(|e| panic!("Failed to execute: {sql}\nError: {e:?}"));
}

/// A service over a fresh database where `ddl` creates table `t`, seeded
/// with the row `(1, Bob)`.
pub async fn service_with_table(ddl: &str) -> (TableService<StaticTokens>, SqlitePool) {
    let pool = memory_pool().await;
    exec(&pool, ddl).await;
    exec(&pool, r#"INSERT INTO "t" ("id", "name") VALUES ('1', 'Bob')"#).await;

    let tokens = StaticTokens::new().with_token("editor-token", "alice");
    let service = TableService::new(pool.clone(), tokens, ServiceConfig::default())
        .await
        .unwrap();
    (service, pool)
}

pub async fn simple_service() -> (TableService<StaticTokens>, SqlitePool) {
    service_with_table(r#"CREATE TABLE "t" ("id" VARCHAR(500), "name" VARCHAR(500))"#).await
}

pub fn state(json: &str) -> DesiredState {
    serde_json::from_str(json).unwrap_or_else(|e| panic!("Bad state: {json}\nError: {e:?}"))
}

pub async fn layout(pool: &SqlitePool, table: &str) -> Vec<String> {
    TableRegistry::new(pool.clone())
        .describe(&Identifier::parse(table).unwrap())
        .await
        .unwrap()
        .names()
        .into_iter()
        .map(Identifier::into_string)
        .collect()
}
