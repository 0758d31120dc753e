//! Identity resolution.
//!
//! Every mutating operation starts by resolving the caller's credential
//! to an [`Actor`]. Resolution is pluggable through [`IdentityResolver`];
//! two resolvers ship with the crate: a fixed token map and a token
//! table with expiry.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use sheetsync_core::Identifier;
use sqlx::sqlite::SqlitePool;
use tracing::debug;

use crate::config::ServiceConfig;
use crate::dialect::quote_identifier;
use crate::error::{Error, Result};

/// The authenticated party behind a request. Its name is what the audit
/// trail records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Actor(String);

impl Actor {
    /// Creates an actor with the given display name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolves an opaque credential to an actor.
///
/// Implementations return [`Error::Unauthorized`] for credentials they
/// do not recognize.
pub trait IdentityResolver: Send + Sync {
    /// Resolves `credential`.
    fn resolve<'a>(&'a self, credential: &'a str) -> BoxFuture<'a, Result<Actor>>;
}

impl<R: IdentityResolver + ?Sized> IdentityResolver for Box<R> {
    fn resolve<'a>(&'a self, credential: &'a str) -> BoxFuture<'a, Result<Actor>> {
        (**self).resolve(credential)
    }
}

/// A fixed map from token to actor name.
#[derive(Debug, Clone, Default)]
pub struct StaticTokens {
    tokens: HashMap<String, String>,
}

impl StaticTokens {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, actor: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), actor.into());
        self
    }

    /// Loads a JSON object of `{"token": "actor name"}` pairs.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self {
            tokens: serde_json::from_str(&text)?,
        })
    }
}

impl IdentityResolver for StaticTokens {
    fn resolve<'a>(&'a self, credential: &'a str) -> BoxFuture<'a, Result<Actor>> {
        Box::pin(async move {
            self.tokens
                .get(credential)
                .map(Actor::new)
                .ok_or_else(|| Error::Unauthorized("invalid token".to_string()))
        })
    }
}

/// A freshly issued API token.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    /// The secret to present as credential.
    pub token: String,
    /// Who the token identifies.
    pub actor: Actor,
    /// When the token stops resolving.
    pub expires_at: DateTime<Utc>,
}

/// API tokens stored in a table, each with an expiry.
#[derive(Debug, Clone)]
pub struct TokenStore {
    pool: SqlitePool,
    table: Identifier,
}

impl TokenStore {
    /// Default token lifetime (2 weeks).
    pub const DEFAULT_EXPIRY_DAYS: i64 = 14;

    /// Creates a store over the configured token table.
    pub fn new(pool: SqlitePool, config: &ServiceConfig) -> Result<Self> {
        Ok(Self {
            pool,
            table: Identifier::parse(&config.token_table)?,
        })
    }

    fn quoted_table(&self) -> String {
        quote_identifier(self.table.as_str())
    }

    /// Creates the token table if it doesn't exist.
    pub async fn ensure_table(&self) -> Result<()> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (token VARCHAR(64) PRIMARY KEY, display_name TEXT NOT NULL, created_at TEXT NOT NULL, expires_at TEXT NOT NULL)",
            self.quoted_table()
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Issues a token for `actor` valid for `days` days.
    pub async fn issue(&self, actor: &str, days: i64) -> Result<IssuedToken> {
        let now = Utc::now();
        let expires_at = now + Duration::days(days);
        let token = generate_token();

        sqlx::query(&format!(
            "INSERT INTO {} (token, display_name, created_at, expires_at) VALUES (?, ?, ?, ?)",
            self.quoted_table()
        ))
        .bind(&token)
        .bind(actor)
        .bind(encode_time(now))
        .bind(encode_time(expires_at))
        .execute(&self.pool)
        .await?;

        debug!(actor, expires_at = %expires_at, "Issued API token");
        Ok(IssuedToken {
            token,
            actor: Actor::new(actor),
            expires_at,
        })
    }

    /// Revokes a token. Returns false if it did not exist.
    pub async fn revoke(&self, token: &str) -> Result<bool> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE token = ?", self.quoted_table()))
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deletes expired tokens, returning how many were removed.
    pub async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE expires_at <= ?",
            self.quoted_table()
        ))
        .bind(encode_time(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

impl IdentityResolver for TokenStore {
    fn resolve<'a>(&'a self, credential: &'a str) -> BoxFuture<'a, Result<Actor>> {
        Box::pin(async move {
            let row: Option<(String,)> = sqlx::query_as(&format!(
                "SELECT display_name FROM {} WHERE token = ? AND expires_at > ?",
                self.quoted_table()
            ))
            .bind(credential)
            .bind(encode_time(Utc::now()))
            .fetch_optional(&self.pool)
            .await?;

            row.map(|(name,)| Actor::new(name))
                .ok_or_else(|| Error::Unauthorized("invalid or expired token".to_string()))
        })
    }
}

/// Fixed-width UTC encoding so stored timestamps compare as text.
fn encode_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Generates a random 64 character hex token.
fn generate_token() -> String {
    use rand::RngExt;
    let mut rng = rand::rng();
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes);
    hex::encode(&bytes)
}

mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::memory_pool;

    #[tokio::test]
    async fn test_static_tokens() {
        let tokens = StaticTokens::new().with_token("s3cret", "alice");

        assert_eq!(tokens.resolve("s3cret").await.unwrap().name(), "alice");
        let err = tokens.resolve("nope").await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_static_tokens_from_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"abc": "bob", "def": "carol"}}"#).unwrap();

        let tokens = StaticTokens::from_file(file.path()).unwrap();
        assert_eq!(tokens.resolve("def").await.unwrap(), Actor::new("carol"));
    }

    #[tokio::test]
    async fn test_issue_resolve_revoke() {
        let pool = memory_pool().await;
        let store = TokenStore::new(pool, &ServiceConfig::default()).unwrap();
        store.ensure_table().await.unwrap();

        let issued = store.issue("alice", TokenStore::DEFAULT_EXPIRY_DAYS).await.unwrap();
        assert_eq!(issued.token.len(), 64);
        assert_eq!(store.resolve(&issued.token).await.unwrap().name(), "alice");

        assert!(store.revoke(&issued.token).await.unwrap());
        assert!(!store.revoke(&issued.token).await.unwrap());
        assert!(store.resolve(&issued.token).await.is_err());
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected_and_purged() {
        let pool = memory_pool().await;
        let store = TokenStore::new(pool, &ServiceConfig::default()).unwrap();
        store.ensure_table().await.unwrap();

        let expired = store.issue("bob", -1).await.unwrap();
        let live = store.issue("carol", 1).await.unwrap();

        let err = store.resolve(&expired.token).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.resolve(&live.token).await.unwrap().name(), "carol");
    }

    #[test]
    fn test_generated_tokens_differ() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
