//! Connection pool setup and schema helpers.

use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;
use tracing::{Instrument, info, info_span};

pub const SCHEMA_SQL: &str = include_str!("../sql/schema.sql");
pub const SEED_SQL: &str = include_str!("../sql/seed.sql");

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_ACQUIRE_TIMEOUT_SECONDS: u64 = 5;

#[derive(Clone, Debug)]
pub struct PoolConfig {
    max_connections: u32,
    acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECONDS),
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    #[must_use]
    pub fn with_acquire_timeout(mut self, acquire_timeout: Duration) -> Self {
        self.acquire_timeout = acquire_timeout;
        self
    }
}

/// Connect a bounded pool. Callers wait up to the acquire timeout for a free
/// connection instead of failing fast.
///
/// # Errors
/// Returns an error if the database is unreachable.
pub async fn connect(dsn: &SecretString, config: &PoolConfig) -> Result<PgPool> {
    PgPoolOptions::new()
        .min_connections(1)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .max_lifetime(Duration::from_secs(60 * 30))
        .test_before_acquire(true)
        .connect(dsn.expose_secret())
        .await
        .context("Failed to connect to database")
}

/// Run every statement of an SQL script in order.
///
/// # Errors
/// Returns the first failing statement's error.
pub async fn execute_script(pool: &PgPool, sql: &str) -> Result<usize> {
    let statements = split_sql_statements(sql);
    for (index, statement) in statements.iter().enumerate() {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SCRIPT",
            db.statement = statement.as_str()
        );
        sqlx::query(statement)
            .execute(pool)
            .instrument(span)
            .await
            .with_context(|| format!("Failed to execute statement {}", index + 1))?;
    }
    Ok(statements.len())
}

/// # Errors
/// Returns an error if any schema statement fails.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    let count = execute_script(pool, SCHEMA_SQL).await?;
    info!("Applied {count} schema statements");
    Ok(())
}

/// # Errors
/// Returns an error if the seed statements fail.
pub async fn seed(pool: &PgPool) -> Result<()> {
    let count = execute_script(pool, SEED_SQL).await?;
    info!("Applied {count} seed statements");
    Ok(())
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("--") && current.trim().is_empty() {
            continue;
        }
        current.push_str(line);
        current.push('\n');

        if trimmed.ends_with(';') {
            let statement = current.trim();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            current.clear();
        }
    }

    let leftover = current.trim();
    if !leftover.is_empty() {
        statements.push(leftover.to_string());
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[test]
    fn schema_splits_into_statements() {
        let statements = split_sql_statements(SCHEMA_SQL);
        assert_eq!(statements.len(), 3);
        assert!(statements[0].starts_with("CREATE TABLE IF NOT EXISTS users"));
        assert!(statements[1].starts_with("CREATE TABLE IF NOT EXISTS sessions"));
        assert!(statements[2].starts_with("CREATE INDEX IF NOT EXISTS"));
    }

    #[test]
    fn seed_splits_into_two_inserts() {
        let statements = split_sql_statements(SEED_SQL);
        assert_eq!(statements.len(), 2);
        assert!(statements.iter().all(|s| s.starts_with("INSERT INTO users")));
        assert!(statements.iter().all(|s| s.ends_with("ON CONFLICT DO NOTHING;")));
    }

    #[test]
    fn split_keeps_trailing_statement_without_semicolon() {
        let statements = split_sql_statements("SELECT 1;\n-- note\nSELECT 2");
        assert_eq!(statements, vec!["SELECT 1;".to_string(), "SELECT 2".to_string()]);
    }

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn unique_violation_matches_sqlstate() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23514"),
        }));
        assert!(!is_unique_violation(&err));

        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }
}
