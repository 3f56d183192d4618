//! Postgres-backed [`SessionStore`] over the `sessions` table.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, types::Json};
use std::{future::Future, time::Duration};
use tracing::{Instrument, info_span};

use super::{SessionData, SessionError, store::SessionStore};

const DEFAULT_TIMEOUT_SECONDS: u64 = 5;

#[derive(Clone, Debug)]
pub struct PgSessionStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn within<T, F>(&self, operation: F) -> Result<T, SessionError>
    where
        F: Future<Output = Result<T, SessionError>>,
    {
        tokio::time::timeout(self.timeout, operation)
            .await
            .map_err(|_| SessionError::Timeout)?
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn load(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<SessionData>, SessionError> {
        self.within(async {
            let query = "SELECT data FROM sessions WHERE token_hash = $1 AND expires_at > $2";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = query
            );
            let data: Option<Json<SessionData>> = sqlx::query_scalar(query)
                .bind(token_hash)
                .bind(now)
                .fetch_optional(&self.pool)
                .instrument(span)
                .await
                .context("failed to load session")?;
            Ok(data.map(|Json(data)| data))
        })
        .await
    }

    async fn create(
        &self,
        token_hash: &[u8],
        data: &SessionData,
        expires_at: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        self.within(async {
            let query = "INSERT INTO sessions (token_hash, data, expires_at) VALUES ($1, $2, $3)";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "INSERT",
                db.statement = query
            );
            sqlx::query(query)
                .bind(token_hash)
                .bind(Json(data))
                .bind(expires_at)
                .execute(&self.pool)
                .instrument(span)
                .await
                .context("failed to insert session")?;
            Ok(())
        })
        .await
    }

    async fn commit(
        &self,
        token_hash: &[u8],
        data: &SessionData,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, SessionError> {
        self.within(async {
            let query = r"
                UPDATE sessions
                SET data = $2, expires_at = $3, updated_at = NOW()
                WHERE token_hash = $1 AND expires_at > $4
            ";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "UPDATE",
                db.statement = query
            );
            let result = sqlx::query(query)
                .bind(token_hash)
                .bind(Json(data))
                .bind(expires_at)
                .bind(now)
                .execute(&self.pool)
                .instrument(span)
                .await
                .context("failed to commit session")?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn rotate(
        &self,
        old_hash: Option<&[u8]>,
        new_hash: &[u8],
        data: &SessionData,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, SessionError> {
        self.within(async {
            // Dropping the transaction on timeout or early return rolls it back.
            let mut tx = self
                .pool
                .begin()
                .await
                .context("begin session rotation transaction")?;

            if let Some(old_hash) = old_hash {
                let query = "DELETE FROM sessions WHERE token_hash = $1";
                let span = info_span!(
                    "db.query",
                    db.system = "postgresql",
                    db.operation = "DELETE",
                    db.statement = query
                );
                let result = sqlx::query(query)
                    .bind(old_hash)
                    .execute(&mut *tx)
                    .instrument(span)
                    .await
                    .context("failed to delete rotated session")?;
                if result.rows_affected() == 0 {
                    return Ok(false);
                }
            }

            let query = "INSERT INTO sessions (token_hash, data, expires_at) VALUES ($1, $2, $3)";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "INSERT",
                db.statement = query
            );
            sqlx::query(query)
                .bind(new_hash)
                .bind(Json(data))
                .bind(expires_at)
                .execute(&mut *tx)
                .instrument(span)
                .await
                .context("failed to insert rotated session")?;

            tx.commit()
                .await
                .context("commit session rotation transaction")?;
            Ok(true)
        })
        .await
    }

    async fn delete(&self, token_hash: &[u8]) -> Result<(), SessionError> {
        self.within(async {
            let query = "DELETE FROM sessions WHERE token_hash = $1";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "DELETE",
                db.statement = query
            );
            sqlx::query(query)
                .bind(token_hash)
                .execute(&self.pool)
                .instrument(span)
                .await
                .context("failed to delete session")?;
            Ok(())
        })
        .await
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, SessionError> {
        self.within(async {
            let query = "DELETE FROM sessions WHERE expires_at <= $1";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "DELETE",
                db.statement = query
            );
            let result = sqlx::query(query)
                .bind(now)
                .execute(&self.pool)
                .instrument(span)
                .await
                .context("failed to delete expired sessions")?;
            Ok(result.rows_affected())
        })
        .await
    }
}
