//! Postgres-backed [`UserStore`].

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::{Connection, PgPool};
use tracing::{Instrument, info_span};
use uuid::Uuid;

use super::{
    models::{AccountState, NewUser, UpdateUser, User},
    store::{Credentials, UserStore, parse_id},
};
use crate::{
    auth::{claims::Claims, error::AuthError},
    db::is_unique_violation,
};

const USER_COLUMNS: &str =
    "id, name, email, active, roles, password_hash, created_at, updated_at";

#[derive(Clone, Debug)]
pub struct PgUserStore {
    pool: PgPool,
    credentials: Credentials,
}

impl PgUserStore {
    #[must_use]
    pub fn new(pool: PgPool, credentials: Credentials) -> Self {
        Self { pool, credentials }
    }

    async fn fetch_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to select user by id")?;
        Ok(user)
    }

    async fn fetch_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let user = sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to select user by email")?;
        Ok(user)
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, new_user: NewUser, now: DateTime<Utc>) -> Result<User, AuthError> {
        self.credentials
            .within(async {
                let hash = self
                    .credentials
                    .hash(new_user.password.expose_secret())
                    .await?;

                let query = format!(
                    r"
                    INSERT INTO users
                        (id, name, email, active, roles, password_hash, created_at, updated_at)
                    VALUES ($1, $2, $3, TRUE, $4, $5, $6, $6)
                    RETURNING {USER_COLUMNS}
                    "
                );
                let span = info_span!(
                    "db.query",
                    db.system = "postgresql",
                    db.operation = "INSERT",
                    db.statement = query.as_str()
                );
                let result = sqlx::query_as::<_, User>(&query)
                    .bind(Uuid::new_v4())
                    .bind(&new_user.name)
                    .bind(&new_user.email)
                    .bind(&new_user.roles)
                    .bind(hash)
                    .bind(now)
                    .fetch_one(&self.pool)
                    .instrument(span)
                    .await;

                match result {
                    Ok(user) => Ok(user),
                    Err(err) if is_unique_violation(&err) => Err(AuthError::DuplicateEmail),
                    Err(err) => {
                        Err(anyhow::Error::new(err).context("failed to insert user").into())
                    }
                }
            })
            .await
    }

    async fn authenticate(
        &self,
        now: DateTime<Utc>,
        email: &str,
        password: &str,
    ) -> Result<Claims, AuthError> {
        self.credentials
            .within(async {
                let user = self.fetch_by_email(email).await?;
                self.credentials.check_login(user, password, now).await
            })
            .await
    }

    async fn change_password(
        &self,
        id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let id = parse_id(id)?;
        self.credentials
            .within(async {
                let user = self.fetch_by_id(id).await?.ok_or(AuthError::NotFound)?;
                self.credentials
                    .check_current_password(&user, current_password)
                    .await?;
                let hash = self.credentials.hash(new_password).await?;

                let query = "UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2";
                let span = info_span!(
                    "db.query",
                    db.system = "postgresql",
                    db.operation = "UPDATE",
                    db.statement = query
                );
                let result = sqlx::query(query)
                    .bind(hash)
                    .bind(id)
                    .execute(&self.pool)
                    .instrument(span)
                    .await
                    .context("failed to update password")?;

                if result.rows_affected() == 0 {
                    return Err(AuthError::NotFound);
                }
                Ok(())
            })
            .await
    }

    async fn query_by_id(&self, id: &str) -> Result<User, AuthError> {
        let id = parse_id(id)?;
        self.credentials
            .within(async {
                self.fetch_by_id(id).await?.ok_or(AuthError::NotFound)
            })
            .await
    }

    async fn exists(&self, id: &str) -> Result<bool, AuthError> {
        let id = parse_id(id)?;
        self.credentials
            .within(async {
                let query = "SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)";
                let span = info_span!(
                    "db.query",
                    db.system = "postgresql",
                    db.operation = "SELECT",
                    db.statement = query
                );
                let exists: bool = sqlx::query_scalar(query)
                    .bind(id)
                    .fetch_one(&self.pool)
                    .instrument(span)
                    .await
                    .context("failed to check user existence")?;
                Ok(exists)
            })
            .await
    }

    async fn account_state(&self, id: &str) -> Result<AccountState, AuthError> {
        let id = parse_id(id)?;
        self.credentials
            .within(async {
                let query = "SELECT active FROM users WHERE id = $1";
                let span = info_span!(
                    "db.query",
                    db.system = "postgresql",
                    db.operation = "SELECT",
                    db.statement = query
                );
                let active: Option<bool> = sqlx::query_scalar(query)
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .instrument(span)
                    .await
                    .context("failed to read account state")?;

                Ok(match active {
                    None => AccountState::Missing,
                    Some(true) => AccountState::Active,
                    Some(false) => AccountState::Inactive,
                })
            })
            .await
    }

    async fn update(
        &self,
        id: &str,
        update: UpdateUser,
        now: DateTime<Utc>,
    ) -> Result<User, AuthError> {
        let id = parse_id(id)?;
        self.credentials
            .within(async {
                let password_hash = match &update.password {
                    Some(password) => Some(self.credentials.hash(password.expose_secret()).await?),
                    None => None,
                };

                // COALESCE keeps every column the caller left as None.
                let query = format!(
                    r"
                    UPDATE users SET
                        name = COALESCE($2, name),
                        email = COALESCE($3, email),
                        roles = COALESCE($4, roles),
                        password_hash = COALESCE($5, password_hash),
                        active = COALESCE($6, active),
                        updated_at = $7
                    WHERE id = $1
                    RETURNING {USER_COLUMNS}
                    "
                );
                let span = info_span!(
                    "db.query",
                    db.system = "postgresql",
                    db.operation = "UPDATE",
                    db.statement = query.as_str()
                );
                let result = sqlx::query_as::<_, User>(&query)
                    .bind(id)
                    .bind(update.name)
                    .bind(update.email)
                    .bind(update.roles)
                    .bind(password_hash)
                    .bind(update.active)
                    .bind(now)
                    .fetch_optional(&self.pool)
                    .instrument(span)
                    .await;

                match result {
                    Ok(Some(user)) => Ok(user),
                    Ok(None) => Err(AuthError::NotFound),
                    Err(err) if is_unique_violation(&err) => Err(AuthError::DuplicateEmail),
                    Err(err) => {
                        Err(anyhow::Error::new(err).context("failed to update user").into())
                    }
                }
            })
            .await
    }

    async fn delete(&self, id: &str) -> Result<(), AuthError> {
        let id = parse_id(id)?;
        self.credentials
            .within(async {
                let query = "DELETE FROM users WHERE id = $1";
                let span = info_span!(
                    "db.query",
                    db.system = "postgresql",
                    db.operation = "DELETE",
                    db.statement = query
                );
                let result = sqlx::query(query)
                    .bind(id)
                    .execute(&self.pool)
                    .instrument(span)
                    .await
                    .context("failed to delete user")?;

                if result.rows_affected() == 0 {
                    return Err(AuthError::NotFound);
                }
                Ok(())
            })
            .await
    }

    async fn ping(&self) -> Result<(), AuthError> {
        self.credentials
            .within(async {
                let acquire_span = info_span!(
                    "db.acquire",
                    db.system = "postgresql",
                    db.operation = "ACQUIRE"
                );
                let mut conn = self
                    .pool
                    .acquire()
                    .instrument(acquire_span)
                    .await
                    .context("failed to acquire database connection")?;

                let ping_span =
                    info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
                conn.ping()
                    .instrument(ping_span)
                    .await
                    .context("failed to ping database")?;
                Ok(())
            })
            .await
    }
}
