use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::Serialize;
use sqlx::{FromRow, Row, postgres::PgRow};
use uuid::Uuid;

use crate::auth::claims::ROLE_USER;

/// A stored account. The password hash never leaves the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub active: bool,
    pub roles: Vec<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for User {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            active: row.try_get("active")?,
            roles: row.try_get("roles")?,
            password_hash: row.try_get("password_hash")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Signup input; fields are validated by the caller.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: SecretString,
    pub roles: Vec<String>,
}

impl NewUser {
    /// A regular account with the `USER` role.
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>, password: &str) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: SecretString::from(password.to_owned()),
            roles: vec![ROLE_USER.to_string()],
        }
    }

    #[must_use]
    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }
}

/// Partial update: `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateUser {
    pub name: Option<String>,
    pub email: Option<String>,
    pub roles: Option<Vec<String>>,
    pub password: Option<SecretString>,
    pub active: Option<bool>,
}

/// Result of the per-request account check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    Missing,
    Inactive,
    Active,
}

impl AccountState {
    #[must_use]
    pub fn exists(self) -> bool {
        !matches!(self, Self::Missing)
    }
}
