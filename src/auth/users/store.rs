//! The credential store contract and the logic shared by its backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{future::Future, time::Duration};
use tracing::warn;
use uuid::Uuid;

use super::models::{AccountState, NewUser, UpdateUser, User};
use crate::auth::{
    claims::{Claims, ClaimsIssuer},
    error::AuthError,
    password::{PasswordError, PasswordHasher},
};

const DEFAULT_OPERATION_TIMEOUT_SECONDS: u64 = 10;

/// Durable owner of user accounts.
///
/// Every operation runs under the store's operation timeout and fails with
/// [`AuthError::Timeout`] when it expires; writes are single statements or
/// transactions, so an abandoned call never leaves partial state behind.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Hash the password and insert an active user.
    async fn create(&self, new_user: NewUser, now: DateTime<Utc>) -> Result<User, AuthError>;

    /// Verify an email/password pair and issue claims.
    ///
    /// Unknown emails, inactive accounts and wrong passwords all fail with
    /// [`AuthError::AuthenticationFailure`] after comparable work.
    async fn authenticate(
        &self,
        now: DateTime<Utc>,
        email: &str,
        password: &str,
    ) -> Result<Claims, AuthError>;

    /// Replace the password after re-verifying the current one.
    async fn change_password(
        &self,
        id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError>;

    async fn query_by_id(&self, id: &str) -> Result<User, AuthError>;

    /// Row existence, regardless of the active flag.
    async fn exists(&self, id: &str) -> Result<bool, AuthError>;

    /// Existence and eligibility in one lookup.
    async fn account_state(&self, id: &str) -> Result<AccountState, AuthError>;

    async fn update(
        &self,
        id: &str,
        update: UpdateUser,
        now: DateTime<Utc>,
    ) -> Result<User, AuthError>;

    async fn delete(&self, id: &str) -> Result<(), AuthError>;

    /// Cheap liveness check of the backing store.
    async fn ping(&self) -> Result<(), AuthError>;
}

/// Parse a user id, rejecting anything that is not a UUID.
///
/// # Errors
/// Returns [`AuthError::InvalidId`] for malformed input.
pub fn parse_id(id: &str) -> Result<Uuid, AuthError> {
    Uuid::parse_str(id).map_err(|_| AuthError::InvalidId)
}

/// Hashing, claims and timeout settings shared by every store backend.
#[derive(Clone, Debug)]
pub struct Credentials {
    hasher: PasswordHasher,
    issuer: ClaimsIssuer,
    timeout: Duration,
}

impl Credentials {
    #[must_use]
    pub fn new(hasher: PasswordHasher) -> Self {
        Self {
            hasher,
            issuer: ClaimsIssuer::default(),
            timeout: Duration::from_secs(DEFAULT_OPERATION_TIMEOUT_SECONDS),
        }
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: ClaimsIssuer) -> Self {
        self.issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one store operation under the operation timeout.
    pub(super) async fn within<T, F>(&self, operation: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, AuthError>>,
    {
        tokio::time::timeout(self.timeout, operation).await?
    }

    /// Finish a login attempt once the backend has looked up `user`.
    pub(super) async fn check_login(
        &self,
        user: Option<User>,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<Claims, AuthError> {
        let user = match user {
            Some(user) if user.active => user,
            _ => {
                self.hasher.verify_dummy(password).await?;
                return Err(AuthError::AuthenticationFailure);
            }
        };

        match self.hasher.verify(password, &user.password_hash).await {
            Ok(true) => Ok(self.issuer.issue(&user, now)),
            Ok(false) => Err(AuthError::AuthenticationFailure),
            Err(PasswordError::Malformed) => {
                warn!(user_id = %user.id, "stored password hash is malformed");
                Err(AuthError::AuthenticationFailure)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Confirm the caller knows the current password of `user`.
    pub(super) async fn check_current_password(
        &self,
        user: &User,
        password: &str,
    ) -> Result<(), AuthError> {
        if self.hasher.verify(password, &user.password_hash).await? {
            Ok(())
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }

    pub(super) async fn hash(&self, password: &str) -> Result<String, AuthError> {
        Ok(self.hasher.hash(password).await?)
    }
}
