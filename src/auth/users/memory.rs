//! In-process [`UserStore`] used by tests and local runs without a database.
//!
//! Hashing and claims go through the same [`Credentials`] as the Postgres
//! store, so login behaves identically.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    models::{AccountState, NewUser, UpdateUser, User},
    store::{Credentials, UserStore, parse_id},
};
use crate::auth::{claims::Claims, error::AuthError};

#[derive(Debug)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
    credentials: Credentials,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            credentials,
        }
    }

    async fn find_by_email(&self, email: &str) -> Option<User> {
        self.users
            .read()
            .await
            .values()
            .find(|user| user.email == email)
            .cloned()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, new_user: NewUser, now: DateTime<Utc>) -> Result<User, AuthError> {
        self.credentials
            .within(async {
                let password_hash = self
                    .credentials
                    .hash(new_user.password.expose_secret())
                    .await?;

                let mut users = self.users.write().await;
                if users.values().any(|user| user.email == new_user.email) {
                    return Err(AuthError::DuplicateEmail);
                }

                let user = User {
                    id: Uuid::new_v4(),
                    name: new_user.name,
                    email: new_user.email,
                    active: true,
                    roles: new_user.roles,
                    password_hash,
                    created_at: now,
                    updated_at: now,
                };
                users.insert(user.id, user.clone());
                Ok(user)
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
                let user = self.find_by_email(email).await;
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
                let user = self
                    .users
                    .read()
                    .await
                    .get(&id)
                    .cloned()
                    .ok_or(AuthError::NotFound)?;
                self.credentials
                    .check_current_password(&user, current_password)
                    .await?;
                let password_hash = self.credentials.hash(new_password).await?;

                let mut users = self.users.write().await;
                let stored = users.get_mut(&id).ok_or(AuthError::NotFound)?;
                stored.password_hash = password_hash;
                stored.updated_at = Utc::now();
                Ok(())
            })
            .await
    }

    async fn query_by_id(&self, id: &str) -> Result<User, AuthError> {
        let id = parse_id(id)?;
        self.users
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(AuthError::NotFound)
    }

    async fn exists(&self, id: &str) -> Result<bool, AuthError> {
        let id = parse_id(id)?;
        Ok(self.users.read().await.contains_key(&id))
    }

    async fn account_state(&self, id: &str) -> Result<AccountState, AuthError> {
        let id = parse_id(id)?;
        Ok(match self.users.read().await.get(&id) {
            None => AccountState::Missing,
            Some(user) if user.active => AccountState::Active,
            Some(_) => AccountState::Inactive,
        })
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

                let mut users = self.users.write().await;
                if let Some(email) = &update.email {
                    if users
                        .values()
                        .any(|user| user.id != id && &user.email == email)
                    {
                        return Err(AuthError::DuplicateEmail);
                    }
                }

                let stored = users.get_mut(&id).ok_or(AuthError::NotFound)?;
                let mut user = stored.clone();
                if let Some(name) = update.name {
                    user.name = name;
                }
                if let Some(email) = update.email {
                    user.email = email;
                }
                if let Some(roles) = update.roles {
                    user.roles = roles;
                }
                if let Some(password_hash) = password_hash {
                    user.password_hash = password_hash;
                }
                if let Some(active) = update.active {
                    user.active = active;
                }
                if user.active && user.password_hash.is_empty() {
                    return Err(anyhow!("active user {id} has no password hash").into());
                }
                user.updated_at = now;

                *stored = user.clone();
                Ok(user)
            })
            .await
    }

    async fn delete(&self, id: &str) -> Result<(), AuthError> {
        let id = parse_id(id)?;
        self.users
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(AuthError::NotFound)
    }

    async fn ping(&self) -> Result<(), AuthError> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::auth::{
        claims::{ROLE_ADMIN, ROLE_USER},
        password::{HashParams, PasswordHasher},
    };

    fn store() -> MemoryUserStore {
        let params = HashParams::default()
            .with_memory_kib(1024)
            .with_iterations(1)
            .with_parallelism(1);
        let hasher = PasswordHasher::new(params, None).unwrap();
        MemoryUserStore::new(Credentials::new(hasher))
    }

    fn alice() -> NewUser {
        NewUser::new("Alice", "alice@example.com", "validPa$$word")
    }

    #[tokio::test]
    async fn signup_login_and_change_password() {
        let store = store();
        let now = Utc::now();

        let user = store.create(alice(), now).await.unwrap();
        assert!(user.active);
        assert_eq!(user.roles, vec![ROLE_USER.to_string()]);
        assert!(user.password_hash.starts_with("$argon2id$"));

        let duplicate = store.create(alice(), now).await;
        assert!(matches!(duplicate, Err(AuthError::DuplicateEmail)));

        let wrong = store
            .authenticate(now, "alice@example.com", "wrongpass")
            .await;
        assert!(matches!(wrong, Err(AuthError::AuthenticationFailure)));

        let claims = store
            .authenticate(now, "alice@example.com", "validPa$$word")
            .await
            .unwrap();
        assert_eq!(claims.subject, user.id);

        let id = user.id.to_string();
        store
            .change_password(&id, "validPa$$word", "sup3rs3cr3t")
            .await
            .unwrap();
        let again = store.change_password(&id, "validPa$$word", "x").await;
        assert!(matches!(again, Err(AuthError::InvalidCredentials)));

        assert!(store
            .authenticate(now, "alice@example.com", "sup3rs3cr3t")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_look_the_same() {
        let store = store();
        store.create(alice(), Utc::now()).await.unwrap();

        let unknown = store
            .authenticate(Utc::now(), "nobody@example.com", "validPa$$word")
            .await
            .unwrap_err();
        let mismatch = store
            .authenticate(Utc::now(), "alice@example.com", "wrongpass")
            .await
            .unwrap_err();
        assert_eq!(unknown.to_string(), mismatch.to_string());
        assert!(matches!(unknown, AuthError::AuthenticationFailure));
        assert!(matches!(mismatch, AuthError::AuthenticationFailure));
    }

    #[tokio::test]
    async fn query_by_id_returns_created_fields() {
        let store = store();
        let created = store
            .create(
                NewUser::new("Admin Gopher", "admin@example.com", "goroutines")
                    .with_roles(vec![ROLE_ADMIN.to_string(), ROLE_USER.to_string()]),
                Utc::now(),
            )
            .await
            .unwrap();

        let fetched = store.query_by_id(&created.id.to_string()).await.unwrap();
        assert_eq!(fetched, created);

        assert!(matches!(
            store.query_by_id("not-a-uuid").await,
            Err(AuthError::InvalidId)
        ));
        assert!(matches!(
            store.query_by_id(&Uuid::new_v4().to_string()).await,
            Err(AuthError::NotFound)
        ));
    }

    #[tokio::test]
    async fn inactive_accounts_exist_but_cannot_log_in() {
        let store = store();
        let now = Utc::now();
        let user = store.create(alice(), now).await.unwrap();
        let id = user.id.to_string();

        store
            .update(
                &id,
                UpdateUser {
                    active: Some(false),
                    ..UpdateUser::default()
                },
                now,
            )
            .await
            .unwrap();

        assert!(store.exists(&id).await.unwrap());
        assert_eq!(store.account_state(&id).await.unwrap(), AccountState::Inactive);
        assert!(matches!(
            store
                .authenticate(now, "alice@example.com", "validPa$$word")
                .await,
            Err(AuthError::AuthenticationFailure)
        ));
    }

    #[tokio::test]
    async fn update_keeps_emails_unique() {
        let store = store();
        let now = Utc::now();
        store.create(alice(), now).await.unwrap();
        let bob = store
            .create(NewUser::new("Bob", "bob@example.com", "bobPa$$word1"), now)
            .await
            .unwrap();

        let clash = store
            .update(
                &bob.id.to_string(),
                UpdateUser {
                    email: Some("alice@example.com".to_string()),
                    ..UpdateUser::default()
                },
                now,
            )
            .await;
        assert!(matches!(clash, Err(AuthError::DuplicateEmail)));

        let renamed = store
            .update(
                &bob.id.to_string(),
                UpdateUser {
                    name: Some("Robert".to_string()),
                    ..UpdateUser::default()
                },
                now,
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "Robert");
        assert_eq!(renamed.email, "bob@example.com");
    }

    #[tokio::test]
    async fn delete_removes_the_row() {
        let store = store();
        let user = store.create(alice(), Utc::now()).await.unwrap();
        let id = user.id.to_string();

        store.delete(&id).await.unwrap();
        assert!(!store.exists(&id).await.unwrap());
        assert_eq!(store.account_state(&id).await.unwrap(), AccountState::Missing);
        assert!(matches!(store.delete(&id).await, Err(AuthError::NotFound)));
    }
}
