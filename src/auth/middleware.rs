//! Per-request authentication.
//!
//! Each request walks `Anonymous -> SessionPresent -> AccountVerified ->
//! Authenticated`, dropping back to `Anonymous` at the first failed check.
//! The account is re-read on every request so deactivation applies to the
//! very next one.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{Extensions, request::Parts},
    middleware::Next,
    response::Response,
};
use std::{convert::Infallible, sync::Arc};
use tracing::debug;
use uuid::Uuid;

use super::{
    error::AuthError,
    users::{AccountState, UserStore, parse_id},
};
use crate::{
    api::ApiError,
    session::{AUTHENTICATED_USER_ID, Session},
};

/// Request extension marking the request as authenticated.
///
/// Private so that only [`authenticate`] can attach it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct AuthenticatedUser(Uuid);

#[derive(Debug, PartialEq, Eq)]
enum Stage {
    Anonymous,
    SessionPresent(String),
    AccountVerified(Uuid),
    Authenticated(Uuid),
}

impl Stage {
    fn from_session(session: &Session) -> Self {
        session
            .get_string(AUTHENTICATED_USER_ID)
            .map_or(Self::Anonymous, Self::SessionPresent)
    }

    async fn advance(self, users: &dyn UserStore, session: &Session) -> Result<Self, AuthError> {
        match self {
            Self::Anonymous | Self::Authenticated(_) => Ok(self),
            Self::SessionPresent(raw) => {
                let Ok(id) = parse_id(&raw) else {
                    debug!("session carries a malformed user id, clearing it");
                    session.remove(AUTHENTICATED_USER_ID);
                    return Ok(Self::Anonymous);
                };
                match users.account_state(&raw).await? {
                    AccountState::Active => Ok(Self::AccountVerified(id)),
                    state @ (AccountState::Missing | AccountState::Inactive) => {
                        debug!(user_id = %id, ?state, "account no longer eligible, clearing session");
                        session.remove(AUTHENTICATED_USER_ID);
                        Ok(Self::Anonymous)
                    }
                }
            }
            Self::AccountVerified(id) => Ok(Self::Authenticated(id)),
        }
    }

    fn is_final(&self) -> bool {
        matches!(self, Self::Anonymous | Self::Authenticated(_))
    }
}

async fn resolve(users: &dyn UserStore, session: &Session) -> Result<Option<Uuid>, AuthError> {
    let mut stage = Stage::from_session(session);
    while !stage.is_final() {
        stage = stage.advance(users, session).await?;
    }
    Ok(match stage {
        Stage::Authenticated(id) => Some(id),
        _ => None,
    })
}

/// Middleware: attach the authenticated user to the request, if any.
///
/// # Errors
/// Store failures are fatal for the request and surface as 5xx.
pub async fn authenticate(
    State(users): State<Arc<dyn UserStore>>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(id) = resolve(users.as_ref(), &session).await? {
        request.extensions_mut().insert(AuthenticatedUser(id));
    }
    Ok(next.run(request).await)
}

#[must_use]
pub fn is_authenticated(extensions: &Extensions) -> bool {
    extensions.get::<AuthenticatedUser>().is_some()
}

#[must_use]
pub fn authenticated_user_id(extensions: &Extensions) -> Option<Uuid> {
    extensions.get::<AuthenticatedUser>().map(|user| user.0)
}

/// Extractor view of the authentication outcome.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Authentication(Option<Uuid>);

impl Authentication {
    #[must_use]
    pub fn user_id(&self) -> Option<Uuid> {
        self.0
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.0.is_some()
    }
}

impl<S> FromRequestParts<S> for Authentication
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(authenticated_user_id(&parts.extensions)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::auth::{
        password::{HashParams, PasswordHasher},
        users::{Credentials, MemoryUserStore, NewUser, UpdateUser},
    };
    use chrono::Utc;
    use std::num::NonZeroUsize;

    fn store() -> MemoryUserStore {
        let params = HashParams::default()
            .with_memory_kib(1024)
            .with_iterations(1)
            .with_parallelism(1);
        let hasher = PasswordHasher::new(params, NonZeroUsize::new(2)).unwrap();
        MemoryUserStore::new(Credentials::new(hasher))
    }

    fn session_for(id: &str) -> Session {
        let session = Session::default();
        session.put(AUTHENTICATED_USER_ID, id).unwrap();
        session
    }

    #[tokio::test]
    async fn no_user_id_is_anonymous() {
        let users = store();
        assert_eq!(resolve(&users, &Session::default()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn active_account_is_authenticated() {
        let users = store();
        let user = users
            .create(NewUser::new("Alice", "alice@example.com", "validPa$$word"), Utc::now())
            .await
            .unwrap();
        let session = session_for(&user.id.to_string());
        assert_eq!(resolve(&users, &session).await.unwrap(), Some(user.id));
        assert!(session.contains(AUTHENTICATED_USER_ID));
    }

    #[tokio::test]
    async fn deactivated_account_is_cleared() {
        let users = store();
        let user = users
            .create(NewUser::new("Alice", "alice@example.com", "validPa$$word"), Utc::now())
            .await
            .unwrap();
        let session = session_for(&user.id.to_string());
        users
            .update(
                &user.id.to_string(),
                UpdateUser {
                    active: Some(false),
                    ..UpdateUser::default()
                },
                Utc::now(),
            )
            .await
            .unwrap();

        assert_eq!(resolve(&users, &session).await.unwrap(), None);
        assert!(!session.contains(AUTHENTICATED_USER_ID));
    }

    #[tokio::test]
    async fn missing_or_malformed_ids_are_cleared() {
        let users = store();
        let session = session_for(&Uuid::new_v4().to_string());
        assert_eq!(resolve(&users, &session).await.unwrap(), None);
        assert!(!session.contains(AUTHENTICATED_USER_ID));

        let session = session_for("not-a-uuid");
        assert_eq!(resolve(&users, &session).await.unwrap(), None);
        assert!(!session.contains(AUTHENTICATED_USER_ID));
    }
}
