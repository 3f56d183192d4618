//! Server-side sessions.
//!
//! The client only ever holds an opaque random token in an `HttpOnly`,
//! `Secure`, `SameSite=Strict` cookie. The store keeps `sha256(token)` and a
//! JSON map of session values. A session is loaded once per request by
//! [`load_and_save`], handed to handlers as a [`Session`] and written back
//! after the handler returns.

pub mod memory;
pub mod postgres;
mod store;
mod token;

pub use self::{memory::MemorySessionStore, postgres::PgSessionStore, store::SessionStore};
pub(crate) use self::token::generate_token;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{COOKIE, SET_COOKIE},
        request::Parts,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration as StdDuration,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use self::token::hash_token;

/// Session key holding the logged-in user's id.
pub const AUTHENTICATED_USER_ID: &str = "authenticatedUserID";
/// One-shot message shown on the next rendered page.
pub const FLASH: &str = "flash";
/// Path to return to after a forced login.
pub const REDIRECT_PATH_AFTER_LOGIN: &str = "redirectPathAfterLogin";

const DEFAULT_COOKIE_NAME: &str = "snptx_session";
const DEFAULT_LIFETIME_SECONDS: i64 = 12 * 60 * 60;

pub type SessionData = serde_json::Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to generate session token: {0}")]
    Token(String),
    #[error("failed to encode session value: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("session store timed out")]
    Timeout,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    cookie_name: String,
    lifetime: Duration,
    cookie_secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            lifetime: Duration::seconds(DEFAULT_LIFETIME_SECONDS),
            cookie_secure: true,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn with_lifetime_seconds(mut self, seconds: i64) -> Self {
        self.lifetime = Duration::seconds(seconds);
        self
    }

    /// Only disable for plain-HTTP local development.
    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }
}

/// Shared store plus cookie settings; cheap to clone into middleware state.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    config: SessionConfig,
}

impl SessionManager {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, config: SessionConfig) -> Self {
        Self { store, config }
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    async fn resolve(&self, headers: &HeaderMap) -> Result<Session, SessionError> {
        let Some(token) = extract_cookie(headers, &self.config.cookie_name) else {
            return Ok(Session::fresh());
        };
        match self.store.load(&hash_token(&token), Utc::now()).await? {
            Some(data) => Ok(Session::loaded(token, data)),
            // Unknown or expired token: start over as an anonymous visitor.
            None => Ok(Session::fresh()),
        }
    }

    /// Persist whatever the handler did to `session`; returns the cookie to set.
    async fn persist(&self, session: &Session) -> Result<Option<HeaderValue>, SessionError> {
        let (token, data, status) = session.snapshot();
        let now = Utc::now();
        let expires_at = now + self.config.lifetime;

        match (status, token) {
            (Status::Unchanged, _) => Ok(None),
            (Status::Modified, Some(token)) => {
                if self
                    .store
                    .commit(&hash_token(&token), &data, expires_at, now)
                    .await?
                {
                    Ok(Some(self.cookie(&token)?))
                } else {
                    debug!("session vanished before commit, dropping write");
                    Ok(None)
                }
            }
            (Status::Modified, None) => {
                let token = generate_token()?;
                self.store
                    .create(&hash_token(&token), &data, expires_at)
                    .await?;
                Ok(Some(self.cookie(&token)?))
            }
            (Status::Renewed, old) => {
                let token = generate_token()?;
                let old_hash = old.as_deref().map(hash_token);
                if self
                    .store
                    .rotate(old_hash.as_deref(), &hash_token(&token), &data, expires_at)
                    .await?
                {
                    Ok(Some(self.cookie(&token)?))
                } else {
                    debug!("session vanished before rotation, dropping renewal");
                    Ok(None)
                }
            }
        }
    }

    fn cookie(&self, token: &str) -> Result<HeaderValue, SessionError> {
        let mut cookie = format!(
            "{}={token}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
            self.config.cookie_name,
            self.config.lifetime.num_seconds()
        );
        if self.config.cookie_secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie).map_err(|err| SessionError::Token(err.to_string()))
    }
}

/// Start a task that reclaims expired sessions every `interval`.
#[must_use]
pub fn spawn_sweeper(store: Arc<dyn SessionStore>, interval: StdDuration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match store.delete_expired(Utc::now()).await {
                Ok(0) => {}
                Ok(count) => info!("Removed {count} expired sessions"),
                Err(err) => error!("session sweep failed: {err}"),
            }
        }
    })
}

/// Middleware: resolve the session before the handler, persist it after.
pub async fn load_and_save(
    State(manager): State<SessionManager>,
    mut request: Request,
    next: Next,
) -> Response {
    let session = match manager.resolve(request.headers()).await {
        Ok(session) => session,
        Err(err) => {
            error!("Failed to load session: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    request.extensions_mut().insert(session.clone());

    let mut response = next.run(request).await;

    match manager.persist(&session).await {
        Ok(Some(cookie)) => {
            response.headers_mut().append(SET_COOKIE, cookie);
            response
        }
        Ok(None) => response,
        Err(err) => {
            error!("Failed to save session: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Status {
    Unchanged,
    Modified,
    Renewed,
}

#[derive(Debug)]
struct Inner {
    token: Option<String>,
    data: SessionData,
    status: Status,
}

/// Per-request handle to the current session.
///
/// Clones share state; changes are persisted by [`load_and_save`] once the
/// handler has produced its response.
#[derive(Clone, Debug)]
pub struct Session {
    inner: Arc<Mutex<Inner>>,
}

impl Session {
    fn fresh() -> Self {
        Self::with_inner(None, SessionData::new())
    }

    fn loaded(token: String, data: SessionData) -> Self {
        Self::with_inner(Some(token), data)
    }

    fn with_inner(token: Option<String>, data: SessionData) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                token,
                data,
                status: Status::Unchanged,
            })),
        }
    }

    // A panic while holding the lock cannot leave the map half-updated.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn touch(inner: &mut Inner) {
        if inner.status == Status::Unchanged {
            inner.status = Status::Modified;
        }
    }

    fn snapshot(&self) -> (Option<String>, SessionData, Status) {
        let inner = self.lock();
        (inner.token.clone(), inner.data.clone(), inner.status)
    }

    /// # Errors
    /// Returns [`SessionError::Encode`] if `value` cannot be serialized.
    pub fn put<T: Serialize>(&self, key: &str, value: T) -> Result<(), SessionError> {
        let value = serde_json::to_value(value)?;
        let mut inner = self.lock();
        inner.data.insert(key.to_string(), value);
        Self::touch(&mut inner);
        Ok(())
    }

    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let inner = self.lock();
        inner
            .data
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    #[must_use]
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key)
    }

    /// Read and remove a string value.
    pub fn pop_string(&self, key: &str) -> Option<String> {
        let mut inner = self.lock();
        let value = inner.data.remove(key)?;
        Self::touch(&mut inner);
        match value {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    /// Returns whether the key was present.
    pub fn remove(&self, key: &str) -> bool {
        let mut inner = self.lock();
        let removed = inner.data.remove(key).is_some();
        if removed {
            Self::touch(&mut inner);
        }
        removed
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.lock().data.contains_key(key)
    }

    /// Issue a new token for this session's data and retire the old one.
    pub fn renew_token(&self) {
        self.lock().status = Status::Renewed;
    }
}

/// A new anonymous session with no token yet.
impl Default for Session {
    fn default() -> Self {
        Self::fresh()
    }
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Self>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "session layer is not installed",
        ))
    }
}

fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            let val = val.trim();
            if key.trim() == name && !val.is_empty() {
                return Some(val.to_string());
            }
        }
    }
    None
}
