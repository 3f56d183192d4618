//! Per-session anti-forgery tokens.
//!
//! The token lives in the session under [`SESSION_KEY`] and is mirrored into
//! an `HttpOnly` cookie. Every mutating request must echo it back either in the
//! `csrf_token` form field or the `x-csrf-token` header; anything else is
//! rejected before the handler runs.

use axum::{
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header::SET_COOKIE, request::Parts},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::{
    api::ApiError,
    session::{Session, SessionError, generate_token},
};

pub const SESSION_KEY: &str = "csrf_token";
pub const FORM_FIELD: &str = "csrf_token";
pub const HEADER_NAME: &str = "x-csrf-token";
pub const COOKIE_NAME: &str = "csrf_token";

const DEFAULT_BODY_LIMIT: usize = 64 * 1024;

#[derive(Clone, Debug)]
pub struct CsrfConfig {
    body_limit: usize,
    cookie_secure: bool,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            body_limit: DEFAULT_BODY_LIMIT,
            cookie_secure: true,
        }
    }
}

impl CsrfConfig {
    /// Largest request body buffered while looking for the form field.
    #[must_use]
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }
}

/// The token bound to the current session, for embedding in rendered forms.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CsrfToken(pub String);

impl<S> FromRequestParts<S> for CsrfToken
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Self>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "csrf layer is not installed",
        ))
    }
}

/// Replace the session's token, e.g. after a privilege change such as login.
///
/// # Errors
/// Returns [`SessionError`] if a token cannot be generated or stored.
pub fn regenerate(session: &Session) -> Result<String, SessionError> {
    let token = generate_token()?;
    session.put(SESSION_KEY, &token)?;
    Ok(token)
}

fn ensure_token(session: &Session) -> Result<String, SessionError> {
    match session.get_string(SESSION_KEY) {
        Some(token) => Ok(token),
        None => regenerate(session),
    }
}

fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

fn tokens_match(submitted: &str, expected: &str) -> bool {
    submitted.as_bytes().ct_eq(expected.as_bytes()).into()
}

fn submitted_token(headers: &HeaderMap, body: &[u8]) -> Option<String> {
    if let Some(value) = headers.get(HEADER_NAME).and_then(|v| v.to_str().ok()) {
        return Some(value.to_string());
    }
    url::form_urlencoded::parse(body)
        .find(|(key, _)| key == FORM_FIELD)
        .map(|(_, value)| value.into_owned())
}

fn incoming_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(axum::http::header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == COOKIE_NAME)
        .map(|(_, value)| value)
}

fn build_cookie(token: &str, secure: bool) -> Result<HeaderValue, SessionError> {
    let mut cookie = format!("{COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Strict");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).map_err(|err| SessionError::Token(err.to_string()))
}

/// Middleware: verify the token on mutating requests and expose it to handlers.
///
/// Must run inside the session layer.
///
/// # Errors
/// [`ApiError::Csrf`] when the submitted token is absent or wrong.
pub async fn csrf_protect(
    State(config): State<CsrfConfig>,
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let expected = ensure_token(&session)?;
    let previous_cookie = incoming_cookie(request.headers()).map(str::to_string);

    let mut request = if is_mutating(request.method()) {
        let (parts, body) = request.into_parts();
        let bytes = axum::body::to_bytes(body, config.body_limit)
            .await
            .map_err(|_| ApiError::BadRequest("request body too large"))?;

        let valid = submitted_token(&parts.headers, &bytes)
            .is_some_and(|submitted| tokens_match(&submitted, &expected));
        if !valid {
            warn!(method = %parts.method, path = %parts.uri.path(), "CSRF token mismatch");
            return Err(ApiError::Csrf);
        }
        Request::from_parts(parts, Body::from(bytes))
    } else {
        request
    };

    request.extensions_mut().insert(CsrfToken(expected));
    let mut response = next.run(request).await;

    // The handler may have regenerated the token.
    if let Some(current) = session.get_string(SESSION_KEY)
        && previous_cookie.as_deref() != Some(current.as_str())
    {
        response
            .headers_mut()
            .append(SET_COOKIE, build_cookie(&current, config.cookie_secure)?);
    }

    Ok(response)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn header_wins_over_form_field() {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_NAME, HeaderValue::from_static("from-header"));
        let body = b"name=alice&csrf_token=from-form";
        assert_eq!(
            submitted_token(&headers, body),
            Some("from-header".to_string())
        );
        assert_eq!(
            submitted_token(&HeaderMap::new(), body),
            Some("from-form".to_string())
        );
        assert_eq!(submitted_token(&HeaderMap::new(), b"name=alice"), None);
    }

    #[test]
    fn form_field_is_percent_decoded() {
        let body = b"csrf_token=a%2Bb%3D";
        assert_eq!(
            submitted_token(&HeaderMap::new(), body),
            Some("a+b=".to_string())
        );
    }

    #[test]
    fn comparison_rejects_prefixes_and_empty() {
        assert!(tokens_match("abc", "abc"));
        assert!(!tokens_match("ab", "abc"));
        assert!(!tokens_match("", "abc"));
        assert!(!tokens_match("abd", "abc"));
    }

    #[test]
    fn only_state_changing_methods_are_checked() {
        assert!(is_mutating(&Method::POST));
        assert!(is_mutating(&Method::DELETE));
        assert!(is_mutating(&Method::PATCH));
        assert!(!is_mutating(&Method::GET));
        assert!(!is_mutating(&Method::HEAD));
        assert!(!is_mutating(&Method::OPTIONS));
    }

    #[test]
    fn cookie_carries_token() {
        let cookie = build_cookie("tok", true).unwrap();
        let cookie = cookie.to_str().unwrap();
        assert!(cookie.starts_with("csrf_token=tok;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.ends_with("; Secure"));
        assert!(!build_cookie("tok", false).unwrap().to_str().unwrap().contains("Secure"));
    }
}
