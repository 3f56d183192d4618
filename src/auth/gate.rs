use axum::{
    extract::Request,
    http::{HeaderValue, header::CACHE_CONTROL},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::debug;

use super::middleware::is_authenticated;
use crate::{
    api::ApiError,
    session::{REDIRECT_PATH_AFTER_LOGIN, Session},
};

pub const LOGIN_PATH: &str = "/user/login";

/// Route layer for protected pages.
///
/// Anonymous requests have their path remembered in the session and are sent
/// to the login page with a 303. Authenticated responses are marked
/// `Cache-Control: no-store`.
///
/// # Errors
/// Fails only if the redirect target cannot be written to the session.
pub async fn require_authentication(
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !is_authenticated(request.extensions()) {
        let path = request.uri().path();
        debug!(path, "unauthenticated access to protected route");
        session.put(REDIRECT_PATH_AFTER_LOGIN, path)?;
        return Ok(Redirect::to(LOGIN_PATH).into_response());
    }

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok(response)
}

/// Accept only local absolute paths as post-login targets.
#[must_use]
pub fn safe_redirect_path(path: &str) -> Option<&str> {
    let local = path.starts_with('/')
        && !path.starts_with("//")
        && !path.contains('\\')
        && !path.chars().any(char::is_control);
    local.then_some(path)
}
