use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

use crate::{auth::AuthError, session::SessionError};

/// Single mapping point from core errors to HTTP responses.
///
/// Client-facing bodies are the bare status text; details only go to the log.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("CSRF token missing or incorrect")]
    Csrf,
    #[error("bad request: {0}")]
    BadRequest(&'static str),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Auth(
                AuthError::DuplicateEmail
                | AuthError::AuthenticationFailure
                | AuthError::InvalidCredentials,
            ) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Auth(AuthError::InvalidId) | Self::Csrf | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Auth(AuthError::NotFound) => StatusCode::NOT_FOUND,
            Self::Auth(AuthError::Timeout) | Self::Session(SessionError::Timeout) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Auth(AuthError::Hashing(_) | AuthError::Internal(_))
            | Self::Session(
                SessionError::Token(_) | SessionError::Encode(_) | SessionError::Store(_),
            ) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{self:#}");
        } else if matches!(self, Self::Csrf) {
            warn!("{self}");
        }
        let body = status.canonical_reason().unwrap_or("Error");
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_correctable_errors_are_422() {
        for err in [
            AuthError::DuplicateEmail,
            AuthError::AuthenticationFailure,
            AuthError::InvalidCredentials,
        ] {
            assert_eq!(
                ApiError::from(err).status(),
                StatusCode::UNPROCESSABLE_ENTITY
            );
        }
    }

    #[test]
    fn client_and_lookup_errors() {
        assert_eq!(ApiError::Csrf.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(AuthError::InvalidId).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(AuthError::NotFound).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn infrastructure_errors_hide_details() {
        let err = ApiError::from(AuthError::Internal(anyhow::anyhow!(
            "connection refused to 10.0.0.7"
        )));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            ApiError::from(SessionError::Timeout).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
