use super::password::PasswordError;

/// Errors returned by the credential store.
///
/// Handlers decide how each variant is rendered; only `Internal`,
/// `Hashing` and `Timeout` are server faults.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("duplicate email")]
    DuplicateEmail,
    /// Unknown email and wrong password both land here.
    #[error("authentication failed")]
    AuthenticationFailure,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("ID is not in its proper form")]
    InvalidId,
    #[error("no matching record found")]
    NotFound,
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("store operation timed out")]
    Timeout,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::Hashing(msg) | PasswordError::InvalidParams(msg) => Self::Hashing(msg),
            PasswordError::Malformed => Self::Hashing("malformed password hash".to_string()),
        }
    }
}

impl From<tokio::time::error::Elapsed> for AuthError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Timeout
    }
}
