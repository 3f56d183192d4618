//! Credentials, claims and the request-level authentication pipeline.

pub mod claims;
pub mod error;
pub mod gate;
pub mod middleware;
pub mod password;
pub mod users;

pub use self::{
    claims::{Claims, ClaimsIssuer, ROLE_ADMIN, ROLE_USER},
    error::AuthError,
    gate::{require_authentication, safe_redirect_path},
    middleware::{Authentication, authenticate, is_authenticated},
    password::{HashParams, PasswordError, PasswordHasher},
};
