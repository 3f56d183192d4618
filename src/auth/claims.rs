//! Short-lived authorization claims produced by a successful login.
//!
//! Claims are never persisted. Roles are copied from the user when the claims
//! are issued and are not refreshed; the authentication middleware re-checks
//! the account on every request instead.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::users::User;

pub const ROLE_ADMIN: &str = "ADMIN";
pub const ROLE_USER: &str = "USER";

const DEFAULT_CLAIMS_TTL_SECONDS: i64 = 60 * 60;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub subject: Uuid,
    pub roles: Vec<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Claims {
    #[must_use]
    pub fn new(subject: Uuid, roles: Vec<String>, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            subject,
            roles,
            issued_at: now,
            expires_at: now + ttl,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ClaimsIssuer {
    ttl: Duration,
}

impl Default for ClaimsIssuer {
    fn default() -> Self {
        Self {
            ttl: Duration::seconds(DEFAULT_CLAIMS_TTL_SECONDS),
        }
    }
}

impl ClaimsIssuer {
    #[must_use]
    pub fn with_ttl_seconds(mut self, seconds: i64) -> Self {
        self.ttl = Duration::seconds(seconds);
        self
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub fn issue(&self, user: &User, now: DateTime<Utc>) -> Claims {
        Claims::new(user.id, user.roles.clone(), now, self.ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            name: "Admin Gopher".to_string(),
            email: "admin@example.com".to_string(),
            active: true,
            roles: vec![ROLE_ADMIN.to_string(), ROLE_USER.to_string()],
            password_hash: "$argon2id$...".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn issue_copies_subject_and_roles() {
        let user = user();
        let now = Utc::now();
        let claims = ClaimsIssuer::default().issue(&user, now);
        assert_eq!(claims.subject, user.id);
        assert_eq!(claims.roles, user.roles);
        assert_eq!(claims.issued_at, now);
        assert_eq!(claims.expires_at - claims.issued_at, Duration::hours(1));
    }

    #[test]
    fn expiry_follows_configured_ttl() {
        let now = Utc::now();
        let claims = ClaimsIssuer::default()
            .with_ttl_seconds(30)
            .issue(&user(), now);
        assert_eq!(claims.expires_at, now + Duration::seconds(30));
    }
}
