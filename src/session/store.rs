use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{SessionData, SessionError};

/// Persistence for session records, keyed by the SHA-256 of the token.
///
/// Tokens are never updated in place: rotation inserts a new record and
/// deletes the old one in a single unit, so a request still holding the old
/// token sees "no session" rather than a half-written one.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Live record for `token_hash`; expired rows count as absent.
    async fn load(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<SessionData>, SessionError>;

    /// Insert a record for a freshly issued token.
    async fn create(
        &self,
        token_hash: &[u8],
        data: &SessionData,
        expires_at: DateTime<Utc>,
    ) -> Result<(), SessionError>;

    /// Overwrite an existing live record.
    ///
    /// Returns `false` when the record is gone (rotated, destroyed or
    /// expired); the write is dropped rather than resurrecting the token.
    async fn commit(
        &self,
        token_hash: &[u8],
        data: &SessionData,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, SessionError>;

    /// Move `data` to `new_hash`, removing `old_hash` atomically.
    ///
    /// Returns `false` without storing anything when `old_hash` is given but
    /// its record is already gone, so a losing concurrent rotation cannot
    /// mint a second live token.
    async fn rotate(
        &self,
        old_hash: Option<&[u8]>,
        new_hash: &[u8],
        data: &SessionData,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, SessionError>;

    async fn delete(&self, token_hash: &[u8]) -> Result<(), SessionError>;

    /// Reclaim every expired record, returning how many were removed.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, SessionError>;
}
