use super::UserId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One persisted refresh token row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshTokenRecord {
    pub jti: Uuid,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    /// `not revoked AND not expired`, evaluated against `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at > now
    }
}

#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub jti: Uuid,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}
