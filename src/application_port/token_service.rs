use crate::domain_model::{RefreshTokenRecord, UserId};
use crate::domain_port::{StoreError, TxError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token signature invalid")]
    InvalidSignature,
    #[error("token claims malformed")]
    MalformedClaims,
    #[error("token expired")]
    Expired,
    #[error("refresh token not found")]
    NotFound,
    #[error("refresh token id already issued")]
    Conflict,
    #[error("store error: {0}")]
    Persistence(String),
    #[error("new pair issued but revoking {jti} failed: {reason}")]
    RevokeFailed { jti: Uuid, reason: String },
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for TokenError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => TokenError::NotFound,
            StoreError::Conflict => TokenError::Conflict,
            StoreError::Backend(e) => TokenError::Persistence(e),
        }
    }
}

impl From<TxError> for TokenError {
    fn from(err: TxError) -> Self {
        TokenError::Persistence(err.to_string())
    }
}

#[derive(Clone, Serialize)]
pub struct AccessToken(pub String);

#[derive(Clone, Serialize)]
pub struct RefreshToken(pub String);

// Signed tokens are bearer credentials; keep them out of logs.
impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(..)")
    }
}

impl fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RefreshToken(..)")
    }
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    pub jti: Uuid,
    pub expires_in: Duration,
}

#[derive(Debug, Clone)]
pub struct TokenVerifyResult {
    pub user_id: UserId,
    pub jti: Option<Uuid>,
}

/// Signs and verifies the two JWT kinds. Pure CPU work, never touches the store.
pub trait TokenCodec: Send + Sync {
    fn access_ttl(&self) -> Duration;
    fn refresh_ttl(&self) -> Duration;

    fn issue_access_token(
        &self,
        user: UserId,
        issued_at: DateTime<Utc>,
    ) -> Result<(AccessToken, DateTime<Utc>), TokenError>;

    fn issue_refresh_token(
        &self,
        user: UserId,
        jti: Uuid,
        issued_at: DateTime<Utc>,
    ) -> Result<(RefreshToken, DateTime<Utc>), TokenError>;

    fn verify_access_token(&self, token: &str) -> Result<TokenVerifyResult, TokenError>;
    fn verify_refresh_token(&self, token: &str) -> Result<TokenVerifyResult, TokenError>;
}

#[async_trait::async_trait]
pub trait TokenService: Send + Sync {
    /// Mints a pair and persists the refresh record before returning it.
    async fn generate_tokens(&self, user_id: UserId) -> Result<TokenPair, TokenError>;

    fn validate_access_token(&self, token: &str) -> Result<UserId, TokenError>;

    async fn validate_refresh_token(&self, token: &str) -> Result<RefreshTokenRecord, TokenError>;

    /// Issues a fresh pair for `old.user_id` and revokes `old.jti`.
    async fn roll_tokens(&self, old: &RefreshTokenRecord) -> Result<TokenPair, TokenError>;

    /// Deletes expired refresh records, returning how many were removed.
    async fn purge_expired(&self) -> Result<u64, TokenError>;
}
