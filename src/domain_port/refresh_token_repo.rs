use crate::domain_model::*;
use crate::domain_port::repo_tx::{TxError, TxHandle};
use uuid::Uuid;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("record already exists")]
    Conflict,
    #[error("store error: {0}")]
    Backend(String),
}

impl From<TxError> for StoreError {
    fn from(err: TxError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Persistence for issued refresh tokens.
///
/// Every method takes an optional transaction handle: `Some` runs the statement
/// inside that transaction, `None` runs it directly against the pool.
#[async_trait::async_trait]
pub trait RefreshTokenRepo: Send + Sync {
    /// Fails with [`StoreError::Conflict`] if the `jti` already exists.
    async fn insert(
        &self,
        tx: Option<&mut TxHandle>,
        token: &NewRefreshToken,
    ) -> Result<(), StoreError>;

    /// Single lookup of `jti` under `revoked = false AND expires_at > now()`.
    async fn get_valid(
        &self,
        tx: Option<&mut TxHandle>,
        jti: Uuid,
    ) -> Result<RefreshTokenRecord, StoreError>;

    /// Marks the token revoked. Returns `true` only if this call flipped the
    /// flag; revoking an absent or already revoked token is not an error.
    async fn revoke(&self, tx: Option<&mut TxHandle>, jti: Uuid) -> Result<bool, StoreError>;

    async fn delete_expired(&self, tx: Option<&mut TxHandle>) -> Result<u64, StoreError>;
}
