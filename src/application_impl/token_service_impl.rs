use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

pub struct RealTokenService {
    token_codec: Arc<dyn TokenCodec>,
    refresh_token_repo: Arc<dyn RefreshTokenRepo>,
    tx_manager: Arc<dyn TxManager>,
    strict_rotation: bool,
}

impl RealTokenService {
    pub fn new(
        token_codec: Arc<dyn TokenCodec>,
        refresh_token_repo: Arc<dyn RefreshTokenRepo>,
        tx_manager: Arc<dyn TxManager>,
    ) -> Self {
        Self {
            token_codec,
            refresh_token_repo,
            tx_manager,
            strict_rotation: false,
        }
    }

    /// Makes `roll_tokens` insert and revoke in one transaction, so a refresh
    /// token can be rolled at most once.
    pub fn with_strict_rotation(mut self, strict: bool) -> Self {
        self.strict_rotation = strict;
        self
    }

    #[inline]
    fn new_jti() -> Uuid {
        Uuid::new_v4()
    }

    /// Signs both tokens. Nothing is stored yet.
    fn mint(&self, user_id: UserId) -> Result<(TokenPair, NewRefreshToken), TokenError> {
        let issued_at = Utc::now();
        let jti = Self::new_jti();

        let (access_token, _) = self.token_codec.issue_access_token(user_id, issued_at)?;
        let (refresh_token, refresh_exp) = self
            .token_codec
            .issue_refresh_token(user_id, jti, issued_at)?;

        let pair = TokenPair {
            access_token,
            refresh_token,
            jti,
            expires_in: self.token_codec.access_ttl(),
        };
        let record = NewRefreshToken {
            jti,
            user_id,
            expires_at: refresh_exp,
        };
        Ok((pair, record))
    }

    async fn roll_strict(&self, old: &RefreshTokenRecord) -> Result<TokenPair, TokenError> {
        let (pair, record) = self.mint(old.user_id)?;
        let repo = self.refresh_token_repo.clone();
        let old_jti = old.jti;

        with_tx(self.tx_manager.as_ref(), move |tx| {
            Box::pin(async move {
                repo.insert(Some(&mut *tx), &record).await?;
                if !repo.revoke(Some(&mut *tx), old_jti).await? {
                    // someone else rolled it first
                    return Err(TokenError::NotFound);
                }
                Ok(())
            })
        })
        .await?;

        tracing::info!(user_id = %old.user_id, old_jti = %old.jti, new_jti = %pair.jti, "refresh token rolled");
        Ok(pair)
    }

    async fn roll_default(&self, old: &RefreshTokenRecord) -> Result<TokenPair, TokenError> {
        let pair = self.generate_tokens(old.user_id).await?;

        match self.refresh_token_repo.revoke(None, old.jti).await {
            Ok(flipped) => {
                if !flipped {
                    tracing::debug!(jti = %old.jti, "old refresh token was already revoked");
                }
                tracing::info!(user_id = %old.user_id, old_jti = %old.jti, new_jti = %pair.jti, "refresh token rolled");
                Ok(pair)
            }
            Err(e) => {
                tracing::warn!(
                    old_jti = %old.jti,
                    new_jti = %pair.jti,
                    error = %e,
                    "revoking rolled refresh token failed"
                );
                Err(TokenError::RevokeFailed {
                    jti: old.jti,
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[async_trait::async_trait]
impl TokenService for RealTokenService {
    async fn generate_tokens(&self, user_id: UserId) -> Result<TokenPair, TokenError> {
        let (pair, record) = self.mint(user_id)?;

        if let Err(e) = self.refresh_token_repo.insert(None, &record).await {
            tracing::warn!(user_id = %user_id, jti = %record.jti, error = %e, "storing refresh token failed");
            return Err(e.into());
        }

        tracing::debug!(user_id = %user_id, jti = %pair.jti, "token pair issued");
        Ok(pair)
    }

    fn validate_access_token(&self, token: &str) -> Result<UserId, TokenError> {
        let verify_result = self.token_codec.verify_access_token(token)?;
        Ok(verify_result.user_id)
    }

    async fn validate_refresh_token(&self, token: &str) -> Result<RefreshTokenRecord, TokenError> {
        let verify_result = match self.token_codec.verify_refresh_token(token) {
            Ok(result) => result,
            // lapsed and revoked look the same to the caller
            Err(TokenError::Expired) => return Err(TokenError::NotFound),
            Err(e) => return Err(e),
        };
        let jti = verify_result.jti.ok_or(TokenError::MalformedClaims)?;

        let record = self.refresh_token_repo.get_valid(None, jti).await?;
        if record.user_id != verify_result.user_id {
            tracing::warn!(jti = %jti, "refresh token subject does not match stored owner");
            return Err(TokenError::NotFound);
        }

        Ok(record)
    }

    async fn roll_tokens(&self, old: &RefreshTokenRecord) -> Result<TokenPair, TokenError> {
        if self.strict_rotation {
            self.roll_strict(old).await
        } else {
            self.roll_default(old).await
        }
    }

    async fn purge_expired(&self) -> Result<u64, TokenError> {
        let removed = self.refresh_token_repo.delete_expired(None).await?;
        Ok(removed)
    }
}
