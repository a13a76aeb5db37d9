use super::error::*;
use crate::application_port::*;
use crate::domain_model::{TelegramIdentity, UserId};
use crate::logger::*;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use warp::{self, reject};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(code: ApiErrorCode, message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Awaits a service call, giving up after `timeout`. Dropping the future
/// cancels any store work still in flight.
async fn bounded<T, F>(timeout: Duration, fut: F) -> Result<T, warp::Rejection>
where
    F: Future<Output = Result<T, TokenError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(ApiErrorCode::from).map_err(reject::custom),
        Err(_) => {
            warn!(?timeout, "service call timed out");
            Err(reject::custom(ApiErrorCode::Timeout))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        TokenResponse {
            access_token: pair.access_token.0,
            refresh_token: pair.refresh_token.0,
            expires_in: pair.expires_in.as_secs(),
        }
    }
}

#[derive(Deserialize)]
pub struct TelegramLoginRequest {
    pub init_data: String,
}

#[derive(Debug, Serialize)]
pub struct TelegramLoginResponse {
    #[serde(flatten)]
    pub tokens: TokenResponse,
    pub user: TelegramIdentity,
}

pub async fn telegram_login(
    body: TelegramLoginRequest,
    identity_resolver: Arc<dyn IdentityResolver>,
    token_service: Arc<dyn TokenService>,
    timeout: Duration,
) -> Result<impl warp::Reply, warp::Rejection> {
    let identity = identity_resolver
        .verify(&body.init_data)
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    let pair = bounded(timeout, token_service.generate_tokens(identity.user_id)).await?;
    info!(user_id = %identity.user_id, jti = %pair.jti, "telegram login");

    let response = TelegramLoginResponse {
        tokens: pair.into(),
        user: identity,
    };
    Ok(warp::reply::json(&ApiResponse::ok(response)))
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn refresh(
    body: RefreshRequest,
    token_service: Arc<dyn TokenService>,
    timeout: Duration,
) -> Result<impl warp::Reply, warp::Rejection> {
    let pair = bounded(timeout, async {
        let old = token_service
            .validate_refresh_token(&body.refresh_token)
            .await?;
        token_service.roll_tokens(&old).await
    })
    .await?;

    Ok(warp::reply::json(&ApiResponse::ok(TokenResponse::from(pair))))
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user_id: UserId,
}

pub async fn me(user_id: UserId) -> Result<impl warp::Reply, warp::Rejection> {
    Ok(warp::reply::json(&ApiResponse::ok(MeResponse { user_id })))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn health() -> Result<impl warp::Reply, warp::Rejection> {
    Ok(warp::reply::json(&ApiResponse::ok(HealthResponse { status: "ok" })))
}
