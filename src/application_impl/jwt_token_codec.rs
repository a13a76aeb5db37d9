use crate::application_port::*;
use crate::domain_model::UserId;
use base64::Engine as _;
use chrono::{DateTime, SubsecRound, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

#[derive(Clone)]
pub struct JwtConfig {
    pub access_secret: Vec<u8>,
    pub refresh_secret: Vec<u8>,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AccessClaims {
    sub: String, // user id as string
    iat: i64,
    exp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct RefreshClaims {
    sub: String,
    jti: String, // primary key of the refresh_tokens row
    iat: i64,
    exp: i64,
}

const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

// Only the HMAC family verifies; anything else in the header is refused before
// the signature is even looked at.
const ACCEPTED_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

fn validation() -> Validation {
    let mut v = Validation::new(SIGNING_ALGORITHM);
    v.algorithms = ACCEPTED_ALGORITHMS.to_vec();
    v.validate_exp = true;
    v.leeway = 0;
    v.set_required_spec_claims(&["exp", "sub"]);
    v
}

// Whole seconds, matching the `exp` claim exactly.
fn expires_at(issued_at: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>, TokenError> {
    let ttl = chrono::Duration::from_std(ttl).map_err(|e| TokenError::Internal(e.to_string()))?;
    issued_at
        .checked_add_signed(ttl)
        .map(|exp| exp.trunc_subsecs(0))
        .ok_or_else(|| TokenError::Internal(format!("ttl {ttl} overflows the expiry timestamp")))
}

#[derive(Deserialize)]
struct RawHeader {
    alg: Option<String>,
}

/// Reads `alg` straight from the header segment. jsonwebtoken refuses to parse
/// names it has no `Algorithm` for (`none` among them), which would otherwise
/// surface as a generic decode error.
fn declared_algorithm(token: &str) -> Option<String> {
    let header = token.split('.').next()?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(header)
        .ok()?;
    serde_json::from_slice::<RawHeader>(&bytes).ok()?.alg
}

fn is_accepted(alg: &str) -> bool {
    alg.parse::<Algorithm>()
        .is_ok_and(|alg| ACCEPTED_ALGORITHMS.contains(&alg))
}

fn sign<C: Serialize>(claims: &C, secret: &[u8]) -> Result<String, TokenError> {
    encode(
        &Header::new(SIGNING_ALGORITHM),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| TokenError::Internal(e.to_string()))
}

fn verify<C: DeserializeOwned>(token: &str, secret: &[u8]) -> Result<C, TokenError> {
    let data = decode::<C>(token, &DecodingKey::from_secret(secret), &validation()).map_err(
        |e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::InvalidKeyFormat => TokenError::InvalidSignature,
            _ => match declared_algorithm(token) {
                Some(alg) if !is_accepted(&alg) => TokenError::InvalidSignature,
                _ => TokenError::MalformedClaims,
            },
        },
    )?;
    Ok(data.claims)
}

pub struct JwtHmacCodec {
    cfg: JwtConfig,
}

impl JwtHmacCodec {
    pub fn new(cfg: JwtConfig) -> Self {
        JwtHmacCodec { cfg }
    }

    #[inline]
    fn parse_user_id(sub: &str) -> Result<UserId, TokenError> {
        sub.parse::<UserId>().map_err(|_| TokenError::MalformedClaims)
    }
}

impl TokenCodec for JwtHmacCodec {
    fn access_ttl(&self) -> Duration {
        self.cfg.access_ttl
    }

    fn refresh_ttl(&self) -> Duration {
        self.cfg.refresh_ttl
    }

    fn issue_access_token(
        &self,
        user: UserId,
        issued_at: DateTime<Utc>,
    ) -> Result<(AccessToken, DateTime<Utc>), TokenError> {
        let exp_dt = expires_at(issued_at, self.cfg.access_ttl)?;
        let claims = AccessClaims {
            sub: user.to_string(),
            iat: issued_at.timestamp(),
            exp: exp_dt.timestamp(),
        };
        let token = sign(&claims, &self.cfg.access_secret)?;
        Ok((AccessToken(token), exp_dt))
    }

    fn issue_refresh_token(
        &self,
        user: UserId,
        jti: Uuid,
        issued_at: DateTime<Utc>,
    ) -> Result<(RefreshToken, DateTime<Utc>), TokenError> {
        let exp_dt = expires_at(issued_at, self.cfg.refresh_ttl)?;
        let claims = RefreshClaims {
            sub: user.to_string(),
            jti: jti.to_string(),
            iat: issued_at.timestamp(),
            exp: exp_dt.timestamp(),
        };
        let token = sign(&claims, &self.cfg.refresh_secret)?;
        Ok((RefreshToken(token), exp_dt))
    }

    fn verify_access_token(&self, token: &str) -> Result<TokenVerifyResult, TokenError> {
        let claims: AccessClaims = verify(token, &self.cfg.access_secret)?;
        let user_id = Self::parse_user_id(&claims.sub)?;
        Ok(TokenVerifyResult { user_id, jti: None })
    }

    fn verify_refresh_token(&self, token: &str) -> Result<TokenVerifyResult, TokenError> {
        let claims: RefreshClaims = verify(token, &self.cfg.refresh_secret)?;
        let user_id = Self::parse_user_id(&claims.sub)?;
        let jti = Uuid::parse_str(&claims.jti).map_err(|_| TokenError::MalformedClaims)?;
        Ok(TokenVerifyResult {
            user_id,
            jti: Some(jti),
        })
    }
}
