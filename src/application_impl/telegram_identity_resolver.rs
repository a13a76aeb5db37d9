use crate::application_port::{IdentityError, IdentityResolver};
use crate::domain_model::{TelegramIdentity, UserId};
use chrono::Utc;
use hmac::{Hmac, KeyInit, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;

const WEB_APP_DATA_KEY: &[u8] = b"WebAppData";

#[derive(Debug, Deserialize)]
struct InitDataUser {
    id: i64,
    first_name: String,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
}

impl From<InitDataUser> for TelegramIdentity {
    fn from(user: InitDataUser) -> Self {
        TelegramIdentity {
            user_id: UserId(user.id),
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            photo_url: user.photo_url,
        }
    }
}

/// Verifies init data signed by Telegram for this bot.
pub struct TelegramIdentityResolver {
    secret_key: Vec<u8>,
    ttl: Duration,
}

impl TelegramIdentityResolver {
    /// `ttl` bounds the age of `auth_date`; zero turns the check off.
    pub fn new(bot_token: &str, ttl: Duration) -> anyhow::Result<Self> {
        let mut mac = Hmac::<Sha256>::new_from_slice(WEB_APP_DATA_KEY)?;
        mac.update(bot_token.as_bytes());
        let secret_key = mac.finalize().into_bytes().to_vec();
        Ok(Self { secret_key, ttl })
    }

    fn check_hash(&self, data_check_string: &str, hash_hex: &str) -> Result<(), IdentityError> {
        let expected = hex::decode(hash_hex).map_err(|_| IdentityError::SignatureMismatch)?;
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.secret_key)
            .map_err(|e| IdentityError::Malformed(e.to_string()))?;
        mac.update(data_check_string.as_bytes());
        mac.verify_slice(&expected)
            .map_err(|_| IdentityError::SignatureMismatch)
    }

    fn check_auth_date(&self, auth_date: Option<&str>) -> Result<(), IdentityError> {
        if self.ttl.is_zero() {
            return Ok(());
        }
        let auth_date = auth_date
            .ok_or_else(|| IdentityError::Malformed("auth_date missing".into()))?
            .parse::<i64>()
            .map_err(|e| IdentityError::Malformed(format!("auth_date: {e}")))?;

        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        if auth_date.saturating_add(ttl) < Utc::now().timestamp() {
            return Err(IdentityError::Expired);
        }
        Ok(())
    }
}

/// Builds the data-check string: every pair except `hash`, sorted by key,
/// `key=value` joined with `\n`.
fn data_check_string(pairs: &[(String, String)]) -> String {
    let mut check_pairs: Vec<String> = pairs
        .iter()
        .filter(|(k, _)| k != "hash")
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    check_pairs.sort();
    check_pairs.join("\n")
}

fn lookup<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

impl IdentityResolver for TelegramIdentityResolver {
    fn verify(&self, init_data: &str) -> Result<TelegramIdentity, IdentityError> {
        if init_data.trim().is_empty() {
            return Err(IdentityError::Empty);
        }

        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(init_data.as_bytes())
            .into_owned()
            .collect();

        let hash = lookup(&pairs, "hash").ok_or(IdentityError::MissingHash)?;
        self.check_hash(&data_check_string(&pairs), hash)?;
        self.check_auth_date(lookup(&pairs, "auth_date"))?;

        let user_json =
            lookup(&pairs, "user").ok_or_else(|| IdentityError::Malformed("user missing".into()))?;
        let user: InitDataUser = serde_json::from_str(user_json)
            .map_err(|e| IdentityError::Malformed(format!("user: {e}")))?;

        Ok(user.into())
    }
}

/// Accepts `fake-init-data:<telegram id>` and nothing else. Local development only.
#[derive(Debug, Default)]
pub struct FakeIdentityResolver;

impl FakeIdentityResolver {
    pub fn new() -> Self {
        Self
    }
}

impl IdentityResolver for FakeIdentityResolver {
    fn verify(&self, init_data: &str) -> Result<TelegramIdentity, IdentityError> {
        if init_data.is_empty() {
            return Err(IdentityError::Empty);
        }
        let id = init_data
            .strip_prefix("fake-init-data:")
            .ok_or(IdentityError::SignatureMismatch)?
            .parse::<i64>()
            .map_err(|e| IdentityError::Malformed(e.to_string()))?;

        Ok(TelegramIdentity {
            user_id: UserId(id),
            username: Some(format!("fake_user_{id}")),
            first_name: "Fake".to_string(),
            last_name: None,
            photo_url: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOT_TOKEN: &str = "123456:test-bot-token";
    const USER_JSON: &str = r#"{"id":42,"first_name":"Ada","last_name":"Lovelace","username":"ada","language_code":"en"}"#;

    fn sign(pairs: &[(&str, String)]) -> String {
        let owned: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();

        let mut secret = Hmac::<Sha256>::new_from_slice(WEB_APP_DATA_KEY).unwrap();
        secret.update(BOT_TOKEN.as_bytes());
        let secret = secret.finalize().into_bytes();

        let mut mac = Hmac::<Sha256>::new_from_slice(&secret).unwrap();
        mac.update(data_check_string(&owned).as_bytes());
        let hash = hex::encode(mac.finalize().into_bytes());

        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &owned {
            serializer.append_pair(k, v);
        }
        serializer.append_pair("hash", &hash);
        serializer.finish()
    }

    fn init_data(auth_date: i64) -> String {
        sign(&[
            ("query_id", "AAHdF6IQAAAAAN0XohDhrOrc".to_string()),
            ("user", USER_JSON.to_string()),
            ("auth_date", auth_date.to_string()),
        ])
    }

    fn resolver(ttl: Duration) -> TelegramIdentityResolver {
        TelegramIdentityResolver::new(BOT_TOKEN, ttl).unwrap()
    }

    #[test]
    fn valid_init_data_yields_identity() {
        let data = init_data(Utc::now().timestamp());

        let identity = resolver(Duration::from_secs(86400)).verify(&data).unwrap();

        assert_eq!(identity.user_id, UserId(42));
        assert_eq!(identity.first_name, "Ada");
        assert_eq!(identity.last_name.as_deref(), Some("Lovelace"));
        assert_eq!(identity.username.as_deref(), Some("ada"));
        assert_eq!(identity.photo_url, None);
    }

    #[test]
    fn pair_order_does_not_matter() {
        let now = Utc::now().timestamp().to_string();
        let data = sign(&[
            ("user", USER_JSON.to_string()),
            ("auth_date", now),
            ("query_id", "AAHdF6IQ".to_string()),
        ]);

        assert!(resolver(Duration::from_secs(60)).verify(&data).is_ok());
    }

    #[test]
    fn altered_field_breaks_signature() {
        let data = init_data(Utc::now().timestamp());
        let tampered = data.replace("Ada", "Eve");

        assert!(matches!(
            resolver(Duration::from_secs(86400)).verify(&tampered),
            Err(IdentityError::SignatureMismatch)
        ));
    }

    #[test]
    fn other_bot_token_is_rejected() {
        let data = init_data(Utc::now().timestamp());
        let other = TelegramIdentityResolver::new("654321:other", Duration::ZERO).unwrap();

        assert!(matches!(
            other.verify(&data),
            Err(IdentityError::SignatureMismatch)
        ));
    }

    #[test]
    fn stale_auth_date_is_expired() {
        let data = init_data(Utc::now().timestamp() - 2 * 86400);

        assert!(matches!(
            resolver(Duration::from_secs(86400)).verify(&data),
            Err(IdentityError::Expired)
        ));
    }

    #[test]
    fn zero_ttl_skips_age_check() {
        let data = init_data(1_000_000);

        assert!(resolver(Duration::ZERO).verify(&data).is_ok());
    }

    #[test]
    fn empty_and_unhashed_input() {
        let r = resolver(Duration::ZERO);

        assert!(matches!(r.verify(""), Err(IdentityError::Empty)));
        assert!(matches!(
            r.verify("auth_date=1&user=%7B%7D"),
            Err(IdentityError::MissingHash)
        ));
    }

    #[test]
    fn signed_data_without_user_is_malformed() {
        let data = sign(&[("auth_date", Utc::now().timestamp().to_string())]);

        assert!(matches!(
            resolver(Duration::from_secs(60)).verify(&data),
            Err(IdentityError::Malformed(_))
        ));
    }

    #[test]
    fn fake_resolver_accepts_only_its_prefix() {
        let fake = FakeIdentityResolver::new();

        assert_eq!(
            fake.verify("fake-init-data:1001").unwrap().user_id,
            UserId(1001)
        );
        assert!(matches!(
            fake.verify("user=%7B%7D&hash=00"),
            Err(IdentityError::SignatureMismatch)
        ));
        assert!(matches!(
            fake.verify("fake-init-data:abc"),
            Err(IdentityError::Malformed(_))
        ));
    }
}
