use crate::domain_model::TelegramIdentity;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("init data is empty")]
    Empty,
    #[error("init data has no hash")]
    MissingHash,
    #[error("init data signature mismatch")]
    SignatureMismatch,
    #[error("init data expired")]
    Expired,
    #[error("init data malformed: {0}")]
    Malformed(String),
}

/// Turns Telegram Mini App init data into a verified identity.
pub trait IdentityResolver: Send + Sync {
    fn verify(&self, init_data: &str) -> Result<TelegramIdentity, IdentityError>;
}
