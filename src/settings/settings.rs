use anyhow::{Result, anyhow, bail};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub auth: Auth,
    pub telegram: Telegram,
    pub store: Store,
    #[serde(default)]
    pub sweeper: Sweeper,
    pub http: Http,
    pub log: Log,
}

#[derive(Deserialize)]
pub struct Auth {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    #[serde(default)]
    pub strict_rotation: bool,
}

impl Auth {
    pub fn access_ttl(&self) -> Duration {
        Duration::from_secs(self.access_ttl_secs)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_ttl_secs)
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auth")
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .field("strict_rotation", &self.strict_rotation)
            .finish()
    }
}

#[derive(Deserialize)]
pub struct Telegram {
    pub backend: String, // "fake" or "real"
    #[serde(default)]
    pub bot_token: String,
    pub init_data_ttl_secs: u64, // 0 disables the auth_date check
}

impl Telegram {
    pub fn init_data_ttl(&self) -> Duration {
        Duration::from_secs(self.init_data_ttl_secs)
    }
}

impl fmt::Debug for Telegram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telegram")
            .field("backend", &self.backend)
            .field("bot_token", &"<redacted>")
            .field("init_data_ttl_secs", &self.init_data_ttl_secs)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
pub struct Store {
    pub backend: String, // "memory" or "postgres"
    #[serde(default)]
    pub dsn: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Store {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

#[derive(Debug, Deserialize)]
pub struct Sweeper {
    pub interval_secs: u64, // 0 disables the sweeper
}

impl Default for Sweeper {
    fn default() -> Self {
        Sweeper {
            interval_secs: 3600,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub address: String,
    pub request_timeout_ms: u64,
}

impl Http {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

const MAX_ACCESS_TTL_SECS: u64 = 24 * 60 * 60;
const MAX_REFRESH_TTL_SECS: u64 = 365 * 24 * 60 * 60;

impl Settings {
    /// Rejects settings the server cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.auth.access_secret.is_empty() {
            bail!("auth.access_secret is required");
        }
        if self.auth.refresh_secret.is_empty() {
            bail!("auth.refresh_secret is required");
        }
        if self.auth.access_secret == self.auth.refresh_secret {
            bail!("auth.access_secret and auth.refresh_secret must differ");
        }
        if self.auth.access_ttl_secs == 0 || self.auth.refresh_ttl_secs == 0 {
            bail!("auth token ttls must be positive");
        }
        if self.auth.access_ttl_secs > MAX_ACCESS_TTL_SECS {
            bail!("auth.access_ttl_secs must not exceed {MAX_ACCESS_TTL_SECS}");
        }
        if self.auth.refresh_ttl_secs > MAX_REFRESH_TTL_SECS {
            bail!("auth.refresh_ttl_secs must not exceed {MAX_REFRESH_TTL_SECS}");
        }

        match self.telegram.backend.as_str() {
            "real" if self.telegram.bot_token.is_empty() => {
                bail!("telegram.bot_token is required for the real backend")
            }
            "real" | "fake" => {}
            other => bail!("unknown telegram.backend: {other}"),
        }

        match self.store.backend.as_str() {
            "postgres" if self.store.dsn.is_empty() => {
                bail!("store.dsn is required for the postgres backend")
            }
            "postgres" if self.store.max_connections == 0 => {
                bail!("store.max_connections must be positive")
            }
            "postgres" | "memory" => {}
            other => bail!("unknown store.backend: {other}"),
        }

        if self.http.request_timeout_ms == 0 {
            bail!("http.request_timeout_ms must be positive");
        }

        Ok(())
    }
}

#[cfg(test)]
impl Settings {
    /// Memory store, fake Telegram backend, no database needed.
    pub fn in_memory_for_tests() -> Self {
        Settings {
            auth: Auth {
                access_secret: "access-secret-for-tests".into(),
                refresh_secret: "refresh-secret-for-tests".into(),
                access_ttl_secs: 900,
                refresh_ttl_secs: 3600,
                strict_rotation: false,
            },
            telegram: Telegram {
                backend: "fake".into(),
                bot_token: String::new(),
                init_data_ttl_secs: 0,
            },
            store: Store {
                backend: "memory".into(),
                dsn: String::new(),
                max_connections: 1,
                acquire_timeout_secs: 1,
            },
            sweeper: Sweeper { interval_secs: 60 },
            http: Http {
                address: "127.0.0.1:0".into(),
                request_timeout_ms: 2000,
            },
            log: Log {
                filter: "info".into(),
            },
        }
    }
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

/// Environment variables override the file, e.g. `NITI__AUTH__ACCESS_SECRET`.
const ENV_PREFIX: &str = "NITI";

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let builder = Config::builder()
        .add_source(File::with_name(path))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

    load(builder)
}

fn load(builder: ConfigBuilder<DefaultState>) -> Result<Settings> {
    let settings: Settings = builder
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    const BASE: &str = r#"
[auth]
access_secret = "access"
refresh_secret = "refresh"
access_ttl_secs = 900
refresh_ttl_secs = 604800

[telegram]
backend = "fake"
init_data_ttl_secs = 86400

[store]
backend = "memory"
max_connections = 5
acquire_timeout_secs = 3

[http]
address = "127.0.0.1:8080"
request_timeout_ms = 5000

[log]
filter = "info"
"#;

    fn from_toml(toml: &str) -> Result<Settings> {
        load(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    fn with_overrides(overrides: &[(&str, &str)]) -> Result<Settings> {
        let mut builder = Config::builder().add_source(File::from_str(BASE, FileFormat::Toml));
        for (key, value) in overrides {
            builder = builder.set_override(*key, *value).unwrap();
        }
        load(builder)
    }

    #[test]
    fn base_settings_load_with_defaults() {
        let settings = from_toml(BASE).unwrap();

        assert_eq!(settings.auth.access_ttl(), Duration::from_secs(900));
        assert!(!settings.auth.strict_rotation);
        assert_eq!(settings.sweeper.interval_secs, 3600);
        assert_eq!(settings.http.request_timeout(), Duration::from_millis(5000));
    }

    #[test]
    fn missing_secret_aborts() {
        let err = with_overrides(&[("auth.access_secret", "")]).unwrap_err();
        assert!(err.to_string().contains("access_secret"));

        let err = with_overrides(&[("auth.refresh_secret", "")]).unwrap_err();
        assert!(err.to_string().contains("refresh_secret"));
    }

    #[test]
    fn shared_secret_is_rejected() {
        assert!(with_overrides(&[("auth.refresh_secret", "access")]).is_err());
    }

    #[test]
    fn ttls_are_capped() {
        let err = with_overrides(&[("auth.access_ttl_secs", "86401")]).unwrap_err();
        assert!(err.to_string().contains("access_ttl_secs"));

        let err = with_overrides(&[("auth.refresh_ttl_secs", "10000000000000")]).unwrap_err();
        assert!(err.to_string().contains("refresh_ttl_secs"));

        assert!(
            with_overrides(&[
                ("auth.access_ttl_secs", "86400"),
                ("auth.refresh_ttl_secs", "31536000")
            ])
            .is_ok()
        );
    }

    #[test]
    fn real_telegram_backend_needs_bot_token() {
        assert!(with_overrides(&[("telegram.backend", "real")]).is_err());
        assert!(
            with_overrides(&[("telegram.backend", "real"), ("telegram.bot_token", "1:abc")])
                .is_ok()
        );
    }

    #[test]
    fn postgres_backend_needs_dsn() {
        assert!(with_overrides(&[("store.backend", "postgres")]).is_err());
        assert!(
            with_overrides(&[
                ("store.backend", "postgres"),
                ("store.dsn", "postgres://localhost/niti")
            ])
            .is_ok()
        );
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!(with_overrides(&[("store.backend", "sqlite")]).is_err());
    }

    #[test]
    fn secrets_stay_out_of_debug_output() {
        let settings = from_toml(BASE).unwrap();
        let printed = format!("{settings:?}");

        assert!(!printed.contains("\"access\""));
        assert!(printed.contains("<redacted>"));
    }
}
