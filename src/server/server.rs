use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_port::*;
use crate::infra_memory::*;
use crate::infra_pg::*;
use crate::logger::*;
use crate::server::ExpirySweeper;
use crate::settings::Settings;
use sqlx::PgPool;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct Server {
    pub token_service: Arc<dyn TokenService>,
    pub identity_resolver: Arc<dyn IdentityResolver>,
    pub request_timeout: Duration,
    sweeper_handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    pool: Option<PgPool>,
}

impl Server {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        settings.validate()?;

        let (refresh_token_repo, tx_manager, pool): (
            Arc<dyn RefreshTokenRepo>,
            Arc<dyn TxManager>,
            Option<PgPool>,
        ) = match settings.store.backend.as_str() {
            "postgres" => {
                let pool = create_pool(
                    &settings.store.dsn,
                    settings.store.max_connections,
                    settings.store.acquire_timeout(),
                )
                .await?;
                (
                    Arc::new(PgRefreshTokenRepo::new(pool.clone())),
                    Arc::new(PgTxManager::new(pool.clone())),
                    Some(pool),
                )
            }
            "memory" => {
                warn!("using the in-memory store; refresh tokens will not survive a restart");
                let store = MemoryStore::new();
                (
                    Arc::new(MemoryRefreshTokenRepo::new(store.clone())),
                    Arc::new(MemoryTxManager::new(store)),
                    None,
                )
            }
            other => return Err(anyhow::anyhow!("Unknown store backend: {}", other)),
        };

        let token_codec: Arc<dyn TokenCodec> = Arc::new(JwtHmacCodec::new(JwtConfig {
            access_secret: settings.auth.access_secret.clone().into_bytes(),
            refresh_secret: settings.auth.refresh_secret.clone().into_bytes(),
            access_ttl: settings.auth.access_ttl(),
            refresh_ttl: settings.auth.refresh_ttl(),
        }));

        let token_service: Arc<dyn TokenService> = Arc::new(
            RealTokenService::new(token_codec, refresh_token_repo, tx_manager)
                .with_strict_rotation(settings.auth.strict_rotation),
        );

        let identity_resolver: Arc<dyn IdentityResolver> =
            match settings.telegram.backend.as_str() {
                "fake" => Arc::new(FakeIdentityResolver::new()),
                "real" => Arc::new(TelegramIdentityResolver::new(
                    &settings.telegram.bot_token,
                    settings.telegram.init_data_ttl(),
                )?),
                other => return Err(anyhow::anyhow!("Unknown telegram backend: {}", other)),
            };

        // region runtime infra
        let cancel = CancellationToken::new();

        let sweeper_handle = if settings.sweeper.interval_secs > 0 {
            let sweeper = ExpirySweeper::new(
                token_service.clone(),
                Duration::from_secs(settings.sweeper.interval_secs),
                cancel.clone(),
            );
            Some(tokio::spawn(async move { sweeper.run().await }))
        } else {
            None
        };

        // endregion

        info!(
            store = %settings.store.backend,
            telegram = %settings.telegram.backend,
            strict_rotation = settings.auth.strict_rotation,
            "server started"
        );

        Ok(Self {
            token_service,
            identity_resolver,
            request_timeout: settings.http.request_timeout(),
            sweeper_handle: Mutex::new(sweeper_handle),
            cancel,
            pool,
        })
    }

    pub async fn shutdown(&self) {
        info!("server shutting down...");

        self.cancel.cancel();

        let handle = self.sweeper_handle.lock().ok().and_then(|mut lock| lock.take());
        if let Some(handle) = handle {
            let r = handle.await;
            info!("sweeper handle dropped: {:?}", r);
        }

        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}
