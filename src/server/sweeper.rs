use crate::application_port::TokenService;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Periodically garbage-collects refresh tokens past their expiry.
pub struct ExpirySweeper {
    token_service: Arc<dyn TokenService>,
    interval: Duration,
    cancellation_token: CancellationToken,
}

impl ExpirySweeper {
    pub fn new(
        token_service: Arc<dyn TokenService>,
        interval: Duration,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            token_service,
            interval,
            cancellation_token,
        }
    }

    async fn tick_once(&self) -> anyhow::Result<u64> {
        tokio::time::sleep(self.interval).await;
        let removed = self.token_service.purge_expired().await?;
        Ok(removed)
    }

    pub async fn run(&self) {
        loop {
            tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => {
                    tracing::info!("expiry sweeper shutting down...");
                    break;
                }
                result = self.tick_once() => {
                    match result {
                        Ok(0) => {}
                        Ok(removed) => tracing::info!(removed, "expired refresh tokens purged"),
                        Err(e) => tracing::error!("expiry sweeper error: {:#}", e),
                    }
                }
            }
        }
    }
}
