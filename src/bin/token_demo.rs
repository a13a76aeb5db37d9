//! Walks one refresh token through its whole life on the in-memory store.
//!
//! $ cargo run --bin token_demo
//! $ cargo run --bin token_demo -- --strict

use clap::Parser;
use niti_auth::application_impl::*;
use niti_auth::application_port::*;
use niti_auth::domain_model::UserId;
use niti_auth::infra_memory::*;
use niti_auth::logger::*;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
struct DemoCli {
    /// Roll inside a single transaction so a token can be rolled only once.
    #[arg(long)]
    strict: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = DemoCli::parse();
    let logger = Logger::new_bootstrap();
    logger.reload_from_config(&LogConfig {
        filter: "token_demo=info,niti_auth=debug".to_string(),
    })?;

    let store = MemoryStore::new();
    let token_codec: Arc<dyn TokenCodec> = Arc::new(JwtHmacCodec::new(JwtConfig {
        access_secret: b"demo-access-secret".to_vec(),
        refresh_secret: b"demo-refresh-secret".to_vec(),
        access_ttl: Duration::from_secs(60),
        refresh_ttl: Duration::from_secs(2),
    }));
    let token_service = RealTokenService::new(
        token_codec,
        Arc::new(MemoryRefreshTokenRepo::new(store.clone())),
        Arc::new(MemoryTxManager::new(store.clone())),
    )
    .with_strict_rotation(cli.strict);

    let identity = FakeIdentityResolver::new().verify("fake-init-data:42")?;
    println!("identity      -> {:?}", identity);

    let pair = token_service.generate_tokens(identity.user_id).await?;
    println!("issued        -> jti={} expires_in={:?}", pair.jti, pair.expires_in);

    let user: UserId = token_service.validate_access_token(&pair.access_token.0)?;
    println!("access valid  -> user={}", user);

    let record = token_service
        .validate_refresh_token(&pair.refresh_token.0)
        .await?;
    println!("refresh valid -> {:?}", record);

    let rolled = token_service.roll_tokens(&record).await?;
    println!("rolled        -> new jti={}", rolled.jti);

    let replay = token_service
        .validate_refresh_token(&pair.refresh_token.0)
        .await;
    println!("old replayed  -> {:?}", replay.err());

    let second_roll = token_service.roll_tokens(&record).await;
    println!(
        "old re-rolled -> {}",
        match &second_roll {
            Ok(p) => format!("ok, jti={}", p.jti),
            Err(e) => format!("refused: {e}"),
        }
    );

    tokio::time::sleep(Duration::from_secs(3)).await;
    let lapsed = token_service
        .validate_refresh_token(&rolled.refresh_token.0)
        .await;
    println!("after 3s      -> {:?}", lapsed.err());

    let purged = token_service.purge_expired().await?;
    println!("purged        -> {} rows", purged);

    Ok(())
}
