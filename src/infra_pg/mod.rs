mod refresh_token_repo_pg;

pub use refresh_token_repo_pg::*;

mod repo_tx_pg;

pub use repo_tx_pg::*;

mod util;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

pub async fn create_pool(
    dsn: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(dsn)
        .await?;
    Ok(pool)
}

/// DDL for the `refresh_tokens` table, kept next to the queries that use it.
pub const REFRESH_TOKENS_SCHEMA: &str =
    include_str!("../../migrations/20250101000000_refresh_tokens.sql");
