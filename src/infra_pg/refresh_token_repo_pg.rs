use super::util::{downcast, store_error};
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgQueryResult, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct PgRefreshTokenRepo {
    pool: PgPool,
}

impl PgRefreshTokenRepo {
    pub fn new(pool: PgPool) -> Self {
        PgRefreshTokenRepo { pool }
    }

    fn row_to_record(row: PgRow) -> Result<RefreshTokenRecord, StoreError> {
        let jti: Uuid = row.try_get("jti").map_err(store_error)?;
        let user_id: UserId = row.try_get("user_id").map_err(store_error)?;
        let expires_at: DateTime<Utc> = row.try_get("expires_at").map_err(store_error)?;
        let revoked: bool = row.try_get("revoked").map_err(store_error)?;
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(store_error)?;

        Ok(RefreshTokenRecord {
            jti,
            user_id,
            expires_at,
            revoked,
            created_at,
        })
    }

    async fn execute(
        &self,
        tx: Option<&mut TxHandle>,
        query: sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<PgQueryResult, StoreError> {
        let result = match tx {
            Some(tx) => query.execute(downcast(tx)?.conn()).await,
            None => query.execute(&self.pool).await,
        };
        result.map_err(store_error)
    }
}

#[async_trait::async_trait]
impl RefreshTokenRepo for PgRefreshTokenRepo {
    async fn insert(
        &self,
        tx: Option<&mut TxHandle>,
        token: &NewRefreshToken,
    ) -> Result<(), StoreError> {
        let query = sqlx::query(
            r#"
INSERT INTO refresh_tokens (jti, user_id, expires_at)
VALUES ($1, $2, $3)
"#,
        )
        .bind(token.jti)
        .bind(token.user_id)
        .bind(token.expires_at);

        self.execute(tx, query).await?;
        Ok(())
    }

    async fn get_valid(
        &self,
        tx: Option<&mut TxHandle>,
        jti: Uuid,
    ) -> Result<RefreshTokenRecord, StoreError> {
        let query = sqlx::query(
            r#"
SELECT jti, user_id, expires_at, revoked, created_at
FROM refresh_tokens
WHERE jti = $1
  AND revoked = false
  AND expires_at > now()
"#,
        )
        .bind(jti);

        let row_opt: Option<PgRow> = match tx {
            Some(tx) => query.fetch_optional(downcast(tx)?.conn()).await,
            None => query.fetch_optional(&self.pool).await,
        }
        .map_err(store_error)?;

        row_opt
            .map(Self::row_to_record)
            .transpose()?
            .ok_or(StoreError::NotFound)
    }

    async fn revoke(&self, tx: Option<&mut TxHandle>, jti: Uuid) -> Result<bool, StoreError> {
        let query = sqlx::query(
            r#"
UPDATE refresh_tokens
SET revoked = true
WHERE jti = $1
  AND revoked = false
"#,
        )
        .bind(jti);

        let result = self.execute(tx, query).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired(&self, tx: Option<&mut TxHandle>) -> Result<u64, StoreError> {
        let query = sqlx::query(
            r#"
DELETE FROM refresh_tokens
WHERE expires_at < now()
"#,
        );

        let result = self.execute(tx, query).await?;
        Ok(result.rows_affected())
    }
}

/// These run against a live Postgres pointed to by `TEST_DATABASE_URL`:
/// `cargo test -- --ignored`.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra_pg::{PgTxManager, REFRESH_TOKENS_SCHEMA, create_pool};
    use chrono::Duration;
    use std::sync::Arc;

    async fn setup() -> (PgPool, Arc<PgRefreshTokenRepo>, PgTxManager) {
        let dsn = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
        let pool = create_pool(&dsn, 3, std::time::Duration::from_secs(5))
            .await
            .unwrap();
        sqlx::raw_sql(REFRESH_TOKENS_SCHEMA)
            .execute(&pool)
            .await
            .unwrap();
        let repo = Arc::new(PgRefreshTokenRepo::new(pool.clone()));
        let tx_manager = PgTxManager::new(pool.clone());
        (pool, repo, tx_manager)
    }

    fn new_token(ttl: Duration) -> NewRefreshToken {
        NewRefreshToken {
            jti: Uuid::new_v4(),
            user_id: UserId(42),
            expires_at: Utc::now() + ttl,
        }
    }

    async fn count(pool: &PgPool, jti: Uuid) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM refresh_tokens WHERE jti = $1")
            .bind(jti)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    #[ignore = "needs TEST_DATABASE_URL"]
    async fn crud_inside_rollback() {
        let (pool, repo, tx_manager) = setup().await;
        let token = new_token(Duration::hours(1));
        let jti = token.jti;

        with_rollback(&tx_manager, move |tx| {
            Box::pin(async move {
                repo.insert(Some(&mut *tx), &token).await.unwrap();

                let record = repo.get_valid(Some(&mut *tx), jti).await.unwrap();
                assert_eq!(record.jti, jti);
                assert_eq!(record.user_id, UserId(42));
                assert!(!record.revoked);
                assert!(record.expires_at > Utc::now());

                assert!(repo.revoke(Some(&mut *tx), jti).await.unwrap());
                assert!(!repo.revoke(Some(&mut *tx), jti).await.unwrap());
                assert!(matches!(
                    repo.get_valid(Some(&mut *tx), jti).await,
                    Err(StoreError::NotFound)
                ));

                let conn = super::downcast(&mut *tx).unwrap().conn();
                sqlx::query(
                    "UPDATE refresh_tokens SET expires_at = now() - interval '1 minute' WHERE jti = $1",
                )
                .bind(jti)
                .execute(conn)
                .await
                .unwrap();

                let deleted = repo.delete_expired(Some(&mut *tx)).await.unwrap();
                assert!(deleted >= 1);
            })
        })
        .await
        .unwrap();

        assert_eq!(count(&pool, jti).await, 0);
    }

    #[tokio::test]
    #[ignore = "needs TEST_DATABASE_URL"]
    async fn duplicate_jti_is_a_conflict() {
        let (_pool, repo, tx_manager) = setup().await;
        let token = new_token(Duration::hours(1));

        with_rollback(&tx_manager, move |tx| {
            Box::pin(async move {
                repo.insert(Some(&mut *tx), &token).await.unwrap();
                assert!(matches!(
                    repo.insert(Some(&mut *tx), &token).await,
                    Err(StoreError::Conflict)
                ));
            })
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    #[ignore = "needs TEST_DATABASE_URL"]
    async fn expired_row_fails_validity_predicate() {
        let (pool, repo, _) = setup().await;
        let token = new_token(Duration::minutes(-1));

        repo.insert(None, &token).await.unwrap();

        assert!(matches!(
            repo.get_valid(None, token.jti).await,
            Err(StoreError::NotFound)
        ));
        sqlx::query("DELETE FROM refresh_tokens WHERE jti = $1")
            .bind(token.jti)
            .execute(&pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    #[ignore = "needs TEST_DATABASE_URL"]
    async fn with_tx_commits_on_ok_and_discards_on_err() {
        let (pool, repo, tx_manager) = setup().await;
        let kept = new_token(Duration::hours(1));
        let dropped = new_token(Duration::hours(1));
        let (kept_jti, dropped_jti) = (kept.jti, dropped.jti);

        let committed: Result<(), StoreError> = with_tx(&tx_manager, {
            let repo = repo.clone();
            move |tx| Box::pin(async move { repo.insert(Some(tx), &kept).await })
        })
        .await;
        committed.unwrap();

        let failed: Result<(), StoreError> = with_tx(&tx_manager, move |tx| {
            Box::pin(async move {
                repo.insert(Some(&mut *tx), &dropped).await?;
                Err(StoreError::Backend("intentional error".into()))
            })
        })
        .await;
        assert!(failed.is_err());

        assert_eq!(count(&pool, kept_jti).await, 1);
        assert_eq!(count(&pool, dropped_jti).await, 0);

        sqlx::query("DELETE FROM refresh_tokens WHERE jti = $1")
            .bind(kept_jti)
            .execute(&pool)
            .await
            .unwrap();
    }
}
