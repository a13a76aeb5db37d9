use crate::domain_port::{StorageTx, TxError, TxManager};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::any::Any;

pub struct PgTxManager {
    pool: PgPool,
}

impl PgTxManager {
    pub fn new(pool: PgPool) -> Self {
        PgTxManager { pool }
    }
}

#[async_trait::async_trait]
impl TxManager for PgTxManager {
    async fn begin(&self) -> Result<Box<dyn StorageTx>, TxError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| TxError::Begin(e.to_string()))?;
        Ok(Box::new(PgTx::new(tx)))
    }
}

pub struct PgTx {
    inner: Transaction<'static, Postgres>,
}

impl PgTx {
    pub fn new(inner: Transaction<'static, Postgres>) -> Self {
        PgTx { inner }
    }

    pub fn conn(&mut self) -> &mut PgConnection {
        self.inner.as_mut()
    }
}

#[async_trait::async_trait]
impl StorageTx for PgTx {
    async fn commit(self: Box<Self>) -> Result<(), TxError> {
        self.inner
            .commit()
            .await
            .map_err(|e| TxError::Commit(e.to_string()))
    }

    async fn rollback(self: Box<Self>) -> Result<(), TxError> {
        self.inner
            .rollback()
            .await
            .map_err(|e| TxError::Rollback(e.to_string()))
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
