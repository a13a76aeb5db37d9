use super::repo_tx_memory::{MemoryStore, Tables, downcast};
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::Utc;
use std::collections::hash_map::Entry;
use uuid::Uuid;

pub struct MemoryRefreshTokenRepo {
    store: MemoryStore,
}

impl MemoryRefreshTokenRepo {
    pub fn new(store: MemoryStore) -> Self {
        MemoryRefreshTokenRepo { store }
    }

    async fn run<R, F>(&self, tx: Option<&mut TxHandle>, op: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Tables) -> R + Send,
    {
        match tx {
            Some(tx) => {
                let tx = downcast(tx, &self.store)?;
                Ok(op(tx.tables()))
            }
            None => {
                let mut tables = self.store.lock().await;
                Ok(op(&mut tables))
            }
        }
    }
}

#[async_trait::async_trait]
impl RefreshTokenRepo for MemoryRefreshTokenRepo {
    async fn insert(
        &self,
        tx: Option<&mut TxHandle>,
        token: &NewRefreshToken,
    ) -> Result<(), StoreError> {
        self.run(tx, |tables| match tables.refresh_tokens.entry(token.jti) {
            Entry::Occupied(_) => Err(StoreError::Conflict),
            Entry::Vacant(slot) => {
                slot.insert(RefreshTokenRecord {
                    jti: token.jti,
                    user_id: token.user_id,
                    expires_at: token.expires_at,
                    revoked: false,
                    created_at: Utc::now(),
                });
                Ok(())
            }
        })
        .await?
    }

    async fn get_valid(
        &self,
        tx: Option<&mut TxHandle>,
        jti: Uuid,
    ) -> Result<RefreshTokenRecord, StoreError> {
        self.run(tx, |tables| {
            tables
                .refresh_tokens
                .get(&jti)
                .filter(|record| record.is_valid_at(Utc::now()))
                .cloned()
                .ok_or(StoreError::NotFound)
        })
        .await?
    }

    async fn revoke(&self, tx: Option<&mut TxHandle>, jti: Uuid) -> Result<bool, StoreError> {
        self.run(tx, |tables| match tables.refresh_tokens.get_mut(&jti) {
            Some(record) if !record.revoked => {
                record.revoked = true;
                true
            }
            _ => false,
        })
        .await
    }

    async fn delete_expired(&self, tx: Option<&mut TxHandle>) -> Result<u64, StoreError> {
        self.run(tx, |tables| {
            let now = Utc::now();
            let before = tables.refresh_tokens.len();
            tables.refresh_tokens.retain(|_, record| record.expires_at >= now);
            (before - tables.refresh_tokens.len()) as u64
        })
        .await
    }
}
