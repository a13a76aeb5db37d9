use crate::domain_model::RefreshTokenRecord;
use crate::domain_port::{StorageTx, TxError, TxHandle, TxManager};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub refresh_tokens: HashMap<Uuid, RefreshTokenRecord>,
}

/// Shared in-process state, cloned into every adapter like a connection pool.
///
/// Transactions take the table lock for their whole lifetime, so they are
/// serialised against each other and against pool-level calls.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn lock(&self) -> tokio::sync::MutexGuard<'_, Tables> {
        self.tables.lock().await
    }

    /// Reads a row regardless of its validity.
    pub async fn find_refresh_token(&self, jti: Uuid) -> Option<RefreshTokenRecord> {
        self.tables.lock().await.refresh_tokens.get(&jti).cloned()
    }

    fn owns(&self, tx: &MemoryTx) -> bool {
        Arc::ptr_eq(&self.tables, &tx.owner)
    }
}

pub struct MemoryTxManager {
    store: MemoryStore,
}

impl MemoryTxManager {
    pub fn new(store: MemoryStore) -> Self {
        MemoryTxManager { store }
    }
}

#[async_trait::async_trait]
impl TxManager for MemoryTxManager {
    async fn begin(&self) -> Result<Box<dyn StorageTx>, TxError> {
        let guard = self.store.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx {
            owner: self.store.tables.clone(),
            guard,
            working,
        }))
    }
}

/// Writes go to a private copy that replaces the shared tables on commit.
pub struct MemoryTx {
    owner: Arc<Mutex<Tables>>,
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

impl MemoryTx {
    pub fn tables(&mut self) -> &mut Tables {
        &mut self.working
    }
}

#[async_trait::async_trait]
impl StorageTx for MemoryTx {
    async fn commit(self: Box<Self>) -> Result<(), TxError> {
        let MemoryTx {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), TxError> {
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub(crate) fn downcast<'a>(
    tx: &'a mut TxHandle,
    store: &MemoryStore,
) -> Result<&'a mut MemoryTx, TxError> {
    let tx = tx
        .as_any_mut()
        .downcast_mut::<MemoryTx>()
        .ok_or(TxError::ForeignHandle)?;
    if !store.owns(tx) {
        return Err(TxError::ForeignHandle);
    }
    Ok(tx)
}
