use futures_util::future::BoxFuture;
use std::any::Any;

#[derive(Debug, Clone, thiserror::Error)]
pub enum TxError {
    #[error("begin transaction: {0}")]
    Begin(String),
    #[error("commit: {0}")]
    Commit(String),
    #[error("rollback: {0}")]
    Rollback(String),
    #[error("rollback: {rollback}, original error: {original}")]
    Aborted { rollback: String, original: String },
    #[error("transaction handle was not opened by this store")]
    ForeignHandle,
}

#[async_trait::async_trait]
pub trait TxManager: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StorageTx>, TxError>;
}

#[async_trait::async_trait]
pub trait StorageTx: Send {
    async fn commit(self: Box<Self>) -> Result<(), TxError>;
    async fn rollback(self: Box<Self>) -> Result<(), TxError>;

    /// Lets the adapter that opened the transaction get its concrete type back.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// An open transaction as handed to repository methods.
pub type TxHandle = dyn StorageTx + 'static;

/// Runs `f` inside a fresh transaction.
///
/// Commits when `f` returns `Ok`. On `Err` the transaction is rolled back and
/// the error is returned; if the rollback fails as well, both messages are
/// folded into [`TxError::Aborted`].
pub async fn with_tx<T, E, F>(manager: &dyn TxManager, f: F) -> Result<T, E>
where
    T: Send,
    E: From<TxError> + std::fmt::Display + Send,
    F: for<'c> FnOnce(&'c mut TxHandle) -> BoxFuture<'c, Result<T, E>> + Send,
{
    let mut tx = manager.begin().await?;
    let result = f(&mut *tx).await;

    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => match tx.rollback().await {
            Ok(()) => Err(e),
            Err(rollback) => Err(E::from(TxError::Aborted {
                rollback: rollback.to_string(),
                original: e.to_string(),
            })),
        },
    }
}

/// Runs `f` inside a transaction that is always rolled back.
///
/// Meant for exercising real statements against a live schema without
/// persisting anything. `f` cannot fail the transaction; only begin and
/// rollback errors are returned.
pub async fn with_rollback<F>(manager: &dyn TxManager, f: F) -> Result<(), TxError>
where
    F: for<'c> FnOnce(&'c mut TxHandle) -> BoxFuture<'c, ()> + Send,
{
    let mut tx = manager.begin().await?;
    f(&mut *tx).await;
    tx.rollback().await
}
