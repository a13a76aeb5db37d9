use super::repo_tx_pg::PgTx;
use crate::domain_port::*;

pub fn downcast(tx: &mut TxHandle) -> Result<&mut PgTx, StoreError> {
    tx.as_any_mut()
        .downcast_mut::<PgTx>()
        .ok_or_else(|| StoreError::from(TxError::ForeignHandle))
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

pub fn store_error(err: sqlx::Error) -> StoreError {
    if is_unique_violation(&err) {
        StoreError::Conflict
    } else {
        StoreError::Backend(err.to_string())
    }
}
