// src/database.rs

//! Folding rollback failures into the error that caused the rollback.

use async_trait::async_trait;
use tracing::warn;

/// An open transaction that can be rolled back.
///
/// Implement it for the transaction type of whichever driver is in use.
#[async_trait]
pub trait Rollback: Send {
    type Error: std::fmt::Display + Send;

    async fn rollback(self) -> Result<(), Self::Error>;
}

/// Rolls `tx` back and returns the error to report.
///
/// That is `pending` when the rollback succeeds, and the rollback's own error
/// when it does not. Lets a sequence of statements bail out with a single
/// `return Err(rollback_or(tx, e).await)`.
pub async fn rollback_or<T, E>(tx: T, pending: E) -> E
where
    T: Rollback,
    E: From<T::Error>,
{
    match tx.rollback().await {
        Ok(()) => pending,
        Err(e) => {
            warn!("Transaction rollback failed: {e}");
            E::from(e)
        }
    }
}
