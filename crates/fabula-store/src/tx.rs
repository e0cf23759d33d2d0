//! Transaction manager
//!
//! A [`Tx`] owns the writer lock for its whole lifetime, so it never races
//! another writer. Dropping a `Tx` without committing rolls it back.

use crate::db::Database;
use crate::error::map_internal;
use fabula_core::{Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use sqlx::{SqliteConnection, Sqlite, Transaction};
use std::panic::AssertUnwindSafe;
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// An open transaction
pub struct Tx {
    inner: Transaction<'static, Sqlite>,
    _writer: OwnedMutexGuard<()>,
}

impl Tx {
    /// Connection to run statements on inside the transaction
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.inner
    }

    /// Commit every statement run on this transaction
    pub async fn commit(self) -> Result<()> {
        self.inner.commit().await.map_err(map_internal)
    }

    /// Discard every statement run on this transaction
    pub async fn rollback(self) -> Result<()> {
        self.inner.rollback().await.map_err(map_internal)
    }
}

impl Database {
    /// Begin a transaction, waiting for the writer lock first
    pub async fn begin_tx(&self) -> Result<Tx> {
        let writer = self.writer.clone().lock_owned().await;
        let inner = self.pool().begin().await.map_err(map_internal)?;
        Ok(Tx {
            inner,
            _writer: writer,
        })
    }

    /// Run `f` inside a transaction
    ///
    /// Commits when `f` returns `Ok`. On `Err` the transaction is rolled back
    /// and the original error is returned; a failing rollback is logged, never
    /// returned in its place. On panic the transaction is rolled back and the
    /// panic resumes.
    pub async fn with_tx<T, F>(&self, f: F) -> Result<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut Tx) -> BoxFuture<'t, Result<T>> + Send,
    {
        let mut tx = self.begin_tx().await?;
        let outcome = AssertUnwindSafe(f(&mut tx)).catch_unwind().await;

        match outcome {
            Ok(Ok(value)) => {
                tx.commit().await?;
                debug!("Transaction committed");
                Ok(value)
            }
            Ok(Err(err)) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed after error: {err}");
                }
                Err(err)
            }
            Err(panic) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed after panic");
                }
                std::panic::resume_unwind(panic)
            }
        }
    }

    /// [`Database::with_tx`] that gives up when `cancel` fires
    ///
    /// The in-flight transaction is dropped, which rolls it back, and
    /// `Error::Cancelled` is returned.
    pub async fn with_tx_cancellable<T, F>(&self, cancel: &CancellationToken, f: F) -> Result<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut Tx) -> BoxFuture<'t, Result<T>> + Send,
    {
        tokio::select! {
            result = self.with_tx(f) => result,
            _ = cancel.cancelled() => {
                warn!("Transaction cancelled by caller");
                Err(Error::Cancelled)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;
    use std::time::Duration;

    const INSERT_TENANT: &str =
        "INSERT INTO tenants (id, name, status, created_at, updated_at) VALUES (?1, ?2, 'active', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')";

    async fn tenant_count(db: &Database) -> i64 {
        db.fetch_one(sqlx::query("SELECT COUNT(*) AS n FROM tenants"))
            .await
            .unwrap()
            .get("n")
    }

    #[tokio::test]
    async fn test_with_tx_commits() {
        let db = Database::in_memory().await.unwrap();
        let id = uuid::Uuid::new_v4().to_string();

        let value = db
            .with_tx(|tx| {
                Box::pin(async move {
                    sqlx::query(INSERT_TENANT)
                        .bind(id)
                        .bind("committed")
                        .execute(tx.conn())
                        .await
                        .map_err(map_internal)?;
                    Ok(42)
                })
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(tenant_count(&db).await, 1);
    }

    #[tokio::test]
    async fn test_with_tx_rolls_back_on_error() {
        let db = Database::in_memory().await.unwrap();
        let id = uuid::Uuid::new_v4().to_string();

        let err = db
            .with_tx(|tx| {
                Box::pin(async move {
                    sqlx::query(INSERT_TENANT)
                        .bind(id)
                        .bind("doomed")
                        .execute(tx.conn())
                        .await
                        .map_err(map_internal)?;
                    Err::<(), _>(Error::conflict("tenant", "abort"))
                })
            })
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(tenant_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_with_tx_rolls_back_on_panic() {
        let db = Database::in_memory().await.unwrap();
        let id = uuid::Uuid::new_v4().to_string();

        let result = AssertUnwindSafe(db.with_tx(|tx| {
            Box::pin(async move {
                sqlx::query(INSERT_TENANT)
                    .bind(id)
                    .bind("panicky")
                    .execute(tx.conn())
                    .await
                    .map_err(map_internal)?;
                let explode = true;
                if explode {
                    panic!("boom");
                }
                Ok(())
            })
        }))
        .catch_unwind()
        .await;

        assert!(result.is_err());
        assert_eq!(tenant_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_with_tx_cancellable() {
        let db = Database::in_memory().await.unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let err = db
            .with_tx_cancellable(&token, |_tx| {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));

        // The writer lock was released with the dropped transaction.
        let mut tx = db.begin_tx().await.unwrap();
        sqlx::query("SELECT 1").execute(tx.conn()).await.unwrap();
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_tx_rolls_back() {
        let db = Database::in_memory().await.unwrap();
        {
            let mut tx = db.begin_tx().await.unwrap();
            sqlx::query(INSERT_TENANT)
                .bind(uuid::Uuid::new_v4().to_string())
                .bind("dropped")
                .execute(tx.conn())
                .await
                .unwrap();
        }
        assert_eq!(tenant_count(&db).await, 0);
    }
}
