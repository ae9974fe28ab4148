//! [`SqliteTx`], the transaction handle handed out by
//! [`SqliteStore::begin`](escola_core::store::TransactionScope::begin).

use tokio::sync::OwnedMutexGuard;

use crate::Result;

/// An open `BEGIN IMMEDIATE` transaction on the store's connection.
///
/// The handle owns the store's gate until it is committed, rolled back or
/// dropped. Dropping an unfinished handle schedules a `ROLLBACK` that still
/// holds the gate, so the next user of the connection never sees its writes.
pub struct SqliteTx {
  pub(crate) conn: tokio_rusqlite::Connection,
  guard:           Option<OwnedMutexGuard<()>>,
  open:            bool,
}

impl SqliteTx {
  pub(crate) async fn begin(
    conn: tokio_rusqlite::Connection,
    guard: OwnedMutexGuard<()>,
  ) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
      })
      .await?;
    Ok(Self { conn, guard: Some(guard), open: true })
  }

  pub(crate) async fn commit(mut self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch("COMMIT")?;
        Ok(())
      })
      .await?;
    self.open = false;
    Ok(())
  }

  pub(crate) async fn rollback(mut self) -> Result<()> {
    // Closed even if ROLLBACK fails; `acquire` retries it.
    self.open = false;
    self
      .conn
      .call(|conn| {
        if !conn.is_autocommit() {
          conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
      })
      .await?;
    Ok(())
  }
}

impl Drop for SqliteTx {
  fn drop(&mut self) {
    if !self.open {
      return;
    }
    let Some(guard) = self.guard.take() else { return };

    // Without a runtime the gate is released as-is; `SqliteStore::acquire`
    // rolls back any transaction it finds left open.
    let Ok(handle) = tokio::runtime::Handle::try_current() else { return };

    tracing::warn!("transaction dropped without commit; rolling back");
    let conn = self.conn.clone();
    handle.spawn(async move {
      let result = conn
        .call(|conn| {
          if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")?;
          }
          Ok(())
        })
        .await;
      if let Err(e) = result {
        tracing::error!(error = %e, "rollback of dropped transaction failed");
      }
      drop(guard);
    });
  }
}
