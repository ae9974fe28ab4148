//! Scoped execution of a unit of work.

use escola_core::store::TransactionScope;

/// Run `work` inside a transaction opened on `scope`.
///
/// The handle is passed to `work`, which threads it through every repository
/// call that must be part of the unit. On `Ok` the transaction is committed
/// and the value returned; on `Err` it is rolled back and the error
/// propagated unchanged. Errors from `begin`/`commit` themselves are boxed
/// into `E`.
pub async fn run_in_transaction<S, T, E, F>(scope: &S, work: F) -> Result<T, E>
where
  S: TransactionScope,
  F: AsyncFnOnce(&mut S::Tx) -> Result<T, E>,
  E: From<Box<dyn std::error::Error + Send + Sync>>,
{
  let mut tx = scope.begin().await.map_err(boxed)?;

  match work(&mut tx).await {
    Ok(value) => {
      scope.commit(tx).await.map_err(boxed)?;
      Ok(value)
    }
    Err(e) => {
      if let Err(rollback) = scope.rollback(tx).await {
        tracing::warn!(error = %rollback, "rollback failed");
      }
      Err(e)
    }
  }
}

fn boxed<E: std::error::Error + Send + Sync + 'static>(
  e: E,
) -> Box<dyn std::error::Error + Send + Sync> {
  Box::new(e)
}

