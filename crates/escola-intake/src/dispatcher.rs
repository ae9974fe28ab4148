//! Deferred materialization of pending documents.
//!
//! The dispatcher claims tasks from the [`MaterializationQueue`], uploads the
//! two documents of each task concurrently, and finalizes whichever uploads
//! succeed. A failed upload leaves its document Pending; the task is marked
//! done with the failure recorded and is not retried.
//!
//! A task whose worker stopped before completing it (crash, killed process)
//! stays `Running` until its claim is older than the claim timeout, after
//! which any dispatcher picks it up again.

use std::{future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::{sync::Notify, task::JoinSet};

use escola_core::{
  materialization::{MaterializationTask, PendingUpload, UploadFailure},
  storage::StorageUploader,
  store::{DocumentStore, MaterializationQueue},
};

/// How long a claim is honoured before the task is handed out again.
pub const DEFAULT_CLAIM_TIMEOUT: Duration = Duration::from_secs(300);

// ─── Signal ──────────────────────────────────────────────────────────────────

/// Wakes a sleeping dispatcher when new work has been queued.
///
/// A notification sent while the dispatcher is busy is kept and consumed on
/// its next wait, so wake-ups are never lost.
#[derive(Debug, Clone, Default)]
pub struct DispatchSignal(Arc<Notify>);

impl DispatchSignal {
  pub fn new() -> Self { Self::default() }

  pub fn notify(&self) { self.0.notify_one(); }

  pub async fn notified(&self) { self.0.notified().await }
}

// ─── Dispatcher ──────────────────────────────────────────────────────────────

pub struct MaterializationDispatcher<S, U> {
  store:         Arc<S>,
  uploader:      Arc<U>,
  signal:        DispatchSignal,
  interval:      Duration,
  claim_timeout: Duration,
}

impl<S, U> Clone for MaterializationDispatcher<S, U> {
  fn clone(&self) -> Self {
    Self {
      store:         self.store.clone(),
      uploader:      self.uploader.clone(),
      signal:        self.signal.clone(),
      interval:      self.interval,
      claim_timeout: self.claim_timeout,
    }
  }
}

impl<S, U> MaterializationDispatcher<S, U>
where
  S: DocumentStore + MaterializationQueue + 'static,
  U: StorageUploader + 'static,
{
  /// `interval` bounds how long an idle dispatcher sleeps before polling
  /// the queue again without a signal.
  pub fn new(
    store: Arc<S>,
    uploader: Arc<U>,
    signal: DispatchSignal,
    interval: Duration,
  ) -> Self {
    Self { store, uploader, signal, interval, claim_timeout: DEFAULT_CLAIM_TIMEOUT }
  }

  /// Replace [`DEFAULT_CLAIM_TIMEOUT`].
  pub fn with_claim_timeout(mut self, claim_timeout: Duration) -> Self {
    self.claim_timeout = claim_timeout;
    self
  }

  /// Claims older than this have been abandoned.
  fn stale_before(&self) -> DateTime<Utc> {
    chrono::Duration::from_std(self.claim_timeout)
      .ok()
      .and_then(|timeout| Utc::now().checked_sub_signed(timeout))
      .unwrap_or(DateTime::<Utc>::MIN_UTC)
  }

  /// Run forever, processing each claimed task on its own tokio task.
  pub async fn run(&self) { self.run_until(std::future::pending()).await }

  /// Like [`run`](Self::run), but stop claiming once `shutdown` resolves.
  /// Tasks already claimed are processed to completion before returning.
  pub async fn run_until(&self, shutdown: impl Future<Output = ()>) {
    tracing::info!(interval = ?self.interval, "materialization dispatcher started");
    tokio::pin!(shutdown);
    let mut in_flight = JoinSet::new();

    loop {
      while let Some(joined) = in_flight.try_join_next() {
        log_join(joined);
      }

      match self.store.claim_next(self.stale_before()).await {
        Ok(Some(task)) => {
          let this = self.clone();
          in_flight.spawn(async move {
            let task_id = task.task_id;
            if let Err(e) = this.process(task).await {
              tracing::error!(%task_id, error = %e, "failed to complete materialization task");
            }
          });

          // Keep claiming while there is work, unless asked to stop.
          tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = std::future::ready(()) => continue,
          }
        }
        Ok(None) => {}
        Err(e) => tracing::error!(error = %e, "failed to claim materialization task"),
      }

      tokio::select! {
        _ = &mut shutdown => break,
        _ = self.signal.notified() => {}
        _ = tokio::time::sleep(self.interval) => {}
      }
    }

    tracing::info!(in_flight = in_flight.len(), "materialization dispatcher stopping");
    while let Some(joined) = in_flight.join_next().await {
      log_join(joined);
    }
  }

  /// Claim one task and process it to completion, returning it as
  /// recorded. `None` if nothing was claimable.
  pub async fn process_next(&self) -> Result<Option<MaterializationTask>, S::Error> {
    match self.store.claim_next(self.stale_before()).await? {
      Some(task) => Ok(Some(self.process(task).await?)),
      None => Ok(None),
    }
  }

  /// Process tasks until the queue is empty; returns how many were handled.
  pub async fn drain(&self) -> Result<usize, S::Error> {
    let mut processed = 0;
    while self.process_next().await?.is_some() {
      processed += 1;
    }
    Ok(processed)
  }

  async fn process(&self, task: MaterializationTask) -> Result<MaterializationTask, S::Error> {
    tracing::debug!(task_id = %task.task_id, enrollment_id = %task.enrollment_id, "processing");

    let [residence, history] = task.uploads();
    let (residence, history) =
      tokio::join!(self.materialize(residence), self.materialize(history));

    let failures: Vec<UploadFailure> = [residence, history]
      .into_iter()
      .filter_map(Result::err)
      .collect();

    if failures.is_empty() {
      tracing::info!(enrollment_id = %task.enrollment_id, "documents materialized");
    } else {
      tracing::warn!(
        enrollment_id = %task.enrollment_id,
        failed = failures.len(),
        "documents left pending",
      );
    }

    self.store.complete(task.task_id, failures).await
  }

  /// Upload one pending document and record its location.
  async fn materialize(&self, upload: &PendingUpload) -> Result<(), UploadFailure> {
    let document_id = upload.document_id;
    let fail = |reason: String| {
      tracing::warn!(%document_id, %reason, "document materialization failed");
      UploadFailure { document_id, reason }
    };

    let content = match self.store.get_document(document_id).await {
      Ok(Some(document)) => match document.content() {
        Some(content) => content.clone(),
        None => return Err(fail("document is not pending".into())),
      },
      Ok(None) => return Err(fail("document not found".into())),
      Err(e) => return Err(fail(e.to_string())),
    };

    let stored = self
      .uploader
      .upload(upload.filename.clone(), content)
      .await
      .map_err(|e| fail(format!("upload failed: {e}")))?;

    self
      .store
      .finalize(document_id, stored.url.clone())
      .await
      .map_err(|e| fail(format!("finalize failed: {e}")))?;

    tracing::debug!(%document_id, location = %stored.url, "document finalized");
    Ok(())
  }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
  if let Err(e) = joined {
    tracing::error!(error = %e, "materialization task panicked");
  }
}
