//! [`MaterializationQueue`] for [`SqliteStore`]: the `materialization_tasks`
//! table used as an outbox between committed enrollments and the dispatcher.

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use escola_core::{
  materialization::{MaterializationTask, NewMaterialization, TaskStatus, UploadFailure},
  store::MaterializationQueue,
};

use crate::{
  Error, Result, SqliteStore,
  encode::{RawTask, encode_dt, encode_failures, encode_uuid},
};

impl MaterializationQueue for SqliteStore {
  async fn enqueue(&self, input: NewMaterialization) -> Result<MaterializationTask> {
    let task = MaterializationTask {
      task_id:            Uuid::new_v4(),
      enrollment_id:      input.enrollment_id,
      proof_of_residence: input.proof_of_residence,
      academic_history:   input.academic_history,
      status:             TaskStatus::Queued,
      enqueued_at:        Utc::now(),
      claimed_at:         None,
      finished_at:        None,
      failures:           Vec::new(),
    };

    let task_id_str        = encode_uuid(task.task_id);
    let enrollment_str     = encode_uuid(task.enrollment_id);
    let residence_id_str   = encode_uuid(task.proof_of_residence.document_id);
    let residence_filename = task.proof_of_residence.filename.clone();
    let history_id_str     = encode_uuid(task.academic_history.document_id);
    let history_filename   = task.academic_history.filename.clone();
    let status_str         = task.status.to_string();
    let at_str             = encode_dt(task.enqueued_at);

    let _gate = self.acquire().await?;
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO materialization_tasks (
             task_id, enrollment_id,
             residence_document_id, residence_filename,
             history_document_id, history_filename,
             status, enqueued_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            task_id_str,
            enrollment_str,
            residence_id_str,
            residence_filename,
            history_id_str,
            history_filename,
            status_str,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(task)
  }

  async fn claim_next(&self, stale_before: DateTime<Utc>) -> Result<Option<MaterializationTask>> {
    let at_str    = encode_dt(Utc::now());
    let stale_str = encode_dt(stale_before);

    let _gate = self.acquire().await?;
    let raw: Option<RawTask> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let next: Option<String> = tx
          .query_row(
            "SELECT task_id FROM materialization_tasks
              WHERE status = 'queued'
                 OR (status = 'running' AND claimed_at < ?1)
              ORDER BY enqueued_at, rowid
              LIMIT 1",
            rusqlite::params![stale_str],
            |r| r.get(0),
          )
          .optional()?;

        let Some(task_id) = next else {
          return Ok(None);
        };

        tx.execute(
          "UPDATE materialization_tasks
              SET status = 'running', claimed_at = ?2
            WHERE task_id = ?1",
          rusqlite::params![task_id, at_str],
        )?;

        let raw = tx.query_row(
          &format!("SELECT {} FROM materialization_tasks WHERE task_id = ?1", RawTask::COLUMNS),
          rusqlite::params![task_id],
          RawTask::from_row,
        )?;

        tx.commit()?;
        Ok(Some(raw))
      })
      .await?;

    raw.map(RawTask::into_task).transpose()
  }

  async fn complete(
    &self,
    task_id: Uuid,
    failures: Vec<UploadFailure>,
  ) -> Result<MaterializationTask> {
    let id_str       = encode_uuid(task_id);
    let at_str       = encode_dt(Utc::now());
    let failures_str = encode_failures(&failures)?;

    let _gate = self.acquire().await?;
    let raw: Option<RawTask> = self
      .conn
      .call(move |conn| {
        let updated = conn.execute(
          "UPDATE materialization_tasks
              SET status = 'done', finished_at = ?2, failures = ?3
            WHERE task_id = ?1",
          rusqlite::params![id_str, at_str, failures_str],
        )?;
        if updated == 0 {
          return Ok(None);
        }
        Ok(Some(conn.query_row(
          &format!("SELECT {} FROM materialization_tasks WHERE task_id = ?1", RawTask::COLUMNS),
          rusqlite::params![id_str],
          RawTask::from_row,
        )?))
      })
      .await?;

    raw.ok_or(Error::TaskNotFound(task_id))?.into_task()
  }

  async fn get_task(&self, task_id: Uuid) -> Result<Option<MaterializationTask>> {
    let id_str = encode_uuid(task_id);

    let _gate = self.acquire().await?;
    let raw: Option<RawTask> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM materialization_tasks WHERE task_id = ?1",
                RawTask::COLUMNS
              ),
              rusqlite::params![id_str],
              RawTask::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawTask::into_task).transpose()
  }
}
