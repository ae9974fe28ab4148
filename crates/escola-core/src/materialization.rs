//! Materialization tasks: the durable queue between a committed enrollment
//! and the background upload of its documents.
//!
//! A task is enqueued after the enrollment transaction commits and names the
//! two pending documents. The content itself is read back from the document
//! rows when the task runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// A pending document and the filename it was submitted under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUpload {
  pub document_id: Uuid,
  pub filename:    String,
}

/// Input for [`MaterializationQueue::enqueue`](crate::store::MaterializationQueue::enqueue).
#[derive(Debug, Clone)]
pub struct NewMaterialization {
  pub enrollment_id:      Uuid,
  pub proof_of_residence: PendingUpload,
  pub academic_history:   PendingUpload,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
  /// Waiting for a dispatcher.
  Queued,
  /// Claimed by a dispatcher; uploads in flight.
  Running,
  /// Processed. Individual uploads may still have failed.
  Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializationTask {
  pub task_id:            Uuid,
  pub enrollment_id:      Uuid,
  pub proof_of_residence: PendingUpload,
  pub academic_history:   PendingUpload,
  pub status:             TaskStatus,
  pub enqueued_at:        DateTime<Utc>,
  pub claimed_at:         Option<DateTime<Utc>>,
  pub finished_at:        Option<DateTime<Utc>>,
  /// Uploads that did not reach Finalized, recorded at completion.
  pub failures:           Vec<UploadFailure>,
}

impl MaterializationTask {
  /// Both uploads, proof of residence first.
  pub fn uploads(&self) -> [&PendingUpload; 2] {
    [&self.proof_of_residence, &self.academic_history]
  }
}

/// Why one document of a task was left Pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFailure {
  pub document_id: Uuid,
  pub reason:      String,
}
