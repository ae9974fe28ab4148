//! Persistence traits for the intake workflow.
//!
//! Every trait here hangs off [`TransactionScope`], so a single backend type
//! supplies one transaction handle type and one error type for all of them.
//! Operations that must join the caller's unit of work take `&mut Self::Tx`
//! explicitly; the rest run as their own unit of durability.
//!
//! All methods return `Send` futures so the traits can be used from
//! multi-threaded tokio runtimes and spawned background tasks.

use std::future::Future;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  cpf::Cpf,
  document::Document,
  enrollment::{Enrollment, EnrollmentSummary, NewEnrollment},
  materialization::{MaterializationTask, NewMaterialization, UploadFailure},
  student::{NewStudent, Student},
};

// ─── Transaction scope ───────────────────────────────────────────────────────

/// A scoped unit of work.
///
/// `begin` hands out an exclusive handle; every repository call made with it
/// sees the same snapshot and is committed or rolled back together. Nested
/// work reuses the handle it was given rather than opening another
/// transaction. A handle that is dropped without `commit` is rolled back.
pub trait TransactionScope: Send + Sync {
  type Tx: Send;
  type Error: std::error::Error + Send + Sync + 'static;

  fn begin(&self) -> impl Future<Output = Result<Self::Tx, Self::Error>> + Send + '_;

  fn commit(&self, tx: Self::Tx) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn rollback(&self, tx: Self::Tx)
  -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

// ─── Students ────────────────────────────────────────────────────────────────

pub trait StudentRegistry: TransactionScope {
  /// Look a student up by national identifier.
  fn find_by_national_id<'a>(
    &'a self,
    tx: &'a mut Self::Tx,
    national_id: &'a Cpf,
  ) -> impl Future<Output = Result<Option<Student>, Self::Error>> + Send + 'a;

  /// Persist a new student. Fails if the national identifier is taken.
  fn create_student<'a>(
    &'a self,
    tx: &'a mut Self::Tx,
    input: NewStudent,
  ) -> impl Future<Output = Result<Student, Self::Error>> + Send + 'a;
}

// ─── Enrollments ─────────────────────────────────────────────────────────────

pub trait EnrollmentRegistry: TransactionScope {
  /// Whether any enrollment exists for the pair. This is a plain read;
  /// nothing in storage prevents a concurrent insert for the same pair.
  fn exists_for_student_and_period<'a>(
    &'a self,
    tx: &'a mut Self::Tx,
    student_id: Uuid,
    period_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  fn create_enrollment<'a>(
    &'a self,
    tx: &'a mut Self::Tx,
    input: NewEnrollment,
  ) -> impl Future<Output = Result<Enrollment, Self::Error>> + Send + 'a;

  /// Read a committed enrollment. Returns `None` if not found.
  fn get_enrollment(
    &self,
    enrollment_id: Uuid,
  ) -> impl Future<Output = Result<Option<Enrollment>, Self::Error>> + Send + '_;
}

// ─── Documents ───────────────────────────────────────────────────────────────

pub trait DocumentStore: TransactionScope {
  /// Insert a Pending document holding `content`.
  fn create_pending<'a>(
    &'a self,
    tx: &'a mut Self::Tx,
    content: Bytes,
  ) -> impl Future<Output = Result<Document, Self::Error>> + Send + 'a;

  /// Move a document to Finalized at `location`, dropping its content.
  ///
  /// Runs in its own transaction. Fails if the document does not exist or
  /// has already been finalized.
  fn finalize(
    &self,
    document_id: Uuid,
    location: String,
  ) -> impl Future<Output = Result<Document, Self::Error>> + Send + '_;

  fn get_document(
    &self,
    document_id: Uuid,
  ) -> impl Future<Output = Result<Option<Document>, Self::Error>> + Send + '_;
}

// ─── Materialization queue ───────────────────────────────────────────────────

pub trait MaterializationQueue: TransactionScope {
  /// Durably record a task in the `Queued` state.
  fn enqueue(
    &self,
    input: NewMaterialization,
  ) -> impl Future<Output = Result<MaterializationTask, Self::Error>> + Send + '_;

  /// Atomically move the oldest claimable task to `Running`, stamp its
  /// `claimed_at`, and return it.
  ///
  /// A task is claimable while `Queued`, or while `Running` with a claim
  /// older than `stale_before`: its worker stopped before completing it.
  fn claim_next(
    &self,
    stale_before: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<MaterializationTask>, Self::Error>> + Send + '_;

  /// Mark a task `Done`, recording which uploads failed.
  fn complete(
    &self,
    task_id: Uuid,
    failures: Vec<UploadFailure>,
  ) -> impl Future<Output = Result<MaterializationTask, Self::Error>> + Send + '_;

  fn get_task(
    &self,
    task_id: Uuid,
  ) -> impl Future<Output = Result<Option<MaterializationTask>, Self::Error>> + Send + '_;
}

// ─── Read projections ────────────────────────────────────────────────────────

pub trait EnrollmentQueries: TransactionScope {
  /// All enrollments for a unit and period, oldest first.
  fn list_enrollments(
    &self,
    unit_id: Uuid,
    period_id: Uuid,
  ) -> impl Future<Output = Result<Vec<EnrollmentSummary>, Self::Error>> + Send + '_;
}
