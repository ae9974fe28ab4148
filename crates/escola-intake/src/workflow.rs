//! The enrollment intake workflow.
//!
//! Validation runs first and writes nothing. The student, both documents and
//! the enrollment are then written in one transaction. Only after that
//! transaction has committed are the documents queued for upload, so a
//! request never waits on external storage.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use escola_core::{
  clock::Clock,
  cpf::Cpf,
  directory::{PeriodDirectory, UnitDirectory},
  document::Upload,
  enrollment::{EnrollmentStatus, NewEnrollment},
  materialization::{NewMaterialization, PendingUpload},
  store::{DocumentStore, EnrollmentRegistry, MaterializationQueue, StudentRegistry},
  student::{MAX_AGE, MIN_AGE, NewStudent, age_is_acceptable},
};

use crate::{
  dispatcher::DispatchSignal,
  error::{FieldError, IntakeError},
  transaction::run_in_transaction,
};

/// Everything a caller submits to enroll a student.
#[derive(Debug, Clone)]
pub struct IntakeRequest {
  /// CPF, bare digits or `XXX.XXX.XXX-XX`.
  pub national_id:        String,
  pub full_name:          String,
  pub birth_date:         NaiveDate,
  pub unit_id:            Uuid,
  pub period_id:          Uuid,
  pub proof_of_residence: Upload,
  pub academic_history:   Upload,
}

pub struct EnrollmentIntake<S, U, P, C> {
  store:   Arc<S>,
  units:   Arc<U>,
  periods: Arc<P>,
  clock:   Arc<C>,
  signal:  DispatchSignal,
}

impl<S, U, P, C> EnrollmentIntake<S, U, P, C>
where
  S: StudentRegistry + EnrollmentRegistry + DocumentStore + MaterializationQueue,
  U: UnitDirectory,
  P: PeriodDirectory,
  C: Clock,
{
  pub fn new(
    store: Arc<S>,
    units: Arc<U>,
    periods: Arc<P>,
    clock: Arc<C>,
    signal: DispatchSignal,
  ) -> Self {
    Self { store, units, periods, clock, signal }
  }

  /// Enroll a student and return the new enrollment's id.
  ///
  /// Returns once the enrollment has committed. Document uploads happen
  /// later, on the dispatcher.
  pub async fn enroll(&self, request: IntakeRequest) -> Result<Uuid, IntakeError> {
    let national_id = Cpf::parse(&request.national_id)
      .map_err(|_| IntakeError::invalid("cpf", "invalid CPF"))?;

    if !age_is_acceptable(request.birth_date, self.clock.today()) {
      return Err(IntakeError::invalid(
        "birth_date",
        &format!("age must be between {MIN_AGE} and {MAX_AGE} years"),
      ));
    }

    self
      .check_references(request.unit_id, request.period_id)
      .await?;

    let now = self.clock.now();
    let materialization = run_in_transaction(&*self.store, async |tx| {
      self.register(tx, &national_id, &request, now).await
    })
    .await?;

    let enrollment_id = materialization.enrollment_id;
    tracing::info!(%enrollment_id, unit_id = %request.unit_id, "enrollment created");

    match self.store.enqueue(materialization).await {
      Ok(task) => {
        tracing::debug!(%enrollment_id, task_id = %task.task_id, "materialization queued");
        self.signal.notify();
      }
      Err(e) => {
        tracing::error!(
          %enrollment_id,
          error = %e,
          "failed to queue document materialization; documents stay pending",
        );
      }
    }

    Ok(enrollment_id)
  }

  /// Unit and period are looked up concurrently and every missing one is
  /// reported.
  async fn check_references(&self, unit_id: Uuid, period_id: Uuid) -> Result<(), IntakeError> {
    let (unit, period) = tokio::join!(
      self.units.unit_exists(unit_id),
      self.periods.period_exists(period_id),
    );

    let mut errors = Vec::new();
    if !unit.map_err(IntakeError::store)? {
      errors.push(FieldError::new("unit_id", "unit not found"));
    }
    if !period.map_err(IntakeError::store)? {
      errors.push(FieldError::new("period_id", "academic period not found"));
    }

    if errors.is_empty() { Ok(()) } else { Err(IntakeError::Validation(errors)) }
  }

  /// The transactional body. Returns the task to queue once committed.
  async fn register(
    &self,
    tx: &mut S::Tx,
    national_id: &Cpf,
    request: &IntakeRequest,
    now: DateTime<Utc>,
  ) -> Result<NewMaterialization, IntakeError> {
    let store = &*self.store;

    let student = match store
      .find_by_national_id(tx, national_id)
      .await
      .map_err(IntakeError::store)?
    {
      Some(existing) => existing,
      None => store
        .create_student(tx, NewStudent {
          full_name: request.full_name.clone(),
          national_id: national_id.clone(),
          birth_date: request.birth_date,
        })
        .await
        .map_err(IntakeError::store)?,
    };

    if store
      .exists_for_student_and_period(tx, student.student_id, request.period_id)
      .await
      .map_err(IntakeError::store)?
    {
      return Err(IntakeError::Conflict(
        "student is already enrolled in this academic period".into(),
      ));
    }

    let residence = store
      .create_pending(tx, request.proof_of_residence.content.clone())
      .await
      .map_err(IntakeError::store)?;
    let history = store
      .create_pending(tx, request.academic_history.content.clone())
      .await
      .map_err(IntakeError::store)?;

    let enrollment = store
      .create_enrollment(tx, NewEnrollment {
        unit_id:               request.unit_id,
        student_id:            student.student_id,
        period_id:             request.period_id,
        status:                EnrollmentStatus::Active,
        created_at:            now,
        proof_of_residence_id: residence.document_id,
        academic_history_id:   history.document_id,
      })
      .await
      .map_err(IntakeError::store)?;

    Ok(NewMaterialization {
      enrollment_id:      enrollment.enrollment_id,
      proof_of_residence: PendingUpload {
        document_id: residence.document_id,
        filename:    request.proof_of_residence.filename.clone(),
      },
      academic_history:   PendingUpload {
        document_id: history.document_id,
        filename:    request.academic_history.filename.clone(),
      },
    })
  }
}
