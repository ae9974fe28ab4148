//! Enrollments: a student's registration into an academic period at a unit.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::cpf::Cpf;

/// Lifecycle status of an enrollment. Intake only ever produces
/// [`EnrollmentStatus::Active`].
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EnrollmentStatus {
  Active,
  Approved,
  Inactive,
  Cancelled,
  Reassigned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
  pub enrollment_id:         Uuid,
  pub unit_id:               Uuid,
  pub student_id:            Uuid,
  pub period_id:             Uuid,
  pub status:                EnrollmentStatus,
  pub created_at:            DateTime<Utc>,
  pub proof_of_residence_id: Uuid,
  pub academic_history_id:   Uuid,
}

/// Input for [`EnrollmentRegistry::create_enrollment`](crate::store::EnrollmentRegistry::create_enrollment).
#[derive(Debug, Clone)]
pub struct NewEnrollment {
  pub unit_id:               Uuid,
  pub student_id:            Uuid,
  pub period_id:             Uuid,
  pub status:                EnrollmentStatus,
  pub created_at:            DateTime<Utc>,
  pub proof_of_residence_id: Uuid,
  pub academic_history_id:   Uuid,
}

// ─── Read projection ─────────────────────────────────────────────────────────

/// Student fields carried by an [`EnrollmentSummary`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentSummary {
  pub student_id:  Uuid,
  pub full_name:   String,
  pub national_id: Cpf,
  pub birth_date:  NaiveDate,
}

/// One row of the per-unit, per-period enrollment listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentSummary {
  pub enrollment_id:         Uuid,
  pub student:               StudentSummary,
  pub status:                EnrollmentStatus,
  pub created_at:            DateTime<Utc>,
  pub proof_of_residence_id: Uuid,
  pub academic_history_id:   Uuid,
}
