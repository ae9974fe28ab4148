//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 UTC strings with fixed microsecond
//! precision, so text order is chronological. Calendar dates are
//! `YYYY-MM-DD`. Document content is base64. UUIDs are hyphenated lowercase.

use std::str::FromStr;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use escola_core::{
  cpf::Cpf,
  document::{Document, DocumentState},
  enrollment::{Enrollment, EnrollmentStatus, EnrollmentSummary, StudentSummary},
  materialization::{MaterializationTask, PendingUpload, TaskStatus, UploadFailure},
  student::Student,
};
use uuid::Uuid;

use crate::{Error, Result};

pub const DOCUMENT_PENDING: &str = "pending";
pub const DOCUMENT_FINALIZED: &str = "finalized";

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> / NaiveDate ───────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn decode_enrollment_status(s: &str) -> Result<EnrollmentStatus> {
  EnrollmentStatus::from_str(s)
    .map_err(|_| escola_core::Error::UnknownEnrollmentStatus(s.to_owned()).into())
}

pub fn decode_task_status(s: &str) -> Result<TaskStatus> {
  TaskStatus::from_str(s).map_err(|_| escola_core::Error::UnknownTaskStatus(s.to_owned()).into())
}

// ─── Content ─────────────────────────────────────────────────────────────────

pub fn encode_content(content: &[u8]) -> String { STANDARD.encode(content) }

pub fn decode_content(s: &str) -> Result<Bytes> { Ok(Bytes::from(STANDARD.decode(s)?)) }

// ─── Failures ────────────────────────────────────────────────────────────────

pub fn encode_failures(failures: &[UploadFailure]) -> Result<String> {
  Ok(serde_json::to_string(failures)?)
}

pub fn decode_failures(s: &str) -> Result<Vec<UploadFailure>> { Ok(serde_json::from_str(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `students` row.
pub struct RawStudent {
  pub student_id:  String,
  pub full_name:   String,
  pub national_id: String,
  pub birth_date:  String,
}

impl RawStudent {
  pub const COLUMNS: &'static str = "student_id, full_name, national_id, birth_date";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      student_id:  row.get(0)?,
      full_name:   row.get(1)?,
      national_id: row.get(2)?,
      birth_date:  row.get(3)?,
    })
  }

  pub fn into_student(self) -> Result<Student> {
    Ok(Student {
      student_id:  decode_uuid(&self.student_id)?,
      full_name:   self.full_name,
      national_id: Cpf::parse(&self.national_id)?,
      birth_date:  decode_date(&self.birth_date)?,
    })
  }
}

/// Raw strings read directly from a `documents` row.
pub struct RawDocument {
  pub document_id:    String,
  pub status:         String,
  pub content:        Option<String>,
  pub location:       Option<String>,
  pub content_sha256: String,
  pub created_at:     String,
}

impl RawDocument {
  pub const COLUMNS: &'static str =
    "document_id, status, content, location, content_sha256, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      document_id:    row.get(0)?,
      status:         row.get(1)?,
      content:        row.get(2)?,
      location:       row.get(3)?,
      content_sha256: row.get(4)?,
      created_at:     row.get(5)?,
    })
  }

  pub fn into_document(self) -> Result<Document> {
    let state = match (self.status.as_str(), self.content, self.location) {
      (DOCUMENT_PENDING, Some(content), _) => DocumentState::Pending {
        content: decode_content(&content)?,
      },
      (DOCUMENT_FINALIZED, _, Some(location)) => DocumentState::Finalized { location },
      (other, ..) => return Err(Error::UnknownDocumentStatus(other.to_owned())),
    };

    Ok(Document {
      document_id: decode_uuid(&self.document_id)?,
      content_sha256: self.content_sha256,
      created_at: decode_dt(&self.created_at)?,
      state,
    })
  }
}

/// Raw strings read directly from an `enrollments` row.
pub struct RawEnrollment {
  pub enrollment_id:         String,
  pub unit_id:               String,
  pub student_id:            String,
  pub period_id:             String,
  pub status:                String,
  pub created_at:            String,
  pub proof_of_residence_id: String,
  pub academic_history_id:   String,
}

impl RawEnrollment {
  pub const COLUMNS: &'static str = "enrollment_id, unit_id, student_id, period_id, status, \
                                     created_at, proof_of_residence_id, academic_history_id";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      enrollment_id:         row.get(0)?,
      unit_id:               row.get(1)?,
      student_id:            row.get(2)?,
      period_id:             row.get(3)?,
      status:                row.get(4)?,
      created_at:            row.get(5)?,
      proof_of_residence_id: row.get(6)?,
      academic_history_id:   row.get(7)?,
    })
  }

  pub fn into_enrollment(self) -> Result<Enrollment> {
    Ok(Enrollment {
      enrollment_id:         decode_uuid(&self.enrollment_id)?,
      unit_id:               decode_uuid(&self.unit_id)?,
      student_id:            decode_uuid(&self.student_id)?,
      period_id:             decode_uuid(&self.period_id)?,
      status:                decode_enrollment_status(&self.status)?,
      created_at:            decode_dt(&self.created_at)?,
      proof_of_residence_id: decode_uuid(&self.proof_of_residence_id)?,
      academic_history_id:   decode_uuid(&self.academic_history_id)?,
    })
  }
}

/// An `enrollments` row joined with its student.
pub struct RawEnrollmentSummary {
  pub enrollment: RawEnrollment,
  pub student:    RawStudent,
}

impl RawEnrollmentSummary {
  pub fn into_summary(self) -> Result<EnrollmentSummary> {
    let enrollment = self.enrollment.into_enrollment()?;
    let student = self.student.into_student()?;
    Ok(EnrollmentSummary {
      enrollment_id:         enrollment.enrollment_id,
      student:               StudentSummary {
        student_id:  student.student_id,
        full_name:   student.full_name,
        national_id: student.national_id,
        birth_date:  student.birth_date,
      },
      status:                enrollment.status,
      created_at:            enrollment.created_at,
      proof_of_residence_id: enrollment.proof_of_residence_id,
      academic_history_id:   enrollment.academic_history_id,
    })
  }
}

/// Raw strings read directly from a `materialization_tasks` row.
pub struct RawTask {
  pub task_id:               String,
  pub enrollment_id:         String,
  pub residence_document_id: String,
  pub residence_filename:    String,
  pub history_document_id:   String,
  pub history_filename:      String,
  pub status:                String,
  pub enqueued_at:           String,
  pub claimed_at:            Option<String>,
  pub finished_at:           Option<String>,
  pub failures:              String,
}

impl RawTask {
  pub const COLUMNS: &'static str = "task_id, enrollment_id, residence_document_id, \
                                     residence_filename, history_document_id, history_filename, \
                                     status, enqueued_at, claimed_at, finished_at, failures";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      task_id:               row.get(0)?,
      enrollment_id:         row.get(1)?,
      residence_document_id: row.get(2)?,
      residence_filename:    row.get(3)?,
      history_document_id:   row.get(4)?,
      history_filename:      row.get(5)?,
      status:                row.get(6)?,
      enqueued_at:           row.get(7)?,
      claimed_at:            row.get(8)?,
      finished_at:           row.get(9)?,
      failures:              row.get(10)?,
    })
  }

  pub fn into_task(self) -> Result<MaterializationTask> {
    Ok(MaterializationTask {
      task_id:            decode_uuid(&self.task_id)?,
      enrollment_id:      decode_uuid(&self.enrollment_id)?,
      proof_of_residence: PendingUpload {
        document_id: decode_uuid(&self.residence_document_id)?,
        filename:    self.residence_filename,
      },
      academic_history:   PendingUpload {
        document_id: decode_uuid(&self.history_document_id)?,
        filename:    self.history_filename,
      },
      status:             decode_task_status(&self.status)?,
      enqueued_at:        decode_dt(&self.enqueued_at)?,
      claimed_at:         self.claimed_at.as_deref().map(decode_dt).transpose()?,
      finished_at:        self.finished_at.as_deref().map(decode_dt).transpose()?,
      failures:           decode_failures(&self.failures)?,
    })
  }
}
