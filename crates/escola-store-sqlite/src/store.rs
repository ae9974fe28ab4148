//! [`SqliteStore`], the SQLite implementation of the intake persistence
//! traits.

use std::{path::Path, sync::Arc};

use bytes::Bytes;
use chrono::Utc;
use rusqlite::OptionalExtension as _;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use escola_core::{
  cpf::Cpf,
  directory::{PeriodDirectory, UnitDirectory},
  document::{Document, DocumentState, content_digest},
  enrollment::{Enrollment, EnrollmentSummary, NewEnrollment},
  store::{DocumentStore, EnrollmentQueries, EnrollmentRegistry, StudentRegistry, TransactionScope},
  student::{NewStudent, Student},
};

use crate::{
  Error, Result, SqliteTx,
  encode::{
    DOCUMENT_FINALIZED, DOCUMENT_PENDING, RawDocument, RawEnrollment, RawEnrollmentSummary,
    RawStudent, encode_content, encode_date, encode_dt, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An Escola store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection and gate are reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
  gate:            Arc<Mutex<()>>,
}

/// Row counts, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableCounts {
  pub students:          u64,
  pub documents:         u64,
  pub pending_documents: u64,
  pub enrollments:       u64,
  pub queued_tasks:      u64,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, gate: Arc::new(Mutex::new(())) };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, gate: Arc::new(Mutex::new(())) };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Take the gate for a statement that runs outside any caller
  /// transaction.
  ///
  /// A transaction abandoned without a runtime to roll it back is rolled
  /// back here.
  pub(crate) async fn acquire(&self) -> Result<OwnedMutexGuard<()>> {
    let guard = self.gate.clone().lock_owned().await;
    self
      .conn
      .call(|conn| {
        if !conn.is_autocommit() {
          conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
      })
      .await?;
    Ok(guard)
  }

  // ── Reference data ──────────────────────────────────────────────────────

  /// Register a school unit and return its id.
  pub async fn add_unit(&self, name: &str) -> Result<Uuid> {
    let unit_id = Uuid::new_v4();
    let id_str = encode_uuid(unit_id);
    let name = name.to_owned();

    let _gate = self.acquire().await?;
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO units (unit_id, name) VALUES (?1, ?2)",
          rusqlite::params![id_str, name],
        )?;
        Ok(())
      })
      .await?;
    Ok(unit_id)
  }

  /// Register an academic period and return its id.
  pub async fn add_period(&self, year: i32) -> Result<Uuid> {
    let period_id = Uuid::new_v4();
    let id_str = encode_uuid(period_id);

    let _gate = self.acquire().await?;
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO academic_periods (period_id, year) VALUES (?1, ?2)",
          rusqlite::params![id_str, year],
        )?;
        Ok(())
      })
      .await?;
    Ok(period_id)
  }

  pub async fn counts(&self) -> Result<TableCounts> {
    let _gate = self.acquire().await?;
    let counts = self
      .conn
      .call(|conn| {
        let count = |sql: &str| conn.query_row(sql, [], |r| r.get::<_, i64>(0));
        Ok(TableCounts {
          students:          count("SELECT COUNT(*) FROM students")? as u64,
          documents:         count("SELECT COUNT(*) FROM documents")? as u64,
          pending_documents: count("SELECT COUNT(*) FROM documents WHERE status = 'pending'")?
            as u64,
          enrollments:       count("SELECT COUNT(*) FROM enrollments")? as u64,
          queued_tasks:      count(
            "SELECT COUNT(*) FROM materialization_tasks WHERE status = 'queued'",
          )? as u64,
        })
      })
      .await?;
    Ok(counts)
  }

  async fn row_exists(&self, sql: &'static str, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);
    let _gate = self.acquire().await?;
    let exists = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(sql, rusqlite::params![id_str], |_| Ok(true))
            .optional()?
            .unwrap_or(false),
        )
      })
      .await?;
    Ok(exists)
  }
}

// ─── TransactionScope impl ───────────────────────────────────────────────────

impl TransactionScope for SqliteStore {
  type Error = Error;
  type Tx = SqliteTx;

  async fn begin(&self) -> Result<SqliteTx> {
    let guard = self.acquire().await?;
    SqliteTx::begin(self.conn.clone(), guard).await
  }

  async fn commit(&self, tx: SqliteTx) -> Result<()> { tx.commit().await }

  async fn rollback(&self, tx: SqliteTx) -> Result<()> { tx.rollback().await }
}

// ─── Directories ─────────────────────────────────────────────────────────────

impl UnitDirectory for SqliteStore {
  type Error = Error;

  async fn unit_exists(&self, unit_id: Uuid) -> Result<bool> {
    self.row_exists("SELECT 1 FROM units WHERE unit_id = ?1", unit_id).await
  }
}

impl PeriodDirectory for SqliteStore {
  type Error = Error;

  async fn period_exists(&self, period_id: Uuid) -> Result<bool> {
    self
      .row_exists("SELECT 1 FROM academic_periods WHERE period_id = ?1", period_id)
      .await
  }
}

// ─── Students ────────────────────────────────────────────────────────────────

impl StudentRegistry for SqliteStore {
  async fn find_by_national_id(
    &self,
    tx: &mut SqliteTx,
    national_id: &Cpf,
  ) -> Result<Option<Student>> {
    let cpf_str = national_id.as_str().to_owned();

    let raw: Option<RawStudent> = tx
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {} FROM students WHERE national_id = ?1", RawStudent::COLUMNS),
              rusqlite::params![cpf_str],
              RawStudent::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawStudent::into_student).transpose()
  }

  async fn create_student(&self, tx: &mut SqliteTx, input: NewStudent) -> Result<Student> {
    let student = Student {
      student_id:  Uuid::new_v4(),
      full_name:   input.full_name,
      national_id: input.national_id,
      birth_date:  input.birth_date,
    };

    let id_str    = encode_uuid(student.student_id);
    let name      = student.full_name.clone();
    let cpf_str   = student.national_id.as_str().to_owned();
    let birth_str = encode_date(student.birth_date);

    tx.conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO students (student_id, full_name, national_id, birth_date)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, name, cpf_str, birth_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(student)
  }
}

// ─── Enrollments ─────────────────────────────────────────────────────────────

impl EnrollmentRegistry for SqliteStore {
  async fn exists_for_student_and_period(
    &self,
    tx: &mut SqliteTx,
    student_id: Uuid,
    period_id: Uuid,
  ) -> Result<bool> {
    let student_str = encode_uuid(student_id);
    let period_str  = encode_uuid(period_id);

    let exists = tx
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM enrollments WHERE student_id = ?1 AND period_id = ?2 LIMIT 1",
              rusqlite::params![student_str, period_str],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await?;
    Ok(exists)
  }

  async fn create_enrollment(&self, tx: &mut SqliteTx, input: NewEnrollment) -> Result<Enrollment> {
    let enrollment = Enrollment {
      enrollment_id:         Uuid::new_v4(),
      unit_id:               input.unit_id,
      student_id:            input.student_id,
      period_id:             input.period_id,
      status:                input.status,
      created_at:            input.created_at,
      proof_of_residence_id: input.proof_of_residence_id,
      academic_history_id:   input.academic_history_id,
    };

    let id_str        = encode_uuid(enrollment.enrollment_id);
    let unit_str      = encode_uuid(enrollment.unit_id);
    let student_str   = encode_uuid(enrollment.student_id);
    let period_str    = encode_uuid(enrollment.period_id);
    let status_str    = enrollment.status.to_string();
    let at_str        = encode_dt(enrollment.created_at);
    let residence_str = encode_uuid(enrollment.proof_of_residence_id);
    let history_str   = encode_uuid(enrollment.academic_history_id);

    tx.conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO enrollments (
             enrollment_id, unit_id, student_id, period_id, status,
             created_at, proof_of_residence_id, academic_history_id
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            id_str,
            unit_str,
            student_str,
            period_str,
            status_str,
            at_str,
            residence_str,
            history_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(enrollment)
  }

  async fn get_enrollment(&self, enrollment_id: Uuid) -> Result<Option<Enrollment>> {
    let id_str = encode_uuid(enrollment_id);

    let _gate = self.acquire().await?;
    let raw: Option<RawEnrollment> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM enrollments WHERE enrollment_id = ?1",
                RawEnrollment::COLUMNS
              ),
              rusqlite::params![id_str],
              RawEnrollment::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawEnrollment::into_enrollment).transpose()
  }
}

// ─── Documents ───────────────────────────────────────────────────────────────

/// What `finalize` found inside its transaction.
enum FinalizeOutcome {
  Missing,
  AlreadyFinalized,
  Finalized(RawDocument),
}

impl DocumentStore for SqliteStore {
  async fn create_pending(&self, tx: &mut SqliteTx, content: Bytes) -> Result<Document> {
    let document = Document {
      document_id:    Uuid::new_v4(),
      content_sha256: content_digest(&content),
      created_at:     Utc::now(),
      state:          DocumentState::Pending { content },
    };

    let id_str      = encode_uuid(document.document_id);
    let content_str = document.content().map(|c| encode_content(c)).unwrap_or_default();
    let digest      = document.content_sha256.clone();
    let at_str      = encode_dt(document.created_at);

    tx.conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO documents (document_id, status, content, location, content_sha256, created_at)
           VALUES (?1, ?2, ?3, NULL, ?4, ?5)",
          rusqlite::params![id_str, DOCUMENT_PENDING, content_str, digest, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(document)
  }

  async fn finalize(&self, document_id: Uuid, location: String) -> Result<Document> {
    let id_str = encode_uuid(document_id);
    let at_str = encode_dt(Utc::now());

    let _gate = self.acquire().await?;
    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let status: Option<String> = tx
          .query_row(
            "SELECT status FROM documents WHERE document_id = ?1",
            rusqlite::params![id_str],
            |r| r.get(0),
          )
          .optional()?;

        let outcome = match status.as_deref() {
          None => FinalizeOutcome::Missing,
          Some(DOCUMENT_FINALIZED) => FinalizeOutcome::AlreadyFinalized,
          Some(_) => {
            tx.execute(
              "UPDATE documents
                  SET status = ?2, content = NULL, location = ?3, finalized_at = ?4
                WHERE document_id = ?1",
              rusqlite::params![id_str, DOCUMENT_FINALIZED, location, at_str],
            )?;
            let raw = tx.query_row(
              &format!("SELECT {} FROM documents WHERE document_id = ?1", RawDocument::COLUMNS),
              rusqlite::params![id_str],
              RawDocument::from_row,
            )?;
            FinalizeOutcome::Finalized(raw)
          }
        };

        tx.commit()?;
        Ok(outcome)
      })
      .await?;

    match outcome {
      FinalizeOutcome::Missing => Err(Error::DocumentNotFound(document_id)),
      FinalizeOutcome::AlreadyFinalized => Err(Error::DocumentAlreadyFinalized(document_id)),
      FinalizeOutcome::Finalized(raw) => raw.into_document(),
    }
  }

  async fn get_document(&self, document_id: Uuid) -> Result<Option<Document>> {
    let id_str = encode_uuid(document_id);

    let _gate = self.acquire().await?;
    let raw: Option<RawDocument> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {} FROM documents WHERE document_id = ?1", RawDocument::COLUMNS),
              rusqlite::params![id_str],
              RawDocument::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawDocument::into_document).transpose()
  }
}

// ─── Queries ─────────────────────────────────────────────────────────────────

impl EnrollmentQueries for SqliteStore {
  async fn list_enrollments(
    &self,
    unit_id: Uuid,
    period_id: Uuid,
  ) -> Result<Vec<EnrollmentSummary>> {
    let unit_str   = encode_uuid(unit_id);
    let period_str = encode_uuid(period_id);

    let _gate = self.acquire().await?;
    let raws: Vec<RawEnrollmentSummary> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT
             e.enrollment_id, e.unit_id, e.student_id, e.period_id, e.status,
             e.created_at, e.proof_of_residence_id, e.academic_history_id,
             s.student_id, s.full_name, s.national_id, s.birth_date
           FROM enrollments e
           JOIN students s ON s.student_id = e.student_id
           WHERE e.unit_id = ?1 AND e.period_id = ?2
           ORDER BY e.created_at, e.rowid",
        )?;

        let rows = stmt
          .query_map(rusqlite::params![unit_str, period_str], |row| {
            Ok(RawEnrollmentSummary {
              enrollment: RawEnrollment::from_row(row)?,
              student:    RawStudent {
                student_id:  row.get(8)?,
                full_name:   row.get(9)?,
                national_id: row.get(10)?,
                birth_date:  row.get(11)?,
              },
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEnrollmentSummary::into_summary).collect()
  }
}
