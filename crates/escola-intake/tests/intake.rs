//! End-to-end tests for the intake workflow and dispatcher over in-memory
//! SQLite.

use std::{
  sync::{Arc, Mutex},
  time::Duration,
};

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use escola_core::{
  clock::{Clock, FixedClock},
  cpf::Cpf,
  document::{Document, Upload},
  enrollment::{Enrollment, EnrollmentStatus, EnrollmentSummary, NewEnrollment},
  materialization::{MaterializationTask, NewMaterialization, PendingUpload, UploadFailure},
  storage::{StorageUploader, StoredLocation},
  store::{
    DocumentStore, EnrollmentQueries, EnrollmentRegistry, MaterializationQueue, StudentRegistry,
    TransactionScope,
  },
  student::{NewStudent, Student},
};
use escola_intake::{
  DispatchSignal, EnrollmentIntake, IntakeError, IntakeRequest, MaterializationDispatcher,
  run_in_transaction,
};
use escola_store_sqlite::{SqliteStore, SqliteTx};
use tokio::sync::{Barrier, Semaphore, oneshot};
use uuid::Uuid;

const CPF_A: &str = "529.982.247-25";
const CPF_B: &str = "11144477735";

// ─── Fixtures ────────────────────────────────────────────────────────────────

/// 2026-10-19 12:00 UTC.
fn clock() -> FixedClock { FixedClock(Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()) }

fn date(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

struct Fixture<S> {
  store:     Arc<S>,
  sqlite:    SqliteStore,
  unit_id:   Uuid,
  period_id: Uuid,
  signal:    DispatchSignal,
}

async fn sqlite() -> (SqliteStore, Uuid, Uuid) {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let unit_id = store.add_unit("Escola Municipal Centro").await.unwrap();
  let period_id = store.add_period(2027).await.unwrap();
  (store, unit_id, period_id)
}

async fn fixture() -> Fixture<SqliteStore> {
  let (sqlite, unit_id, period_id) = sqlite().await;
  Fixture {
    store: Arc::new(sqlite.clone()),
    sqlite,
    unit_id,
    period_id,
    signal: DispatchSignal::new(),
  }
}

impl<S> Fixture<S>
where
  S: StudentRegistry + EnrollmentRegistry + DocumentStore + MaterializationQueue,
{
  fn intake(&self) -> EnrollmentIntake<S, SqliteStore, SqliteStore, FixedClock> {
    EnrollmentIntake::new(
      self.store.clone(),
      Arc::new(self.sqlite.clone()),
      Arc::new(self.sqlite.clone()),
      Arc::new(clock()),
      self.signal.clone(),
    )
  }

  fn request(&self, cpf: &str, name: &str) -> IntakeRequest {
    IntakeRequest {
      national_id:        cpf.into(),
      full_name:          name.into(),
      birth_date:         date(2018, 5, 2),
      unit_id:            self.unit_id,
      period_id:          self.period_id,
      proof_of_residence: Upload {
        filename: "comprovante.pdf".into(),
        content:  Bytes::from_static(b"conta de luz"),
      },
      academic_history:   Upload {
        filename: "historico.pdf".into(),
        content:  Bytes::from_static(b"notas 2026"),
      },
    }
  }
}

impl Fixture<SqliteStore> {
  fn dispatcher<U: StorageUploader + 'static>(
    &self,
    uploader: U,
  ) -> MaterializationDispatcher<SqliteStore, U> {
    MaterializationDispatcher::new(
      self.store.clone(),
      Arc::new(uploader),
      self.signal.clone(),
      Duration::from_millis(20),
    )
  }

  async fn documents_of(&self, enrollment_id: Uuid) -> (Enrollment, Document, Document) {
    let enrollment = self.sqlite.get_enrollment(enrollment_id).await.unwrap().unwrap();
    let residence = self
      .sqlite
      .get_document(enrollment.proof_of_residence_id)
      .await
      .unwrap()
      .unwrap();
    let history = self
      .sqlite
      .get_document(enrollment.academic_history_id)
      .await
      .unwrap()
      .unwrap();
    (enrollment, residence, history)
  }
}

// ─── Uploaders ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct StubError(String);

/// Records every upload; fails those whose filename is listed in `failing`.
#[derive(Default)]
struct StubUploader {
  failing:  Vec<String>,
  uploaded: Mutex<Vec<String>>,
}

impl StubUploader {
  fn failing(filename: &str) -> Self {
    Self { failing: vec![filename.into()], ..Default::default() }
  }
}

impl StorageUploader for StubUploader {
  type Error = StubError;

  async fn upload(&self, filename: String, _content: Bytes) -> Result<StoredLocation, StubError> {
    if self.failing.contains(&filename) {
      return Err(StubError(format!("storage rejected {filename}")));
    }
    self.uploaded.lock().unwrap().push(filename.clone());
    Ok(StoredLocation { url: format!("/stub/{filename}"), path: filename })
  }

  async fn delete(&self, _location: &str) -> Result<(), StubError> { Ok(()) }
}

/// Holds every upload until a permit is released.
struct GatedUploader {
  permits: Arc<Semaphore>,
}

impl StorageUploader for GatedUploader {
  type Error = StubError;

  async fn upload(&self, filename: String, _content: Bytes) -> Result<StoredLocation, StubError> {
    let permit = self
      .permits
      .acquire()
      .await
      .map_err(|e| StubError(e.to_string()))?;
    permit.forget();
    Ok(StoredLocation { url: format!("/gated/{filename}"), path: filename })
  }

  async fn delete(&self, _location: &str) -> Result<(), StubError> { Ok(()) }
}

/// Completes an upload only once both documents of a task are uploading at
/// the same time.
struct BarrierUploader {
  barrier: Barrier,
}

impl StorageUploader for BarrierUploader {
  type Error = StubError;

  async fn upload(&self, filename: String, _content: Bytes) -> Result<StoredLocation, StubError> {
    tokio::time::timeout(Duration::from_secs(2), self.barrier.wait())
      .await
      .map_err(|_| StubError(format!("{filename} uploaded alone")))?;
    Ok(StoredLocation { url: format!("/together/{filename}"), path: filename })
  }

  async fn delete(&self, _location: &str) -> Result<(), StubError> { Ok(()) }
}

// ─── Fault injection ─────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
enum FlakyError {
  #[error(transparent)]
  Store(#[from] escola_store_sqlite::Error),
  #[error("injected failure: {0}")]
  Injected(&'static str),
}

/// Delegates to SQLite, optionally failing enrollment insertion or enqueue.
struct FlakyStore {
  inner:             SqliteStore,
  fail_enrollment:   bool,
  fail_enqueue:      bool,
}

impl TransactionScope for FlakyStore {
  type Error = FlakyError;
  type Tx = SqliteTx;

  async fn begin(&self) -> Result<SqliteTx, FlakyError> { Ok(self.inner.begin().await?) }

  async fn commit(&self, tx: SqliteTx) -> Result<(), FlakyError> {
    Ok(self.inner.commit(tx).await?)
  }

  async fn rollback(&self, tx: SqliteTx) -> Result<(), FlakyError> {
    Ok(self.inner.rollback(tx).await?)
  }
}

impl StudentRegistry for FlakyStore {
  async fn find_by_national_id(
    &self,
    tx: &mut SqliteTx,
    national_id: &Cpf,
  ) -> Result<Option<Student>, FlakyError> {
    Ok(self.inner.find_by_national_id(tx, national_id).await?)
  }

  async fn create_student(
    &self,
    tx: &mut SqliteTx,
    input: NewStudent,
  ) -> Result<Student, FlakyError> {
    Ok(self.inner.create_student(tx, input).await?)
  }
}

impl EnrollmentRegistry for FlakyStore {
  async fn exists_for_student_and_period(
    &self,
    tx: &mut SqliteTx,
    student_id: Uuid,
    period_id: Uuid,
  ) -> Result<bool, FlakyError> {
    Ok(self.inner.exists_for_student_and_period(tx, student_id, period_id).await?)
  }

  async fn create_enrollment(
    &self,
    tx: &mut SqliteTx,
    input: NewEnrollment,
  ) -> Result<Enrollment, FlakyError> {
    if self.fail_enrollment {
      return Err(FlakyError::Injected("create_enrollment"));
    }
    Ok(self.inner.create_enrollment(tx, input).await?)
  }

  async fn get_enrollment(&self, enrollment_id: Uuid) -> Result<Option<Enrollment>, FlakyError> {
    Ok(self.inner.get_enrollment(enrollment_id).await?)
  }
}

impl DocumentStore for FlakyStore {
  async fn create_pending(&self, tx: &mut SqliteTx, content: Bytes) -> Result<Document, FlakyError> {
    Ok(self.inner.create_pending(tx, content).await?)
  }

  async fn finalize(&self, document_id: Uuid, location: String) -> Result<Document, FlakyError> {
    Ok(self.inner.finalize(document_id, location).await?)
  }

  async fn get_document(&self, document_id: Uuid) -> Result<Option<Document>, FlakyError> {
    Ok(self.inner.get_document(document_id).await?)
  }
}

impl MaterializationQueue for FlakyStore {
  async fn enqueue(&self, input: NewMaterialization) -> Result<MaterializationTask, FlakyError> {
    if self.fail_enqueue {
      return Err(FlakyError::Injected("enqueue"));
    }
    Ok(self.inner.enqueue(input).await?)
  }

  async fn claim_next(
    &self,
    stale_before: DateTime<Utc>,
  ) -> Result<Option<MaterializationTask>, FlakyError> {
    Ok(self.inner.claim_next(stale_before).await?)
  }

  async fn complete(
    &self,
    task_id: Uuid,
    failures: Vec<UploadFailure>,
  ) -> Result<MaterializationTask, FlakyError> {
    Ok(self.inner.complete(task_id, failures).await?)
  }

  async fn get_task(&self, task_id: Uuid) -> Result<Option<MaterializationTask>, FlakyError> {
    Ok(self.inner.get_task(task_id).await?)
  }
}

async fn flaky_fixture(fail_enrollment: bool, fail_enqueue: bool) -> Fixture<FlakyStore> {
  let (sqlite, unit_id, period_id) = sqlite().await;
  Fixture {
    store: Arc::new(FlakyStore { inner: sqlite.clone(), fail_enrollment, fail_enqueue }),
    sqlite,
    unit_id,
    period_id,
    signal: DispatchSignal::new(),
  }
}

// ─── Happy path ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn enroll_commits_enrollment_and_pending_documents() {
  let f = fixture().await;

  let enrollment_id = f.intake().enroll(f.request(CPF_A, "Ana Souza")).await.unwrap();

  let (enrollment, residence, history) = f.documents_of(enrollment_id).await;
  assert_eq!(enrollment.status, EnrollmentStatus::Active);
  assert_eq!(enrollment.unit_id, f.unit_id);
  assert_eq!(enrollment.period_id, f.period_id);
  assert_eq!(enrollment.created_at, clock().0);

  assert_eq!(residence.content().map(|c| c.as_ref()), Some(&b"conta de luz"[..]));
  assert_eq!(history.content().map(|c| c.as_ref()), Some(&b"notas 2026"[..]));

  let counts = f.sqlite.counts().await.unwrap();
  assert_eq!(counts.students, 1);
  assert_eq!(counts.enrollments, 1);
  assert_eq!(counts.pending_documents, 2);
  assert_eq!(counts.queued_tasks, 1);
}

#[tokio::test]
async fn student_is_resolved_by_national_id() {
  let f = fixture().await;
  let other_period = f.sqlite.add_period(2028).await.unwrap();

  f.intake().enroll(f.request(CPF_A, "Ana Souza")).await.unwrap();

  // Same CPF written without punctuation and under another name.
  let mut second = f.request("52998224725", "Ana S. Lima");
  second.period_id = other_period;
  f.intake().enroll(second).await.unwrap();

  let counts = f.sqlite.counts().await.unwrap();
  assert_eq!(counts.students, 1);
  assert_eq!(counts.enrollments, 2);

  let listed: Vec<EnrollmentSummary> =
    f.sqlite.list_enrollments(f.unit_id, other_period).await.unwrap();
  assert_eq!(listed.len(), 1);
  assert_eq!(listed[0].student.full_name, "Ana Souza");
}

// ─── Rejections ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn second_enrollment_in_period_conflicts_without_writes() {
  let f = fixture().await;
  f.intake().enroll(f.request(CPF_A, "Ana Souza")).await.unwrap();
  let before = f.sqlite.counts().await.unwrap();

  let err = f
    .intake()
    .enroll(f.request(CPF_A, "Ana Souza"))
    .await
    .unwrap_err();
  assert!(matches!(err, IntakeError::Conflict(_)));

  assert_eq!(f.sqlite.counts().await.unwrap(), before);
}

#[tokio::test]
async fn invalid_cpf_is_rejected() {
  let f = fixture().await;

  for bad in ["529.982.247-24", "111.111.111-11", "1234567890", ""] {
    let err = f.intake().enroll(f.request(bad, "Ana")).await.unwrap_err();
    let fields: Vec<_> = err.fields().iter().map(|e| e.field.as_str()).collect();
    assert_eq!(fields, ["cpf"], "input {bad:?}");
  }

  assert_eq!(f.sqlite.counts().await.unwrap().students, 0);
}

#[tokio::test]
async fn age_limits_are_inclusive() {
  let f = fixture().await;
  let cases = [
    (date(2023, 10, 19), true),  // 3 today
    (date(2023, 10, 20), false), // 3 tomorrow
    (date(1926, 10, 19), true),  // 100 today
    (date(1925, 10, 18), false), // 101
  ];

  let cpfs = [CPF_A, CPF_B];
  let mut accepted = 0;
  for (birth_date, ok) in cases {
    let cpf = cpfs[accepted % cpfs.len()];
    let mut request = f.request(cpf, "Aluno");
    request.birth_date = birth_date;

    match f.intake().enroll(request).await {
      Ok(_) => {
        assert!(ok, "{birth_date} should be rejected");
        accepted += 1;
      }
      Err(err) => {
        assert!(!ok, "{birth_date} should be accepted: {err}");
        assert_eq!(err.fields()[0].field, "birth_date");
      }
    }
  }
  assert_eq!(accepted, 2);
}

/// 22:00 on 2026-10-19 in São Paulo, already the 20th in UTC.
struct EveningClock;

impl Clock for EveningClock {
  fn now(&self) -> DateTime<Utc> { Utc.with_ymd_and_hms(2026, 10, 20, 1, 0, 0).unwrap() }

  fn today(&self) -> NaiveDate { date(2026, 10, 19) }
}

#[tokio::test]
async fn age_is_measured_on_the_clock_calendar_date() {
  let f = fixture().await;
  let intake = EnrollmentIntake::new(
    f.store.clone(),
    Arc::new(f.sqlite.clone()),
    Arc::new(f.sqlite.clone()),
    Arc::new(EveningClock),
    f.signal.clone(),
  );

  // Three on the UTC date, still two locally.
  let mut request = f.request(CPF_A, "Ana");
  request.birth_date = date(2023, 10, 20);
  let err = intake.enroll(request).await.unwrap_err();
  assert_eq!(err.fields()[0].field, "birth_date");

  let mut request = f.request(CPF_A, "Ana");
  request.birth_date = date(2023, 10, 19);
  let enrollment_id = intake.enroll(request).await.unwrap();

  // Timestamps still come from the instant.
  let (enrollment, ..) = f.documents_of(enrollment_id).await;
  assert_eq!(enrollment.created_at, EveningClock.now());
}

#[tokio::test]
async fn missing_unit_and_period_are_reported_together() {
  let f = fixture().await;
  let mut request = f.request(CPF_A, "Ana");
  request.unit_id = Uuid::new_v4();
  request.period_id = Uuid::new_v4();

  let err = f.intake().enroll(request).await.unwrap_err();
  let fields: Vec<_> = err.fields().iter().map(|e| e.field.as_str()).collect();
  assert_eq!(fields, ["unit_id", "period_id"]);
  assert!(err.to_string().contains("unit not found"));
}

// ─── Atomicity ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_enrollment_insert_rolls_back_everything() {
  let f = flaky_fixture(true, false).await;

  let err = f.intake().enroll(f.request(CPF_A, "Ana")).await.unwrap_err();
  assert!(matches!(err, IntakeError::Store(_)));
  assert!(err.to_string().contains("create_enrollment"));

  let counts = f.sqlite.counts().await.unwrap();
  assert_eq!(counts.students, 0);
  assert_eq!(counts.documents, 0);
  assert_eq!(counts.enrollments, 0);
  assert_eq!(counts.queued_tasks, 0);
}

#[tokio::test]
async fn enqueue_failure_does_not_fail_the_request() {
  let f = flaky_fixture(false, true).await;

  let enrollment_id = f.intake().enroll(f.request(CPF_A, "Ana")).await.unwrap();

  assert!(f.sqlite.get_enrollment(enrollment_id).await.unwrap().is_some());
  let counts = f.sqlite.counts().await.unwrap();
  assert_eq!(counts.pending_documents, 2);
  assert_eq!(counts.queued_tasks, 0);
}

#[tokio::test]
async fn run_in_transaction_commits_or_rolls_back() {
  type BoxError = Box<dyn std::error::Error + Send + Sync>;
  let (store, ..) = sqlite().await;

  let kept: Result<_, BoxError> = run_in_transaction(&store, async |tx| {
    Ok(store.create_pending(tx, Bytes::from_static(b"kept")).await?)
  })
  .await;
  let kept = kept.unwrap();

  let discarded: Result<(), BoxError> = run_in_transaction(&store, async |tx| {
    store.create_pending(tx, Bytes::from_static(b"discarded")).await?;
    Err("abort".into())
  })
  .await;
  assert_eq!(discarded.unwrap_err().to_string(), "abort");

  let counts = store.counts().await.unwrap();
  assert_eq!(counts.documents, 1);
  assert!(store.get_document(kept.document_id).await.unwrap().is_some());
}

// ─── Materialization ─────────────────────────────────────────────────────────

#[tokio::test]
async fn uploads_finalize_both_documents() {
  let f = fixture().await;
  let enrollment_id = f.intake().enroll(f.request(CPF_A, "Ana")).await.unwrap();

  let dispatcher = f.dispatcher(StubUploader::default());
  let task = dispatcher.process_next().await.unwrap().unwrap();
  assert!(task.failures.is_empty());
  assert_eq!(task.enrollment_id, enrollment_id);

  let (_, residence, history) = f.documents_of(enrollment_id).await;
  assert_eq!(residence.location(), Some("/stub/comprovante.pdf"));
  assert_eq!(history.location(), Some("/stub/historico.pdf"));
  assert_eq!(f.sqlite.counts().await.unwrap().pending_documents, 0);

  assert!(dispatcher.process_next().await.unwrap().is_none());
}

#[tokio::test]
async fn failed_upload_leaves_only_that_document_pending() {
  let f = fixture().await;
  let enrollment_id = f.intake().enroll(f.request(CPF_A, "Ana")).await.unwrap();

  let dispatcher = f.dispatcher(StubUploader::failing("historico.pdf"));
  let task = dispatcher.process_next().await.unwrap().unwrap();

  let (enrollment, residence, history) = f.documents_of(enrollment_id).await;
  assert_eq!(residence.location(), Some("/stub/comprovante.pdf"));
  assert!(history.is_pending());
  assert_eq!(history.content().map(|c| c.as_ref()), Some(&b"notas 2026"[..]));

  assert_eq!(task.failures.len(), 1);
  assert_eq!(task.failures[0].document_id, enrollment.academic_history_id);
  assert!(task.failures[0].reason.contains("historico.pdf"));

  // Not retried.
  assert_eq!(dispatcher.drain().await.unwrap(), 0);
}

#[tokio::test]
async fn missing_documents_are_recorded_as_failures() {
  let f = fixture().await;
  let missing = [Uuid::new_v4(), Uuid::new_v4()];
  f.sqlite
    .enqueue(NewMaterialization {
      enrollment_id:      Uuid::new_v4(),
      proof_of_residence: PendingUpload { document_id: missing[0], filename: "a.pdf".into() },
      academic_history:   PendingUpload { document_id: missing[1], filename: "b.pdf".into() },
    })
    .await
    .unwrap();

  let uploader = StubUploader::default();
  let dispatcher = f.dispatcher(uploader);
  let task = dispatcher.process_next().await.unwrap().unwrap();

  let failed: Vec<_> = task.failures.iter().map(|f| f.document_id).collect();
  assert_eq!(failed, missing);
  assert!(task.failures.iter().all(|f| f.reason == "document not found"));
}

#[tokio::test]
async fn already_finalized_document_is_skipped() {
  let f = fixture().await;
  let enrollment_id = f.intake().enroll(f.request(CPF_A, "Ana")).await.unwrap();
  let (enrollment, ..) = f.documents_of(enrollment_id).await;
  f.sqlite
    .finalize(enrollment.proof_of_residence_id, "/elsewhere/a.pdf".into())
    .await
    .unwrap();

  let task = f
    .dispatcher(StubUploader::default())
    .process_next()
    .await
    .unwrap()
    .unwrap();

  assert_eq!(task.failures.len(), 1);
  assert_eq!(task.failures[0].document_id, enrollment.proof_of_residence_id);
  let (_, residence, history) = f.documents_of(enrollment_id).await;
  assert_eq!(residence.location(), Some("/elsewhere/a.pdf"));
  assert_eq!(history.location(), Some("/stub/historico.pdf"));
}

#[tokio::test]
async fn enroll_returns_before_uploads_finish() {
  let f = fixture().await;
  let permits = Arc::new(Semaphore::new(0));
  let dispatcher = f.dispatcher(GatedUploader { permits: permits.clone() });
  let worker = tokio::spawn(async move { dispatcher.run().await });

  let enrollment_id = f.intake().enroll(f.request(CPF_A, "Ana")).await.unwrap();

  // Give the dispatcher time to claim the task and block on the uploads.
  tokio::time::sleep(Duration::from_millis(100)).await;
  let (_, residence, history) = f.documents_of(enrollment_id).await;
  assert!(residence.is_pending());
  assert!(history.is_pending());

  permits.add_permits(2);

  let finalized = tokio::time::timeout(Duration::from_secs(5), async {
    loop {
      if f.sqlite.counts().await.unwrap().pending_documents == 0 {
        break;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
  })
  .await;
  assert!(finalized.is_ok(), "documents were never finalized");

  let (_, residence, _) = f.documents_of(enrollment_id).await;
  assert_eq!(residence.location(), Some("/gated/comprovante.pdf"));

  worker.abort();
}

#[tokio::test]
async fn both_documents_upload_concurrently() {
  let f = fixture().await;
  let enrollment_id = f.intake().enroll(f.request(CPF_A, "Ana")).await.unwrap();

  let dispatcher = f.dispatcher(BarrierUploader { barrier: Barrier::new(2) });
  let task = dispatcher.process_next().await.unwrap().unwrap();
  assert!(task.failures.is_empty(), "{:?}", task.failures);

  let (_, residence, history) = f.documents_of(enrollment_id).await;
  assert_eq!(residence.location(), Some("/together/comprovante.pdf"));
  assert_eq!(history.location(), Some("/together/historico.pdf"));
}

#[tokio::test]
async fn abandoned_claim_is_picked_up_again() {
  let f = fixture().await;
  let enrollment_id = f.intake().enroll(f.request(CPF_A, "Ana")).await.unwrap();

  // A worker claims the task and dies before completing it.
  let claimed = f.sqlite.claim_next(Utc::now()).await.unwrap().unwrap();
  drop(claimed);
  tokio::time::sleep(Duration::from_millis(10)).await;

  // Within the default timeout the claim is still honoured.
  assert_eq!(f.dispatcher(StubUploader::default()).drain().await.unwrap(), 0);
  assert_eq!(f.sqlite.counts().await.unwrap().pending_documents, 2);

  let dispatcher = f
    .dispatcher(StubUploader::default())
    .with_claim_timeout(Duration::ZERO);
  assert_eq!(dispatcher.drain().await.unwrap(), 1);
  assert_eq!(f.sqlite.counts().await.unwrap().pending_documents, 0);

  let (_, residence, _) = f.documents_of(enrollment_id).await;
  assert_eq!(residence.location(), Some("/stub/comprovante.pdf"));
}

#[tokio::test]
async fn shutdown_waits_for_in_flight_uploads() {
  let f = fixture().await;
  let permits = Arc::new(Semaphore::new(0));
  let dispatcher = f.dispatcher(GatedUploader { permits: permits.clone() });
  let (stop, stopped) = oneshot::channel::<()>();
  let worker = tokio::spawn(async move {
    dispatcher
      .run_until(async {
        let _ = stopped.await;
      })
      .await
  });

  f.intake().enroll(f.request(CPF_A, "Ana")).await.unwrap();
  tokio::time::sleep(Duration::from_millis(100)).await;
  assert_eq!(f.sqlite.counts().await.unwrap().pending_documents, 2);

  stop.send(()).unwrap();
  tokio::time::sleep(Duration::from_millis(50)).await;
  assert!(!worker.is_finished(), "worker returned with uploads in flight");

  permits.add_permits(2);
  tokio::time::timeout(Duration::from_secs(5), worker)
    .await
    .expect("worker never stopped")
    .unwrap();
  assert_eq!(f.sqlite.counts().await.unwrap().pending_documents, 0);
}
