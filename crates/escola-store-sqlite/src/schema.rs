//! SQL schema for the Escola SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Reference rows owned by other parts of the system.
CREATE TABLE IF NOT EXISTS units (
    unit_id     TEXT PRIMARY KEY,
    name        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS academic_periods (
    period_id   TEXT PRIMARY KEY,
    year        INTEGER NOT NULL
);

-- Created once per CPF, never updated.
CREATE TABLE IF NOT EXISTS students (
    student_id  TEXT PRIMARY KEY,
    full_name   TEXT NOT NULL,
    national_id TEXT NOT NULL UNIQUE,  -- 11 digits, no punctuation
    birth_date  TEXT NOT NULL          -- YYYY-MM-DD
);

-- Exactly one of content/location is set, according to status.
CREATE TABLE IF NOT EXISTS documents (
    document_id    TEXT PRIMARY KEY,
    status         TEXT NOT NULL,      -- 'pending' | 'finalized'
    content        TEXT,               -- base64; cleared on finalize
    location       TEXT,               -- set on finalize
    content_sha256 TEXT NOT NULL,
    created_at     TEXT NOT NULL,
    finalized_at   TEXT,
    CHECK (
      (status = 'pending'   AND content IS NOT NULL AND location IS NULL) OR
      (status = 'finalized' AND content IS NULL     AND location IS NOT NULL)
    )
);

-- No UNIQUE (student_id, period_id): duplicates are prevented only by the
-- intake workflow's existence check.
CREATE TABLE IF NOT EXISTS enrollments (
    enrollment_id         TEXT PRIMARY KEY,
    unit_id               TEXT NOT NULL REFERENCES units(unit_id),
    student_id            TEXT NOT NULL REFERENCES students(student_id),
    period_id             TEXT NOT NULL REFERENCES academic_periods(period_id),
    status                TEXT NOT NULL,
    created_at            TEXT NOT NULL,
    proof_of_residence_id TEXT NOT NULL REFERENCES documents(document_id),
    academic_history_id   TEXT NOT NULL REFERENCES documents(document_id)
);

-- Plain ids, no foreign keys: the dispatcher records a missing document as
-- a failure rather than the queue refusing the task.
CREATE TABLE IF NOT EXISTS materialization_tasks (
    task_id               TEXT PRIMARY KEY,
    enrollment_id         TEXT NOT NULL,
    residence_document_id TEXT NOT NULL,
    residence_filename    TEXT NOT NULL,
    history_document_id   TEXT NOT NULL,
    history_filename      TEXT NOT NULL,
    status                TEXT NOT NULL,   -- 'queued' | 'running' | 'done'
    enqueued_at           TEXT NOT NULL,
    claimed_at            TEXT,
    finished_at           TEXT,
    failures              TEXT NOT NULL DEFAULT '[]'
);

CREATE INDEX IF NOT EXISTS enrollments_student_period_idx
    ON enrollments(student_id, period_id);
CREATE INDEX IF NOT EXISTS enrollments_unit_period_idx
    ON enrollments(unit_id, period_id, created_at);
CREATE INDEX IF NOT EXISTS tasks_status_idx
    ON materialization_tasks(status, enqueued_at);

PRAGMA user_version = 1;
";
