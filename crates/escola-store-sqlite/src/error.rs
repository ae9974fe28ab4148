//! Error type for `escola-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] escola_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("stored content is not valid base64: {0}")]
  Base64(#[from] base64::DecodeError),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown document status: {0:?}")]
  UnknownDocumentStatus(String),

  #[error("document not found: {0}")]
  DocumentNotFound(uuid::Uuid),

  #[error("document {0} is already finalized")]
  DocumentAlreadyFinalized(uuid::Uuid),

  #[error("materialization task not found: {0}")]
  TaskNotFound(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
