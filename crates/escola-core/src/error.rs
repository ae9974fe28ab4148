//! Error types for `escola-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid CPF: {0:?}")]
  InvalidCpf(String),

  #[error("unknown enrollment status: {0:?}")]
  UnknownEnrollmentStatus(String),

  #[error("unknown task status: {0:?}")]
  UnknownTaskStatus(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
