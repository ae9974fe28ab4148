//! Error type returned to intake callers.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// One rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
  pub field:   String,
  pub message: String,
}

impl FieldError {
  pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
    Self { field: field.into(), message: message.into() }
  }
}

impl fmt::Display for FieldError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.field, self.message)
  }
}

#[derive(Debug, Error)]
pub enum IntakeError {
  /// The request was rejected before anything was written.
  #[error("validation failed: {}", join(.0))]
  Validation(Vec<FieldError>),

  /// The request collides with existing data.
  #[error("conflict: {0}")]
  Conflict(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl IntakeError {
  pub(crate) fn invalid(field: &str, message: &str) -> Self {
    Self::Validation(vec![FieldError::new(field, message)])
  }

  pub(crate) fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }

  /// The rejected fields, if this is a validation error.
  pub fn fields(&self) -> &[FieldError] {
    match self {
      Self::Validation(fields) => fields,
      _ => &[],
    }
  }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for IntakeError {
  fn from(e: Box<dyn std::error::Error + Send + Sync>) -> Self { Self::Store(e) }
}

fn join(fields: &[FieldError]) -> String {
  fields
    .iter()
    .map(ToString::to_string)
    .collect::<Vec<_>>()
    .join("; ")
}
