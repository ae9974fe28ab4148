//! Existence checks for the entities an enrollment points at.
//!
//! Units and academic periods are managed elsewhere; intake only needs to
//! know whether an identifier refers to one.

use std::future::Future;

use uuid::Uuid;

pub trait UnitDirectory: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn unit_exists(
    &self,
    unit_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}

pub trait PeriodDirectory: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn period_exists(
    &self,
    period_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}
