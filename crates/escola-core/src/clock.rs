//! Source of "now" for age checks and creation timestamps.

use chrono::{DateTime, NaiveDate, Utc};

pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;

  /// The calendar date ages are measured against.
  ///
  /// Defaults to the UTC date of [`now`](Clock::now). Clocks tied to a
  /// place override this with the date on the local calendar, which differs
  /// from the UTC one for part of every day.
  fn today(&self) -> NaiveDate { self.now().date_naive() }
}

/// A clock frozen at a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
  fn now(&self) -> DateTime<Utc> { self.0 }
}
