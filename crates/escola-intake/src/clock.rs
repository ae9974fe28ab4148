use chrono::{DateTime, Local, NaiveDate, Utc};
use escola_core::clock::Clock;

/// The wall clock. Ages are measured on the host's local calendar.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> { Utc::now() }

  fn today(&self) -> NaiveDate { Local::now().date_naive() }
}
