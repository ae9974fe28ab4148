//! Students and the age rule applied at intake.
//!
//! A student is created once per CPF and never updated afterwards.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cpf::Cpf;

/// Youngest accepted age, in whole years.
pub const MIN_AGE: i32 = 3;
/// Oldest accepted age, in whole years.
pub const MAX_AGE: i32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
  pub student_id:  Uuid,
  pub full_name:   String,
  pub national_id: Cpf,
  pub birth_date:  NaiveDate,
}

/// Input for [`StudentRegistry::create_student`](crate::store::StudentRegistry::create_student).
#[derive(Debug, Clone)]
pub struct NewStudent {
  pub full_name:   String,
  pub national_id: Cpf,
  pub birth_date:  NaiveDate,
}

/// Whole years elapsed between `birth_date` and `today`.
///
/// One is subtracted when today's month/day precedes the birth month/day,
/// so a birthday later in the year has not yet counted.
pub fn age_in_years(birth_date: NaiveDate, today: NaiveDate) -> i32 {
  let mut age = today.year() - birth_date.year();
  if (today.month(), today.day()) < (birth_date.month(), birth_date.day()) {
    age -= 1;
  }
  age
}

/// Returns `true` if the age on `today` lies within [`MIN_AGE`]..=[`MAX_AGE`].
pub fn age_is_acceptable(birth_date: NaiveDate, today: NaiveDate) -> bool {
  (MIN_AGE..=MAX_AGE).contains(&age_in_years(birth_date, today))
}
