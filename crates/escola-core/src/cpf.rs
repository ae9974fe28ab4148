//! CPF, the Brazilian national individual identifier used to deduplicate
//! students.
//!
//! A CPF is eleven decimal digits. The last two are check digits computed
//! with a mod-11 checksum over the preceding digits. Formatting characters
//! (`.` and `-`) are accepted on input and stripped.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const LEN: usize = 11;

/// A validated, normalised (digits only) CPF.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cpf(String);

impl Cpf {
  /// Parse a CPF, accepting either bare digits or the `XXX.XXX.XXX-XX`
  /// layout.
  pub fn parse(input: &str) -> Result<Self> {
    let digits = normalize(input);
    if !is_valid_digits(&digits) {
      return Err(Error::InvalidCpf(input.to_owned()));
    }
    Ok(Self(digits))
  }

  /// The eleven digits, without punctuation.
  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Cpf {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl TryFrom<String> for Cpf {
  type Error = Error;

  fn try_from(value: String) -> Result<Self> { Self::parse(&value) }
}

impl From<Cpf> for String {
  fn from(value: Cpf) -> Self { value.0 }
}

/// Returns `true` if `input` (after stripping non-digits) is a valid CPF.
pub fn is_valid(input: &str) -> bool { is_valid_digits(&normalize(input)) }

/// Remove every non-digit character.
pub fn normalize(input: &str) -> String {
  input.chars().filter(char::is_ascii_digit).collect()
}

fn is_valid_digits(digits: &str) -> bool {
  if digits.len() != LEN || !digits.bytes().all(|b| b.is_ascii_digit()) {
    return false;
  }

  let d: Vec<u32> = digits.bytes().map(|b| u32::from(b - b'0')).collect();

  // 000.000.000-00, 111.111.111-11, ... satisfy the checksum but are
  // never issued.
  if d.iter().all(|&x| x == d[0]) {
    return false;
  }

  check_digit(&d[..9]) == d[9] && check_digit(&d[..10]) == d[10]
}

/// Weighted sum with weights `n+1, n, ..., 2` over `n` digits, then
/// `(sum * 10) mod 11`, where 10 maps to 0.
fn check_digit(digits: &[u32]) -> u32 {
  let top = digits.len() as u32 + 1;
  let sum: u32 = digits
    .iter()
    .enumerate()
    .map(|(i, &digit)| digit * (top - i as u32))
    .sum();
  match (sum * 10) % 11 {
    10 => 0,
    r => r,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn accepts_known_valid_numbers() {
    assert!(is_valid("52998224725"));
    assert!(is_valid("111.444.777-35"));
    // first check digit hits the "10 maps to 0" branch
    assert!(is_valid("123.456.789-09"));
  }

  #[test]
  fn rejects_wrong_check_digits() {
    assert!(!is_valid("52998224724"));
    assert!(!is_valid("52998224715"));
    assert!(!is_valid("12345678900"));
  }

  #[test]
  fn rejects_repeated_digits() {
    for digit in 0..=9 {
      let cpf = digit.to_string().repeat(11);
      assert!(!is_valid(&cpf), "{cpf} should be rejected");
    }
  }

  #[test]
  fn rejects_wrong_length() {
    assert!(!is_valid(""));
    assert!(!is_valid("5299822472"));
    assert!(!is_valid("529982247250"));
  }

  #[test]
  fn parse_normalises_punctuation() {
    let cpf = Cpf::parse("529.982.247-25").unwrap();
    assert_eq!(cpf.as_str(), "52998224725");
  }

  #[test]
  fn parse_reports_original_input() {
    let err = Cpf::parse("111.111.111-11").unwrap_err();
    assert!(matches!(err, Error::InvalidCpf(s) if s == "111.111.111-11"));
  }
}
