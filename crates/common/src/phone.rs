//! Canonical phone-number form used for credential and notification keys.
//!
//! All credential operations key on phone numbers, so the whole system
//! agrees on a single normalized representation: country-code-prefixed
//! digits with no `+`, no `00` prefix and no leading zero. Callers holding
//! raw user input normalize through [`PhoneNumber::parse`] before touching
//! the credential store, since an unnormalized lookup key would never
//! match.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while normalizing a raw phone number.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhoneError {
    /// The input contained no digits at all.
    #[error("phone number is empty")]
    Empty,

    /// The number starts with a zero after normalization, meaning the
    /// country code is missing.
    #[error("phone number must be country-code prefixed (leading zero found)")]
    LeadingZero,

    /// The digit count falls outside the plausible E.164 range.
    #[error("phone number has {0} digits, expected 8 to 15")]
    BadLength(usize),
}

/// A phone number in canonical normalized form.
///
/// Construction goes through [`PhoneNumber::parse`], which strips
/// formatting characters, the `+` sign and an international `00` prefix,
/// then rejects anything that still lacks a country code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Normalizes raw input into the canonical form.
    pub fn parse(raw: &str) -> Result<Self, PhoneError> {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();

        if digits.is_empty() {
            return Err(PhoneError::Empty);
        }

        let digits = match digits.strip_prefix("00") {
            Some(rest) => rest.to_string(),
            None => digits,
        };

        if digits.starts_with('0') {
            return Err(PhoneError::LeadingZero);
        }
        if !(8..=15).contains(&digits.len()) {
            return Err(PhoneError::BadLength(digits.len()));
        }

        Ok(Self(digits))
    }

    /// Returns the normalized digits as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PhoneNumber {
    type Err = PhoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_international_number() {
        let phone = PhoneNumber::parse("966551234567").unwrap();
        assert_eq!(phone.as_str(), "966551234567");
    }

    #[test]
    fn parse_strips_plus_and_formatting() {
        let phone = PhoneNumber::parse("+966 55 123 4567").unwrap();
        assert_eq!(phone.as_str(), "966551234567");
    }

    #[test]
    fn parse_strips_double_zero_prefix() {
        let phone = PhoneNumber::parse("00966551234567").unwrap();
        assert_eq!(phone.as_str(), "966551234567");
    }

    #[test]
    fn parse_rejects_local_format() {
        assert_eq!(
            PhoneNumber::parse("0551234567"),
            Err(PhoneError::LeadingZero)
        );
    }

    #[test]
    fn parse_rejects_empty_input() {
        assert_eq!(PhoneNumber::parse("call me"), Err(PhoneError::Empty));
    }

    #[test]
    fn parse_rejects_bad_lengths() {
        assert_eq!(PhoneNumber::parse("1234567"), Err(PhoneError::BadLength(7)));
        assert_eq!(
            PhoneNumber::parse("1234567890123456"),
            Err(PhoneError::BadLength(16))
        );
    }

    #[test]
    fn identical_inputs_normalize_identically() {
        let a = PhoneNumber::parse("+966551234567").unwrap();
        let b = PhoneNumber::parse("00966551234567").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn serialization_roundtrip() {
        let phone = PhoneNumber::parse("966551234567").unwrap();
        let json = serde_json::to_string(&phone).unwrap();
        assert_eq!(json, "\"966551234567\"");
        let back: PhoneNumber = serde_json::from_str(&json).unwrap();
        assert_eq!(phone, back);
    }
}
