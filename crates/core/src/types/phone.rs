//! Indian mobile number.
//!
//! The payment gateway requires a bare 10-digit mobile number, so numbers are
//! stored without country code or trunk prefix.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Phone`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneError {
    #[error("phone number must contain exactly 10 digits after the country code")]
    InvalidLength,
    #[error("phone number may only contain digits, spaces, dashes and a leading +")]
    InvalidCharacter,
    #[error("mobile numbers must start with 6, 7, 8 or 9")]
    InvalidPrefix,
}

/// A 10-digit Indian mobile number.
///
/// Accepts `+91`, `91` and `0` prefixes as well as spaces and dashes:
///
/// ```
/// use restwell_core::Phone;
///
/// assert_eq!(Phone::parse("+91 98765-43210").unwrap().as_str(), "9876543210");
/// assert_eq!(Phone::parse("09876543210").unwrap().as_str(), "9876543210");
/// assert!(Phone::parse("12345").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Phone(String);

impl Phone {
    /// Parse and normalise a mobile number.
    ///
    /// # Errors
    ///
    /// Returns a [`PhoneError`] if the input is not a valid Indian mobile number.
    pub fn parse(input: &str) -> Result<Self, PhoneError> {
        let trimmed = input.trim();
        let without_plus = trimmed.strip_prefix('+').unwrap_or(trimmed);

        let mut digits = String::with_capacity(12);
        for c in without_plus.chars() {
            match c {
                '0'..='9' => digits.push(c),
                ' ' | '-' => {}
                _ => return Err(PhoneError::InvalidCharacter),
            }
        }

        let national = match digits.len() {
            10 => digits.as_str(),
            11 => digits.strip_prefix('0').ok_or(PhoneError::InvalidLength)?,
            12 => digits.strip_prefix("91").ok_or(PhoneError::InvalidLength)?,
            _ => return Err(PhoneError::InvalidLength),
        };

        if !national.starts_with(['6', '7', '8', '9']) {
            return Err(PhoneError::InvalidPrefix);
        }

        Ok(Self(national.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Phone {
    type Error = PhoneError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Phone> for String {
    fn from(phone: Phone) -> Self {
        phone.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_common_formats() {
        for input in ["9876543210", "+919876543210", "91 98765 43210", "098765-43210"] {
            assert_eq!(Phone::parse(input).unwrap().as_str(), "9876543210", "{input}");
        }
    }

    #[test]
    fn test_rejects_landline_prefix() {
        assert_eq!(Phone::parse("2212345678"), Err(PhoneError::InvalidPrefix));
    }

    #[test]
    fn test_rejects_letters() {
        assert_eq!(
            Phone::parse("98765abc10"),
            Err(PhoneError::InvalidCharacter)
        );
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert_eq!(Phone::parse("98765"), Err(PhoneError::InvalidLength));
        assert_eq!(Phone::parse("11987654321"), Err(PhoneError::InvalidLength));
    }
}
