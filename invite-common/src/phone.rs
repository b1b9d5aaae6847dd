//! Phone number normalization
//!
//! Every phone that is used as a lookup key goes through [`PhoneNumber::parse`]
//! first. Accepted inputs are Korean mobile numbers in any of the usual
//! spellings; the canonical form is `+82` followed by the national number
//! without its leading zero.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

const COUNTRY_CODE: &str = "82";
const NATIONAL_DIGITS: usize = 11;

/// Canonical phone number (`+821012345678`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Normalize user input.
    ///
    /// Separators (spaces, dashes, dots, parentheses) are ignored. The input
    /// must reduce to exactly 11 national digits starting with `0`, either
    /// written directly (`010...`) or behind the `82` country code with the
    /// trunk zero dropped (`+82 10...`).
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidPhone("empty".to_string()));
        }

        let mut digits = String::with_capacity(trimmed.len());
        for (i, c) in trimmed.chars().enumerate() {
            match c {
                '0'..='9' => digits.push(c),
                '+' if i == 0 => {}
                ' ' | '-' | '.' | '(' | ')' => {}
                _ => return Err(Error::InvalidPhone(format!("unexpected character '{}'", c))),
            }
        }

        let international = trimmed.starts_with('+')
            || (digits.starts_with(COUNTRY_CODE) && digits.len() == NATIONAL_DIGITS + 1);

        let national = if international {
            match digits.strip_prefix(COUNTRY_CODE) {
                Some(rest) if !rest.starts_with('0') => format!("0{}", rest),
                Some(rest) => rest.to_string(),
                None => return Err(Error::InvalidPhone("unsupported country code".to_string())),
            }
        } else {
            digits
        };

        if national.len() != NATIONAL_DIGITS || !national.starts_with('0') {
            return Err(Error::InvalidPhone(format!(
                "expected {} national digits, got {}",
                NATIONAL_DIGITS,
                national.len()
            )));
        }

        Ok(Self(format!("+{}{}", COUNTRY_CODE, &national[1..])))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// National spelling (`010-1234-5678`) for display
    pub fn national(&self) -> String {
        let rest = &self.0[1 + COUNTRY_CODE.len()..];
        format!("0{}-{}-{}", &rest[..2], &rest[2..6], &rest[6..])
    }

    /// Masked form for logs (`+82 10-****-5678`)
    pub fn masked(&self) -> String {
        let rest = &self.0[1 + COUNTRY_CODE.len()..];
        format!("+{} {}-****-{}", COUNTRY_CODE, &rest[..2], &rest[6..])
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(phone: PhoneNumber) -> Self {
        phone.0
    }
}
