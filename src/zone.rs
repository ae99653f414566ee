//! Zone codes: the postal-code-like key used to batch weather requests.
//!
//! A zone code is an opaque text token. It is validated by length and charset
//! only and is never parsed as a number, so `"07306"` keeps its leading zero
//! through every table and ledger round trip.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Longest zone code accepted.
pub const MAX_ZONE_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ZoneCodeError {
    #[error("zone code is empty")]
    Empty,

    #[error("zone code '{0}' is longer than {MAX_ZONE_LEN} characters")]
    TooLong(String),

    #[error("zone code '{code}' contains invalid character {ch:?}")]
    InvalidChar { code: String, ch: char },
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ZoneCode(String);

impl ZoneCode {
    /// Validates `code` after trimming surrounding whitespace.
    pub fn new(code: &str) -> Result<Self, ZoneCodeError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ZoneCodeError::Empty);
        }
        if code.chars().count() > MAX_ZONE_LEN {
            return Err(ZoneCodeError::TooLong(code.to_string()));
        }
        if let Some(ch) = code.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(ZoneCodeError::InvalidChar {
                code: code.to_string(),
                ch,
            });
        }
        Ok(Self(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ZoneCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ZoneCode {
    type Err = ZoneCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ZoneCode {
    type Error = ZoneCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<ZoneCode> for String {
    fn from(zone: ZoneCode) -> Self {
        zone.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_zero_is_kept() {
        let zone = ZoneCode::new("07306").unwrap();
        assert_eq!(zone.as_str(), "07306");
        assert_ne!(zone, ZoneCode::new("7306").unwrap());
    }

    #[test]
    fn test_whitespace_is_trimmed() {
        assert_eq!(ZoneCode::new(" 11101 ").unwrap().as_str(), "11101");
    }

    #[test]
    fn test_rejects_empty_and_bad_chars() {
        assert_eq!(ZoneCode::new("  "), Err(ZoneCodeError::Empty));
        assert!(matches!(
            ZoneCode::new("07306.0"),
            Err(ZoneCodeError::InvalidChar { ch: '.', .. })
        ));
        assert!(matches!(
            ZoneCode::new("12345678901"),
            Err(ZoneCodeError::TooLong(_))
        ));
    }

    #[test]
    fn test_orders_as_text() {
        let a = ZoneCode::new("07306").unwrap();
        let b = ZoneCode::new("11101").unwrap();
        let c = ZoneCode::new("7306").unwrap();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_json_round_trip_stays_text() {
        let zone = ZoneCode::new("07306").unwrap();
        let json = serde_json::to_string(&zone).unwrap();
        assert_eq!(json, "\"07306\"");
        let back: ZoneCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, zone);
    }
}
