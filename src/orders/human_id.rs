//! Human-readable order codes of the form `JR{YY}{MM}{NNNN}`
//!
//! The code is printed on receipts and typed into the tracking page, so the
//! format must stay stable. The sequence is the number of orders that
//! existed before this one plus one, zero-padded to four digits and allowed
//! to grow wider once it passes 9999.

use chrono::{DateTime, Datelike, Utc};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Prefix used when none is configured
pub const DEFAULT_PREFIX: &str = "JR";

static HUMAN_ID_PATTERN: OnceLock<Regex> = OnceLock::new();

fn pattern() -> &'static Regex {
    HUMAN_ID_PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Z]{1,8})(\d{2})(\d{2})(\d{4,})$")
            .expect("human order id pattern is valid")
    })
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HumanIdError {
    #[error("'{0}' is not a valid order code")]
    Malformed(String),

    #[error("'{code}' has month {month}, expected 01-12")]
    InvalidMonth { code: String, month: u32 },
}

/// Parsed form of a human order code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HumanOrderId {
    pub prefix: String,
    pub year: u32,
    pub month: u32,
    pub sequence: u64,
}

impl HumanOrderId {
    /// Code for the `sequence`-th order created at `at`
    pub fn new(prefix: &str, at: DateTime<Utc>, sequence: u64) -> Self {
        Self {
            prefix: prefix.to_string(),
            year: at.year().rem_euclid(100) as u32,
            month: at.month(),
            sequence,
        }
    }

    /// Code for the next order, given how many orders already exist
    pub fn next(prefix: &str, at: DateTime<Utc>, existing_orders: u64) -> Self {
        Self::new(prefix, at, existing_orders + 1)
    }

    pub fn parse(code: &str) -> Result<Self, HumanIdError> {
        let captures = pattern()
            .captures(code)
            .ok_or_else(|| HumanIdError::Malformed(code.to_string()))?;

        let number = |index: usize| -> Result<u64, HumanIdError> {
            captures[index]
                .parse::<u64>()
                .map_err(|_| HumanIdError::Malformed(code.to_string()))
        };

        let year = number(2)? as u32;
        let month = number(3)? as u32;
        if !(1..=12).contains(&month) {
            return Err(HumanIdError::InvalidMonth {
                code: code.to_string(),
                month,
            });
        }

        Ok(Self {
            prefix: captures[1].to_string(),
            year,
            month,
            sequence: number(4)?,
        })
    }

    /// Whether the code carries the year and month of `at`
    pub fn issued_in(&self, at: DateTime<Utc>) -> bool {
        self.year == at.year().rem_euclid(100) as u32 && self.month == at.month()
    }
}

impl fmt::Display for HumanOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{:02}{:02}{:04}",
            self.prefix, self.year, self.month, self.sequence
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn march_2025() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_format_is_zero_padded() {
        let id = HumanOrderId::next(DEFAULT_PREFIX, march_2025(), 0);
        assert_eq!(id.to_string(), "JR25030001");

        let id = HumanOrderId::next(DEFAULT_PREFIX, march_2025(), 41);
        assert_eq!(id.to_string(), "JR25030042");
    }

    #[test]
    fn test_sequence_widens_past_four_digits() {
        let id = HumanOrderId::next(DEFAULT_PREFIX, march_2025(), 12_344);
        assert_eq!(id.to_string(), "JR250312345");
        assert_eq!(HumanOrderId::parse("JR250312345").unwrap().sequence, 12_345);
    }

    #[test]
    fn test_parse_round_trips_display() {
        let id = HumanOrderId::new("JR", march_2025(), 7);
        let parsed = HumanOrderId::parse(&id.to_string()).unwrap();
        assert_eq!(parsed, id);
        assert!(parsed.issued_in(march_2025()));
    }

    #[test]
    fn test_parse_rejects_malformed_codes() {
        assert!(matches!(
            HumanOrderId::parse("jr25030001"),
            Err(HumanIdError::Malformed(_))
        ));
        assert!(matches!(
            HumanOrderId::parse("JR2503001"),
            Err(HumanIdError::Malformed(_))
        ));
        assert!(matches!(
            HumanOrderId::parse("JR25130001"),
            Err(HumanIdError::InvalidMonth { month: 13, .. })
        ));
    }

    #[test]
    fn test_custom_prefix() {
        let id = HumanOrderId::next("MK", march_2025(), 9);
        assert_eq!(id.to_string(), "MK25030010");
    }
}
