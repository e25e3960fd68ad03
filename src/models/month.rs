use crate::error::PipelineError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Calendar year-month identifying one unit of work (e.g. "2025-06")
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Result<Self, PipelineError> {
        if !(1..=12).contains(&month) {
            return Err(PipelineError::ConfigInvalid(format!(
                "month {} out of range 1-12",
                month
            )));
        }
        if !(1000..=9999).contains(&year) {
            return Err(PipelineError::ConfigInvalid(format!(
                "year {} must have four digits",
                year
            )));
        }
        Ok(Self { year, month })
    }

    /// Parse the fixed `YYYY-MM` form
    pub fn parse(s: &str) -> Result<Self, PipelineError> {
        let invalid = || {
            PipelineError::ConfigInvalid(format!("'{}' is not a month in YYYY-MM form", s))
        };

        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        if !year.bytes().chain(month.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Self::new(year, month).map_err(|_| invalid())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Two-digit year, e.g. "25" for 2025
    pub fn short_year(&self) -> String {
        format!("{:02}", self.year % 100)
    }

    /// Token the exchange embeds in raw report file names, e.g. "m2506"
    pub fn report_code(&self) -> String {
        format!("m{}{:02}", self.short_year(), self.month)
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonthKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        MonthKey::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display_round_trip() {
        let key = MonthKey::parse("2025-06").unwrap();
        assert_eq!(key.year(), 2025);
        assert_eq!(key.month(), 6);
        assert_eq!(key.to_string(), "2025-06");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["2025-6", "2025-13", "2025-00", "25-06", "2025/06", "2025-06x", "", "abcd-ef", "+025-06"] {
            assert!(MonthKey::parse(bad).is_err(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_ordering_is_chronological() {
        let mut keys: Vec<MonthKey> = ["2025-06", "2024-12", "2025-01"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        keys.sort();
        let rendered: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(rendered, vec!["2024-12", "2025-01", "2025-06"]);
    }

    #[test]
    fn test_report_code() {
        assert_eq!(MonthKey::parse("2025-06").unwrap().report_code(), "m2506");
        assert_eq!(MonthKey::parse("2009-11").unwrap().report_code(), "m0911");
    }

    #[test]
    fn test_serde_as_string() {
        let key = MonthKey::parse("2025-05").unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"2025-05\"");
        let back: MonthKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
        assert!(serde_json::from_str::<MonthKey>("\"2025-5\"").is_err());
    }
}
