use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Host clock reading in milliseconds.
///
/// Only differences between two readings are meaningful; the origin is
/// whatever the host chose when it started counting.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Default)]
pub struct Timestamp(pub f64);

impl Timestamp {
    pub fn millis(self) -> f64 {
        self.0
    }

    pub fn elapsed_since(self, earlier: Timestamp) -> f64 {
        self.0 - earlier.0
    }
}

/// UTC calendar date, written as `YYYY-MM-DD`.
///
/// Ordering agrees with the lexicographic order of the zero-padded text form,
/// so dates can be compared either way.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IsoDate(NaiveDate);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidIsoDate {
    pub input: String,
}

impl fmt::Display for InvalidIsoDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not a YYYY-MM-DD calendar date: {:?}", self.input)
    }
}

impl std::error::Error for InvalidIsoDate {}

impl IsoDate {
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    /// Parses the canonical zero-padded form only.
    ///
    /// `2020-6-1` and `2020-02-30` are both rejected.
    pub fn parse(input: &str) -> Result<Self, InvalidIsoDate> {
        let invalid = || InvalidIsoDate {
            input: input.to_string(),
        };

        let bytes = input.as_bytes();
        if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
            return Err(invalid());
        }
        if !bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit())
        {
            return Err(invalid());
        }

        NaiveDate::parse_from_str(input, "%Y-%m-%d")
            .map(Self)
            .map_err(|_| invalid())
    }

    pub fn today_utc() -> Self {
        Self(Utc::now().date_naive())
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    /// Calendar arithmetic; `None` only when the result leaves chrono's range.
    pub fn shift_days(self, delta: i64) -> Option<Self> {
        let shifted = if delta >= 0 {
            self.0.checked_add_days(Days::new(delta.unsigned_abs()))
        } else {
            self.0.checked_sub_days(Days::new(delta.unsigned_abs()))
        };
        shifted.map(Self)
    }
}

impl fmt::Display for IsoDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}",
            self.0.year(),
            self.0.month(),
            self.0.day()
        )
    }
}

impl FromStr for IsoDate {
    type Err = InvalidIsoDate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for IsoDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IsoDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}
