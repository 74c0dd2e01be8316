// src/services/calendar.rs
//! Quarter labels and quarter arithmetic. Pure functions, no clock access.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::CalendarError;

const APOSTROPHES: [char; 3] = ['\'', '\u{2019}', '\u{2018}'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QuarterLabel {
    pub year: i32,
    pub quarter: u8,
}

/// Two-digit years below 50 belong to the 2000s, the rest to the 1900s.
pub fn expand_two_digit_year(yy: i32) -> i32 {
    if yy < 50 {
        2000 + yy
    } else {
        1900 + yy
    }
}

impl QuarterLabel {
    pub fn new(year: i32, quarter: u8) -> Result<Self, CalendarError> {
        if (1..=4).contains(&quarter) {
            Ok(QuarterLabel { year, quarter })
        } else {
            Err(CalendarError::UnparsablePeriod(format!("{}Q{}", year, quarter)))
        }
    }

    pub fn next(self) -> Self {
        if self.quarter == 4 {
            QuarterLabel { year: self.year + 1, quarter: 1 }
        } else {
            QuarterLabel { year: self.year, quarter: self.quarter + 1 }
        }
    }

    pub fn prior(self) -> Self {
        if self.quarter == 1 {
            QuarterLabel { year: self.year - 1, quarter: 4 }
        } else {
            QuarterLabel { year: self.year, quarter: self.quarter - 1 }
        }
    }

    pub fn same_quarter_last_year(self) -> Self {
        QuarterLabel { year: self.year - 1, quarter: self.quarter }
    }

    pub fn same_quarter_next_year(self) -> Self {
        QuarterLabel { year: self.year + 1, quarter: self.quarter }
    }

    /// The four quarters of a calendar year, Q1 first.
    pub fn quarters_of(year: i32) -> [QuarterLabel; 4] {
        [1, 2, 3, 4].map(|quarter| QuarterLabel { year, quarter })
    }

    /// Last calendar day of the quarter.
    pub fn end_date(self) -> NaiveDate {
        let (month, day) = match self.quarter {
            1 => (3, 31),
            2 => (6, 30),
            3 => (9, 30),
            _ => (12, 31),
        };
        NaiveDate::from_ymd_opt(self.year, month, day).unwrap_or(NaiveDate::MIN)
    }

    /// Calendar quarter containing `date`.
    pub fn from_date(date: NaiveDate) -> Self {
        QuarterLabel {
            year: date.year(),
            quarter: ((date.month0() / 3) + 1) as u8,
        }
    }

    /// Axis rendering, e.g. `Q1 '24`.
    pub fn short_label(self) -> String {
        format!("Q{} '{:02}", self.quarter, self.year.rem_euclid(100))
    }
}

impl fmt::Display for QuarterLabel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}Q{}", self.year, self.quarter)
    }
}

/// Strict axis grammar: `Qn 'YY` (any apostrophe, optional spaces) or `YYYYQn`.
pub fn parse_axis_quarter(text: &str) -> Option<QuarterLabel> {
    let text = text.trim();
    if let Some(rest) = text.strip_prefix('Q') {
        let mut chars = rest.chars();
        let quarter = quarter_digit(chars.next()?)?;
        let rest = chars.as_str().trim_start();
        let rest = rest.strip_prefix(|c: char| APOSTROPHES.contains(&c))?.trim_start();
        if rest.len() != 2 || !rest.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let yy: i32 = rest.parse().ok()?;
        return Some(QuarterLabel { year: expand_two_digit_year(yy), quarter });
    }

    let bytes = text.as_bytes();
    if bytes.len() == 6 && bytes[..4].iter().all(u8::is_ascii_digit) && bytes[4] == b'Q' {
        let year: i32 = text[..4].parse().ok()?;
        let quarter = quarter_digit(bytes[5] as char)?;
        return Some(QuarterLabel { year, quarter });
    }
    None
}

fn quarter_digit(c: char) -> Option<u8> {
    match c {
        '1'..='4' => Some(c as u8 - b'0'),
        _ => None,
    }
}

impl FromStr for QuarterLabel {
    type Err = CalendarError;

    /// Accepts the axis grammar plus `YYYY-Qn`, `YYYY Qn` and `Qn YYYY`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unparsable = || CalendarError::UnparsablePeriod(s.to_string());
        if let Some(label) = parse_axis_quarter(s) {
            return Ok(label);
        }

        let compact: String = s
            .trim()
            .to_ascii_uppercase()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect();

        // YYYYQn
        if let Some(label) = parse_axis_quarter(&compact) {
            return Ok(label);
        }
        // QnYYYY
        if compact.len() == 6 && compact.is_ascii() && compact.starts_with('Q') {
            let quarter = compact[1..2]
                .chars()
                .next()
                .and_then(quarter_digit)
                .ok_or_else(unparsable)?;
            let year: i32 = compact[2..].parse().map_err(|_| unparsable())?;
            return Ok(QuarterLabel { year, quarter });
        }
        Err(unparsable())
    }
}

impl Serialize for QuarterLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for QuarterLabel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

pub fn parse(label: &str) -> Result<QuarterLabel, CalendarError> {
    label.parse()
}

pub fn next(label: &str) -> Result<QuarterLabel, CalendarError> {
    parse(label).map(QuarterLabel::next)
}

pub fn prior(label: &str) -> Result<QuarterLabel, CalendarError> {
    parse(label).map(QuarterLabel::prior)
}

pub fn same_quarter_last_year(label: &str) -> Result<QuarterLabel, CalendarError> {
    parse(label).map(QuarterLabel::same_quarter_last_year)
}
