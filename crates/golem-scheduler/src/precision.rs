use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta, Timelike};
use golem_core::{GolemError, Result};
use serde::{Deserialize, Serialize};

use crate::duration::{
    micros, MICROS_PER_DAY, MICROS_PER_HOUR, MICROS_PER_MINUTE, MICROS_PER_SECOND,
};

/// Display granularity of a job's instants.
///
/// The coarsest unit that evenly divides the interval, the span and the
/// epoch's time of day, so every bin boundary is representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    Microsecond,
    Second,
    Minute,
    Hour,
    Day,
}

impl Precision {
    pub fn of(interval: TimeDelta, span: TimeDelta, epoch: NaiveDateTime) -> Self {
        let tod = i64::from(epoch.num_seconds_from_midnight()) * MICROS_PER_SECOND
            + i64::from(epoch.nanosecond() / 1_000);
        let parts = [micros(interval), micros(span), tod];
        [
            Precision::Day,
            Precision::Hour,
            Precision::Minute,
            Precision::Second,
        ]
        .into_iter()
        .find(|p| parts.iter().all(|v| v % p.unit_micros() == 0))
        .unwrap_or(Precision::Microsecond)
    }

    pub fn unit_micros(self) -> i64 {
        match self {
            Precision::Microsecond => 1,
            Precision::Second => MICROS_PER_SECOND,
            Precision::Minute => MICROS_PER_MINUTE,
            Precision::Hour => MICROS_PER_HOUR,
            Precision::Day => MICROS_PER_DAY,
        }
    }

    /// Drop sub-second digits unless the precision needs them.
    pub fn truncate(self, t: NaiveDateTime) -> NaiveDateTime {
        match self {
            Precision::Microsecond => t,
            _ => t.with_nanosecond(0).unwrap_or(t),
        }
    }

    /// Extended ISO form: `2024-02-12`, `2024-02-12T10`, `2024-02-12T10:05:07`.
    pub fn iso(self, t: NaiveDateTime) -> String {
        t.format(match self {
            Precision::Day => "%Y-%m-%d",
            Precision::Hour => "%Y-%m-%dT%H",
            Precision::Minute => "%Y-%m-%dT%H:%M",
            Precision::Second => "%Y-%m-%dT%H:%M:%S",
            Precision::Microsecond => "%Y-%m-%dT%H:%M:%S%.6f",
        })
        .to_string()
    }

    /// SiLK slash form: `2024/02/12`, `2024/02/12T10`, `2024/02/12T10:05:07`.
    pub fn silk(self, t: NaiveDateTime) -> String {
        t.format(match self {
            Precision::Day => "%Y/%m/%d",
            Precision::Hour => "%Y/%m/%dT%H",
            Precision::Minute => "%Y/%m/%dT%H:%M",
            Precision::Second => "%Y/%m/%dT%H:%M:%S",
            Precision::Microsecond => "%Y/%m/%dT%H:%M:%S%.6f",
        })
        .to_string()
    }

    /// Compact basic ISO form: `20240212`, `20240212T10`, `20240212T100507`.
    pub fn basic(self, t: NaiveDateTime) -> String {
        t.format(match self {
            Precision::Day => "%Y%m%d",
            Precision::Hour => "%Y%m%dT%H",
            Precision::Minute => "%Y%m%dT%H%M",
            Precision::Second => "%Y%m%dT%H%M%S",
            Precision::Microsecond => "%Y%m%dT%H%M%S%.6f",
        })
        .to_string()
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Precision::Microsecond => "microsecond",
            Precision::Second => "second",
            Precision::Minute => "minute",
            Precision::Hour => "hour",
            Precision::Day => "day",
        };
        write!(f, "{s}")
    }
}

/// Parse an instant in any of the rendered forms, truncated or not:
/// `2024-02-12`, `2024-02-12T10`, `2024-02-12T10:05`, `2024-02-12 10:05:07`,
/// `2024/02/12T10:05:07.5`, `20240212T1005`.
pub fn parse_instant(input: &str) -> Result<NaiveDateTime> {
    let s = input.trim();
    let bad = || GolemError::Parameter(format!("invalid date: {input}"));

    let (date_part, time_part) = match s.find(['T', ' ', ':']) {
        Some(i) if s[..i].len() >= 8 => (&s[..i], &s[i + 1..]),
        _ => (s, ""),
    };
    let date = ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"]
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(date_part, f).ok())
        .ok_or_else(bad)?;
    if time_part.is_empty() {
        return date.and_hms_opt(0, 0, 0).ok_or_else(bad);
    }

    let (hms, frac) = match time_part.split_once('.') {
        Some((hms, frac)) => (hms, Some(frac)),
        None => (time_part, None),
    };
    let digits: String = hms.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() || digits.len() % 2 != 0 || digits.len() > 6 {
        return Err(bad());
    }
    let field = |i: usize| -> u32 {
        digits
            .get(i..i + 2)
            .and_then(|d| d.parse().ok())
            .unwrap_or(0)
    };
    let micro = match frac {
        Some(f) if !f.is_empty() && f.len() <= 6 && f.chars().all(|c| c.is_ascii_digit()) => {
            format!("{f:0<6}").parse::<u32>().map_err(|_| bad())?
        }
        Some(_) => return Err(bad()),
        None => 0,
    };
    date.and_hms_micro_opt(field(0), field(2), field(4), micro)
        .ok_or_else(bad)
}

/// Calendar decomposition of an instant, published as integer tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateParts {
    pub year: i64,
    pub month: i64,
    pub day: i64,
    pub hour: i64,
    pub minute: i64,
    pub second: i64,
    pub microsecond: i64,
}

impl DateParts {
    pub fn of(t: NaiveDateTime) -> Self {
        Self {
            year: i64::from(t.year()),
            month: i64::from(t.month()),
            day: i64::from(t.day()),
            hour: i64::from(t.hour()),
            minute: i64::from(t.minute()),
            second: i64::from(t.second()),
            microsecond: i64::from(t.nanosecond() / 1_000),
        }
    }

    /// `(suffix, value)` pairs in publication order.
    pub fn named(&self) -> [(&'static str, i64); 7] {
        [
            ("year", self.year),
            ("month", self.month),
            ("day", self.day),
            ("hour", self.hour),
            ("minute", self.minute),
            ("second", self.second),
            ("microsecond", self.microsecond),
        ]
    }
}
