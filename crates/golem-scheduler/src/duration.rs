//! Duration parsing and ISO-8601 rendering.

use chrono::TimeDelta;
use golem_core::{GolemError, Result};

pub const MICROS_PER_SECOND: i64 = 1_000_000;
pub const MICROS_PER_MINUTE: i64 = 60 * MICROS_PER_SECOND;
pub const MICROS_PER_HOUR: i64 = 60 * MICROS_PER_MINUTE;
pub const MICROS_PER_DAY: i64 = 24 * MICROS_PER_HOUR;

/// Whole microseconds in `d`, saturating on overflow.
pub fn micros(d: TimeDelta) -> i64 {
    d.num_microseconds().unwrap_or(i64::MAX)
}

/// `secs` whole seconds; out-of-range values are configuration errors.
pub fn seconds(secs: i64) -> Result<TimeDelta> {
    TimeDelta::try_seconds(secs)
        .ok_or_else(|| GolemError::Config(format!("duration out of range: {secs}s")))
}

/// Parse a duration written as integer seconds (`"3600"`) or as one or more
/// `<n><unit>` terms (`"1d"`, `"1h30m"`). Units: `w d h m s ms us`.
pub fn parse_duration(input: &str) -> Result<TimeDelta> {
    let s = input.trim();
    if s.is_empty() {
        return Err(GolemError::Config("empty duration".to_string()));
    }
    if let Ok(secs) = s.parse::<i64>() {
        return seconds(secs);
    }

    let mut total: i64 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 {
            return Err(GolemError::Config(format!("invalid duration: {input}")));
        }
        let (number, tail) = rest.split_at(digits);
        let unit_len = tail
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .count();
        let (unit, tail) = tail.split_at(unit_len);
        let n: i64 = number
            .parse()
            .map_err(|_| GolemError::Config(format!("invalid duration: {input}")))?;
        let scale = match unit {
            "w" => 7 * MICROS_PER_DAY,
            "d" => MICROS_PER_DAY,
            "h" => MICROS_PER_HOUR,
            "m" => MICROS_PER_MINUTE,
            "s" => MICROS_PER_SECOND,
            "ms" => 1_000,
            "us" => 1,
            other => {
                return Err(GolemError::Config(format!(
                    "unknown duration unit '{other}' in {input}"
                )))
            }
        };
        total = n
            .checked_mul(scale)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(|| GolemError::Config(format!("duration overflow: {input}")))?;
        rest = tail;
    }
    Ok(TimeDelta::microseconds(total))
}

/// Render `d` as an ISO-8601 duration (`P1D`, `PT1H`, `P1DT6H`, `PT0.5S`).
pub fn iso_duration(d: TimeDelta) -> String {
    let mut us = micros(d);
    if us == 0 {
        return "PT0S".to_string();
    }
    let sign = if us < 0 { "-" } else { "" };
    us = us.abs();

    let days = us / MICROS_PER_DAY;
    us %= MICROS_PER_DAY;
    let hours = us / MICROS_PER_HOUR;
    us %= MICROS_PER_HOUR;
    let minutes = us / MICROS_PER_MINUTE;
    us %= MICROS_PER_MINUTE;
    let seconds = us / MICROS_PER_SECOND;
    let frac = us % MICROS_PER_SECOND;

    let mut out = format!("{sign}P");
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }
    if hours > 0 || minutes > 0 || seconds > 0 || frac > 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if frac > 0 {
            let text = format!("{seconds}.{frac:06}");
            out.push_str(text.trim_end_matches('0'));
            out.push('S');
        } else if seconds > 0 {
            out.push_str(&format!("{seconds}S"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_seconds() {
        assert_eq!(parse_duration("3600").unwrap(), TimeDelta::hours(1));
    }

    #[test]
    fn parses_compound_units() {
        assert_eq!(parse_duration("1d").unwrap(), TimeDelta::days(1));
        assert_eq!(parse_duration("1w").unwrap(), TimeDelta::weeks(1));
        assert_eq!(
            parse_duration("1h30m").unwrap(),
            TimeDelta::minutes(90)
        );
        assert_eq!(parse_duration("250ms").unwrap(), TimeDelta::milliseconds(250));
    }

    #[test]
    fn huge_second_counts_are_config_errors() {
        let err = parse_duration("9223372036854775807").unwrap_err();
        assert!(matches!(err, GolemError::Config(_)));
        assert!(seconds(i64::MIN).is_err());
        assert!(parse_duration("99999999999999w").is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("1y").is_err());
        assert!(parse_duration("h").is_err());
    }

    #[test]
    fn iso_rendering() {
        assert_eq!(iso_duration(TimeDelta::days(1)), "P1D");
        assert_eq!(iso_duration(TimeDelta::weeks(1)), "P7D");
        assert_eq!(iso_duration(TimeDelta::hours(1)), "PT1H");
        assert_eq!(iso_duration(TimeDelta::minutes(15)), "PT15M");
        assert_eq!(iso_duration(TimeDelta::hours(30)), "P1DT6H");
        assert_eq!(iso_duration(TimeDelta::milliseconds(500)), "PT0.5S");
        assert_eq!(iso_duration(TimeDelta::zero()), "PT0S");
    }
}
