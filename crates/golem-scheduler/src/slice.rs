//! Slicing a `[start, end]` window into calendar hours or days.
//!
//! Pieces are aligned to the unit boundary (midnight, top of the hour); the
//! first and last piece may be partial. Bounds are inclusive at microsecond
//! resolution, matching view end dates.

use chrono::{NaiveDateTime, TimeDelta};

use crate::duration::{micros, MICROS_PER_DAY, MICROS_PER_HOUR};

/// One inclusive sub-range of a window.
pub type Slice = (NaiveDateTime, NaiveDateTime);

pub fn by_hour(start: NaiveDateTime, end: NaiveDateTime) -> Vec<Slice> {
    slice_by(start, end, MICROS_PER_HOUR)
}

pub fn by_day(start: NaiveDateTime, end: NaiveDateTime) -> Vec<Slice> {
    slice_by(start, end, MICROS_PER_DAY)
}

fn slice_by(start: NaiveDateTime, end: NaiveDateTime, unit: i64) -> Vec<Slice> {
    if end < start {
        return Vec::new();
    }
    let midnight = start.date().and_time(chrono::NaiveTime::MIN);
    let into_day = micros(start - midnight);
    let mut piece = midnight + TimeDelta::microseconds(into_day - into_day % unit);

    let step = TimeDelta::microseconds(unit);
    let one = TimeDelta::microseconds(1);
    let mut out = Vec::new();
    while piece <= end {
        let lo = piece.max(start);
        let hi = (piece + step - one).min(end);
        out.push((lo, hi));
        piece += step;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 2, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn hourly_pieces_with_partial_ends() {
        let pieces = by_hour(at(12, 10, 30), at(12, 12, 15));
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[0].0, at(12, 10, 30));
        assert_eq!(pieces[0].1, at(12, 11, 0) - TimeDelta::microseconds(1));
        assert_eq!(pieces[1].0, at(12, 11, 0));
        assert_eq!(pieces[2], (at(12, 12, 0), at(12, 12, 15)));
    }

    #[test]
    fn daily_pieces_cover_whole_days() {
        let end = at(15, 0, 0) - TimeDelta::microseconds(1);
        let pieces = by_day(at(12, 0, 0), end);
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[2].1, end);
        assert_eq!(pieces[1].0, at(13, 0, 0));
    }

    #[test]
    fn inverted_window_is_empty() {
        assert!(by_day(at(13, 0, 0), at(12, 0, 0)).is_empty());
    }
}
