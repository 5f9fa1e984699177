//! Interval-aligned bin arithmetic.

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use golem_core::{GolemError, Result};

use crate::duration::micros;
use crate::precision::Precision;

/// First Monday after the Unix epoch.
pub fn default_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1970, 1, 5)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// How often a job runs and how much data each run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cadence {
    pub interval: TimeDelta,
    pub span: TimeDelta,
    pub epoch: NaiveDateTime,
    pub lag: TimeDelta,
    pub realtime: bool,
}

impl Cadence {
    /// Cadence with the default epoch, no lag and `realtime` off.
    pub fn new(interval: TimeDelta, span: TimeDelta) -> Result<Self> {
        if interval <= TimeDelta::zero() {
            return Err(GolemError::Config(format!(
                "interval must be positive, got {interval}"
            )));
        }
        if span <= TimeDelta::zero() {
            return Err(GolemError::Config(format!(
                "span must be positive, got {span}"
            )));
        }
        Ok(Self {
            interval,
            span,
            epoch: default_epoch(),
            lag: TimeDelta::zero(),
            realtime: false,
        })
    }

    pub fn with_epoch(mut self, epoch: NaiveDateTime) -> Self {
        self.epoch = epoch;
        self
    }

    pub fn with_lag(mut self, lag: TimeDelta) -> Result<Self> {
        if lag < TimeDelta::zero() {
            return Err(GolemError::Config(format!("lag must not be negative, got {lag}")));
        }
        self.lag = if self.realtime { TimeDelta::zero() } else { lag };
        Ok(self)
    }

    /// Realtime cadences use the current bin before it ends and never lag.
    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        if realtime {
            self.lag = TimeDelta::zero();
        }
        self
    }

    pub fn precision(&self) -> Precision {
        Precision::of(self.interval, self.span, self.epoch)
    }

    /// `epoch + floor((t - epoch) / interval) * interval`.
    pub fn date_bin(&self, t: NaiveDateTime) -> NaiveDateTime {
        let t = self.precision().truncate(t);
        let step = micros(self.interval);
        let offset = micros(t - self.epoch);
        self.epoch + TimeDelta::microseconds(offset.div_euclid(step) * step)
    }

    pub fn next_bin(&self, t: NaiveDateTime) -> NaiveDateTime {
        self.date_bin(t) + self.interval
    }

    /// The most recent bin usable at `now`.
    ///
    /// Without `realtime` the bin must have fully elapsed: while
    /// `bin + interval >= now - lag` the candidate steps back one interval.
    pub fn horizon_bin(&self, now: NaiveDateTime) -> NaiveDateTime {
        let true_horizon = now - self.lag;
        let mut candidate = self.date_bin(true_horizon);
        if !self.realtime {
            while candidate + self.interval >= true_horizon {
                candidate -= self.interval;
            }
        }
        candidate
    }

    /// First instant of data consumed by the iteration anchored at `bin`.
    pub fn start_date(&self, bin: NaiveDateTime) -> NaiveDateTime {
        bin + self.interval - self.span
    }

    /// Last instant (inclusive, microsecond resolution) of that data.
    pub fn end_date(&self, bin: NaiveDateTime) -> NaiveDateTime {
        bin + self.interval.max(self.span) - TimeDelta::microseconds(1)
    }

    /// Every bin from `first` through `last` inclusive.
    pub fn bin_dates(&self, first: NaiveDateTime, last: NaiveDateTime) -> BinDates {
        BinDates {
            next: self.date_bin(first),
            last: self.date_bin(last),
            interval: self.interval,
        }
    }

    /// Number of bins in `[first, last]`; zero when inverted.
    pub fn bin_count(&self, first: NaiveDateTime, last: NaiveDateTime) -> usize {
        let (first, last) = (self.date_bin(first), self.date_bin(last));
        if last < first {
            return 0;
        }
        (micros(last - first) / micros(self.interval)) as usize + 1
    }
}

/// Ascending iterator over aligned bins.
#[derive(Debug, Clone)]
pub struct BinDates {
    next: NaiveDateTime,
    last: NaiveDateTime,
    interval: TimeDelta,
}

impl Iterator for BinDates {
    type Item = NaiveDateTime;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next > self.last {
            return None;
        }
        let current = self.next;
        self.next += self.interval;
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    fn daily() -> Cadence {
        Cadence::new(TimeDelta::days(1), TimeDelta::days(1))
            .unwrap()
            .with_epoch(at(2024, 1, 1, 0, 0))
    }

    fn hourly() -> Cadence {
        Cadence::new(TimeDelta::hours(1), TimeDelta::hours(1)).unwrap()
    }

    #[test]
    fn rejects_non_positive_interval_and_span() {
        assert!(Cadence::new(TimeDelta::zero(), TimeDelta::days(1)).is_err());
        assert!(Cadence::new(TimeDelta::days(1), TimeDelta::seconds(-1)).is_err());
    }

    #[test]
    fn date_bin_floors_to_interval() {
        let c = daily();
        assert_eq!(c.date_bin(at(2024, 2, 12, 10, 0)), at(2024, 2, 12, 0, 0));
        assert_eq!(c.next_bin(at(2024, 2, 12, 10, 0)), at(2024, 2, 13, 0, 0));
    }

    #[test]
    fn date_bin_before_epoch_floors_down() {
        let c = daily();
        assert_eq!(c.date_bin(at(2023, 12, 31, 23, 0)), at(2023, 12, 31, 0, 0));
    }

    #[test]
    fn date_bin_is_idempotent_and_next_bin_is_one_interval() {
        let c = Cadence::new(TimeDelta::minutes(15), TimeDelta::hours(1)).unwrap();
        let mut t = at(2024, 3, 1, 0, 0);
        while t < at(2024, 3, 1, 3, 0) {
            let b = c.date_bin(t);
            assert_eq!(c.date_bin(b), b);
            assert_eq!(c.next_bin(t) - b, c.interval);
            assert!(b <= t);
            t += TimeDelta::minutes(7);
        }
    }

    #[test]
    fn weekly_bins_start_on_monday() {
        let c = Cadence::new(TimeDelta::weeks(1), TimeDelta::weeks(1)).unwrap();
        // 2024-02-18 is a Sunday; its week started Monday 2024-02-12.
        assert_eq!(c.date_bin(at(2024, 2, 18, 12, 0)), at(2024, 2, 12, 0, 0));
    }

    #[test]
    fn bin_dates_are_inclusive() {
        let c = daily();
        let bins: Vec<_> = c
            .bin_dates(at(2024, 2, 12, 10, 0), at(2024, 2, 18, 10, 0))
            .collect();
        assert_eq!(bins.len(), 7);
        assert_eq!(bins[0], at(2024, 2, 12, 0, 0));
        assert_eq!(bins[6], at(2024, 2, 18, 0, 0));
        assert_eq!(c.bin_count(at(2024, 2, 12, 10, 0), at(2024, 2, 18, 10, 0)), 7);
        assert_eq!(c.bin_count(at(2024, 2, 18, 0, 0), at(2024, 2, 12, 0, 0)), 0);
    }

    #[test]
    fn horizon_requires_fully_elapsed_bin() {
        let c = hourly().with_lag(TimeDelta::minutes(15)).unwrap();
        let now = at(2024, 5, 1, 14, 10);
        let horizon = c.horizon_bin(now);
        // 13:00 + 1h = 14:00 is not before 13:55, so 13:00 is still settling.
        assert_eq!(horizon, at(2024, 5, 1, 12, 0));
        assert!(horizon + c.interval <= now - c.lag);
    }

    #[test]
    fn realtime_horizon_uses_current_bin_and_drops_lag() {
        let c = hourly()
            .with_lag(TimeDelta::minutes(15))
            .unwrap()
            .with_realtime(true);
        assert_eq!(c.lag, TimeDelta::zero());
        assert_eq!(c.horizon_bin(at(2024, 5, 1, 14, 10)), at(2024, 5, 1, 14, 0));
    }

    #[test]
    fn realtime_zeros_later_lag() {
        let c = hourly()
            .with_realtime(true)
            .with_lag(TimeDelta::minutes(15))
            .unwrap();
        assert_eq!(c.lag, TimeDelta::zero());
    }

    #[test]
    fn start_and_end_dates() {
        let c = Cadence::new(TimeDelta::days(1), TimeDelta::days(3)).unwrap();
        let bin = at(2024, 2, 12, 0, 0);
        assert_eq!(c.start_date(bin), at(2024, 2, 10, 0, 0));
        assert_eq!(
            c.end_date(bin),
            at(2024, 2, 15, 0, 0) - TimeDelta::microseconds(1)
        );

        let c = daily();
        assert_eq!(c.start_date(bin), bin);
        assert_eq!(
            c.end_date(bin),
            at(2024, 2, 13, 0, 0) - TimeDelta::microseconds(1)
        );
    }
}
