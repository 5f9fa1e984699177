//! A job seen over a requested window and loop selection.

use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDateTime, TimeDelta};
use golem_core::{GolemError, Result};
use golem_scheduler::{BinDates, Slice};
use serde::{Deserialize, Serialize};

use crate::job::Job;
use crate::loops::LoopItem;

/// How one view is placed against another (see [`View::sync_to`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Widen the window to `count` bins ending at the anchor.
    pub count: u32,
    /// Shift the window back by this many intervals.
    pub offset: u32,
    /// Widen the window back to the other view's start date.
    pub cover: bool,
    /// Step back until the window ends no later than the other view.
    pub trail: bool,
}

#[derive(Debug, Clone)]
pub struct View {
    job: Arc<Job>,
    first_date: NaiveDateTime,
    last_date: NaiveDateTime,
    now: NaiveDateTime,
    /// One item list per job loop, in declared loop order.
    selection: Vec<Vec<LoopItem>>,
}

impl View {
    /// Every loop starts fully selected. An inverted range is a parameter error.
    pub fn new(
        job: Arc<Job>,
        first_date: NaiveDateTime,
        last_date: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Result<Self> {
        if first_date > last_date {
            return Err(GolemError::Parameter(format!(
                "first date {first_date} is after last date {last_date}"
            )));
        }
        let selection = job.loops.iter().map(|l| l.items()).collect();
        Ok(Self {
            job,
            first_date,
            last_date,
            now,
            selection,
        })
    }

    pub fn job(&self) -> &Arc<Job> {
        &self.job
    }

    pub fn first_date(&self) -> NaiveDateTime {
        self.first_date
    }

    pub fn last_date(&self) -> NaiveDateTime {
        self.last_date
    }

    pub fn now(&self) -> NaiveDateTime {
        self.now
    }

    pub fn selection(&self) -> &[Vec<LoopItem>] {
        &self.selection
    }

    /// Selected items of loop `name`.
    pub fn items(&self, name: &str) -> Option<&[LoopItem]> {
        self.job
            .loop_index(name)
            .map(|i| self.selection[i].as_slice())
    }

    /// Restrict a loop. `name` may be the loop name (values, with group
    /// labels expanding to members) or its group name (whole groups).
    pub fn select(&self, name: &str, values: &[String]) -> Result<Self> {
        let (index, l) = self
            .job
            .loops
            .iter()
            .enumerate()
            .find(|(_, l)| l.name == name || l.group_name.as_deref() == Some(name))
            .ok_or_else(|| GolemError::Parameter(format!("unknown loop '{name}'")))?;
        if values.is_empty() {
            return Err(GolemError::Parameter(format!("empty selection for loop '{name}'")));
        }
        let items = if l.name == name {
            l.select(values)?
        } else {
            l.select_groups(values)?
        };
        Ok(self.with_items(index, items))
    }

    /// Replace the selection of the loop at `index`.
    pub fn with_items(&self, index: usize, items: Vec<LoopItem>) -> Self {
        let mut view = self.clone();
        view.selection[index] = items;
        view
    }

    /// Same selection over another requested range.
    pub fn with_range(&self, first_date: NaiveDateTime, last_date: NaiveDateTime) -> Self {
        let mut view = self.clone();
        view.first_date = first_date.min(last_date);
        view.last_date = last_date;
        view
    }

    pub fn first_bin(&self) -> NaiveDateTime {
        self.job.cadence.date_bin(self.first_date)
    }

    /// The most recent usable bin at this view's `now`.
    pub fn horizon(&self) -> NaiveDateTime {
        self.job.cadence.horizon_bin(self.now)
    }

    /// Requested last bin, clamped to the horizon.
    pub fn last_bin(&self) -> NaiveDateTime {
        self.job.cadence.date_bin(self.last_date).min(self.horizon())
    }

    pub fn is_empty(&self) -> bool {
        self.last_bin() < self.first_bin() || self.loop_count() == 0
    }

    pub fn start_date(&self) -> NaiveDateTime {
        self.job.cadence.start_date(self.first_bin())
    }

    pub fn end_date(&self) -> NaiveDateTime {
        self.job.cadence.end_date(self.last_bin())
    }

    pub fn bin_count(&self) -> usize {
        self.job.cadence.bin_count(self.first_bin(), self.last_bin())
    }

    pub fn loop_count(&self) -> usize {
        self.selection.iter().map(Vec::len).product()
    }

    pub fn bin_dates(&self) -> BinDates {
        self.job.cadence.bin_dates(self.first_bin(), self.last_bin())
    }

    /// One view per bin, keeping the loop selection.
    pub fn bins(&self) -> impl Iterator<Item = View> + '_ {
        self.bin_dates().map(move |bin| self.with_range(bin, bin))
    }

    /// Every (bin × loop tuple) iteration: bins ascending, then loops in
    /// declared order with each loop's items in selection order.
    pub fn product(&self) -> Vec<View> {
        let tuples = cartesian(&self.selection);
        let mut out = Vec::with_capacity(self.bin_count() * tuples.len());
        for bin in self.bin_dates() {
            for tuple in &tuples {
                let mut view = self.with_range(bin, bin);
                view.selection = tuple.iter().map(|item| vec![item.clone()]).collect();
                out.push(view);
            }
        }
        out
    }

    /// Partition the selection of the `keys` loops into single-item views;
    /// other loops keep their whole selection.
    pub fn group_by(&self, keys: &[&str]) -> Result<Vec<View>> {
        let mut indices = Vec::with_capacity(keys.len());
        for key in keys {
            let index = self.job.loop_index(key).ok_or_else(|| {
                GolemError::Config(format!(
                    "'{key}' is not a loop of job '{}'",
                    self.job.name
                ))
            })?;
            indices.push(index);
        }
        let keyed: Vec<Vec<LoopItem>> = indices.iter().map(|&i| self.selection[i].clone()).collect();
        Ok(cartesian(&keyed)
            .into_iter()
            .map(|tuple| {
                let mut view = self.clone();
                for (&index, item) in indices.iter().zip(tuple) {
                    view.selection[index] = vec![item];
                }
                view
            })
            .collect())
    }

    pub fn by_key(&self, key: &str) -> Result<Vec<View>> {
        self.group_by(&[key])
    }

    /// Widen the window back to `start_date` so the bins cover the whole span.
    pub fn using_span(&self) -> Self {
        self.with_range(self.start_date(), self.last_date)
    }

    /// Move the first date back by `by`.
    pub fn extend_back(&self, by: TimeDelta) -> Self {
        self.with_range(self.first_date - by, self.last_date)
    }

    /// Place this job's window against `other`: anchor at `other.end_date`,
    /// then apply trail, cover, offset and count in that order.
    pub fn sync_to(&self, other: &View, opts: SyncOptions) -> Self {
        let interval = self.job.interval();
        let anchor = other.end_date();
        let mut view = self.with_range(anchor, anchor);
        view.now = other.now;

        if opts.trail {
            while view.end_date() > other.end_date() {
                view = view.with_range(view.first_date - interval, view.last_date - interval);
            }
        }
        if opts.cover {
            view.first_date = view.first_date.min(other.start_date());
        }
        if opts.offset > 0 {
            let shift = interval * opts.offset as i32;
            view.first_date -= shift;
            view.last_date -= shift;
        }
        if opts.count > 0 {
            let back = interval * (opts.count as i32 - 1);
            view.first_date = view.first_bin() - back;
        }
        view
    }

    /// Hour-aligned slices of `[start_date, end_date]`.
    pub fn by_hour(&self) -> Vec<Slice> {
        golem_scheduler::by_hour(self.start_date(), self.end_date())
    }

    /// Day-aligned slices of `[start_date, end_date]`.
    pub fn by_day(&self) -> Vec<Slice> {
        golem_scheduler::by_day(self.start_date(), self.end_date())
    }

    /// `"<first bin iso>[..<last bin iso>] (loop=label, ...)"`, used as error context.
    pub fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let precision = self.job.precision();
        let first = self.first_bin();
        let last = self.last_bin();
        write!(f, "{}", precision.iso(first))?;
        if last > first {
            write!(f, "..{}", precision.iso(last))?;
        }
        if !self.job.loops.is_empty() {
            let parts: Vec<String> = self
                .job
                .loops
                .iter()
                .zip(&self.selection)
                .map(|(l, items)| {
                    let labels: Vec<&str> = items.iter().map(|i| i.label.as_str()).collect();
                    format!("{}={}", l.name, labels.join(&l.separator))
                })
                .collect();
            write!(f, " ({})", parts.join(", "))?;
        }
        Ok(())
    }
}

/// Cartesian product preserving the order of each list, first list outermost.
fn cartesian(lists: &[Vec<LoopItem>]) -> Vec<Vec<LoopItem>> {
    let mut out: Vec<Vec<LoopItem>> = vec![Vec::new()];
    for list in lists {
        out = out
            .into_iter()
            .flat_map(|prefix| {
                list.iter().map(move |item| {
                    let mut tuple = prefix.clone();
                    tuple.push(item.clone());
                    tuple
                })
            })
            .collect();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::OutputSpec;
    use crate::loops::Loop;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    fn later() -> NaiveDateTime {
        at(2030, 1, 1, 0, 0)
    }

    fn daily() -> Arc<Job> {
        Job::builder("daily", TimeDelta::days(1))
            .epoch(at(2024, 1, 1, 0, 0))
            .output("result", "result/%(golem_bin_iso)s.out", OutputSpec::default())
            .build()
            .unwrap()
    }

    fn looped() -> Arc<Job> {
        Job::builder("looped", TimeDelta::days(1))
            .add_loop(Loop::new("sensor", ["LAB0", "LAB1", "OPS0"]).with_prefix_groups("sensor_group"))
            .add_loop(Loop::new("proto", ["tcp", "udp"]))
            .build()
            .unwrap()
    }

    #[test]
    fn last_week_window() {
        let view = View::new(daily(), at(2024, 2, 12, 10, 0), at(2024, 2, 18, 10, 0), later()).unwrap();
        assert_eq!(view.bin_count(), 7);
        let bins: Vec<_> = view.bin_dates().collect();
        assert_eq!(bins.first(), Some(&at(2024, 2, 12, 0, 0)));
        assert_eq!(bins.last(), Some(&at(2024, 2, 18, 0, 0)));
        assert_eq!(view.bins().count(), 7);
        assert_eq!(view.to_string(), "2024-02-12..2024-02-18");
    }

    #[test]
    fn inverted_range_is_a_parameter_error() {
        let err = View::new(daily(), at(2024, 2, 18, 0, 0), at(2024, 2, 12, 0, 0), later()).unwrap_err();
        assert_eq!(err.code(), GolemError::Parameter(String::new()).code());
    }

    #[test]
    fn last_bin_is_clamped_to_horizon() {
        let now = at(2024, 2, 15, 12, 0);
        let view = View::new(daily(), at(2024, 2, 12, 0, 0), at(2024, 2, 20, 0, 0), now).unwrap();
        assert_eq!(view.last_bin(), at(2024, 2, 14, 0, 0));
        assert!(view.last_bin() + view.job().interval() <= now);

        let future = View::new(daily(), at(2024, 3, 1, 0, 0), at(2024, 3, 2, 0, 0), now).unwrap();
        assert!(future.is_empty());
        assert_eq!(future.bin_count(), 0);
        assert!(future.product().is_empty());
    }

    #[test]
    fn every_date_bin_is_listed() {
        let view = View::new(daily(), at(2024, 2, 12, 0, 0), at(2024, 2, 18, 0, 0), later()).unwrap();
        let bins: Vec<_> = view.bin_dates().collect();
        let mut t = view.first_bin();
        while t <= view.last_bin() {
            assert!(bins.contains(&view.job().cadence.date_bin(t)));
            t += TimeDelta::hours(5);
        }
    }

    #[test]
    fn product_orders_bins_then_loops() {
        let view = View::new(looped(), at(2024, 2, 12, 0, 0), at(2024, 2, 13, 0, 0), later()).unwrap();
        let product = view.product();
        assert_eq!(product.len(), view.bin_count() * view.loop_count());
        assert_eq!(product.len(), 2 * 6);
        assert_eq!(product[0].to_string(), "2024-02-12 (sensor=LAB0, proto=tcp)");
        assert_eq!(product[1].to_string(), "2024-02-12 (sensor=LAB0, proto=udp)");
        assert_eq!(product[2].to_string(), "2024-02-12 (sensor=LAB1, proto=tcp)");
        assert_eq!(product[6].to_string(), "2024-02-13 (sensor=LAB0, proto=tcp)");
    }

    #[test]
    fn selection_by_group_name() {
        let view = View::new(looped(), at(2024, 2, 12, 0, 0), at(2024, 2, 12, 0, 0), later()).unwrap();
        let view = view.select("sensor_group", &["LAB".to_string()]).unwrap();
        let items = view.items("sensor").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].members, vec!["LAB0".to_string(), "LAB1".to_string()]);
        assert_eq!(view.loop_count(), 2);
        assert!(view.select("site", &["x".to_string()]).is_err());
        assert!(view.select("sensor", &[]).is_err());
    }

    #[test]
    fn group_by_partitions_keyed_loops() {
        let view = View::new(looped(), at(2024, 2, 12, 0, 0), at(2024, 2, 13, 0, 0), later()).unwrap();
        let groups = view.group_by(&["proto"]).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].items("proto").unwrap()[0].label, "tcp");
        assert_eq!(groups[0].items("sensor").unwrap().len(), 3);
        assert_eq!(groups[0].bin_count(), 2);
        assert!(view.by_key("site").is_err());
    }

    #[test]
    fn sync_with_cover_spans_the_week() {
        let weekly = Job::builder("weekly", TimeDelta::weeks(1)).build().unwrap();
        let b = View::new(weekly, at(2024, 2, 18, 0, 0), at(2024, 2, 18, 0, 0), later()).unwrap();
        assert_eq!(b.first_bin(), at(2024, 2, 12, 0, 0));

        let a = View::new(daily(), at(2024, 2, 18, 0, 0), at(2024, 2, 18, 0, 0), later()).unwrap();
        let synced = a.sync_to(&b, SyncOptions { cover: true, ..SyncOptions::default() });
        assert_eq!(synced.first_bin(), at(2024, 2, 12, 0, 0));
        assert_eq!(synced.last_bin(), at(2024, 2, 18, 0, 0));
        assert_eq!(synced.bin_count(), 7);
    }

    #[test]
    fn sync_with_offset_and_count() {
        let a = View::new(daily(), at(2024, 2, 18, 0, 0), at(2024, 2, 18, 0, 0), later()).unwrap();
        let prev = a.sync_to(&a, SyncOptions { offset: 1, ..SyncOptions::default() });
        assert_eq!(prev.first_bin(), at(2024, 2, 17, 0, 0));
        assert_eq!(prev.last_bin(), at(2024, 2, 17, 0, 0));

        let three = a.sync_to(&a, SyncOptions { count: 3, ..SyncOptions::default() });
        assert_eq!(three.first_bin(), at(2024, 2, 16, 0, 0));
        assert_eq!(three.bin_count(), 3);
    }

    #[test]
    fn sync_with_trail_ends_before_other() {
        let weekly = Job::builder("weekly", TimeDelta::weeks(1)).build().unwrap();
        let a = View::new(daily(), at(2024, 2, 14, 0, 0), at(2024, 2, 14, 0, 0), later()).unwrap();
        let w = View::new(weekly, at(2024, 2, 12, 0, 0), at(2024, 2, 12, 0, 0), later()).unwrap();
        // The week anchored at Wednesday's end ends on the 18th, after the day.
        let synced = w.sync_to(&a, SyncOptions { trail: true, ..SyncOptions::default() });
        assert!(synced.end_date() <= a.end_date());
        assert_eq!(synced.last_bin(), at(2024, 2, 5, 0, 0));
    }

    #[test]
    fn using_span_covers_window() {
        let job = Job::builder("slide", TimeDelta::days(1))
            .span(TimeDelta::days(3))
            .epoch(at(2024, 1, 1, 0, 0))
            .build()
            .unwrap();
        let view = View::new(job, at(2024, 2, 12, 0, 0), at(2024, 2, 12, 0, 0), later()).unwrap();
        assert_eq!(view.start_date(), at(2024, 2, 10, 0, 0));
        assert_eq!(view.using_span().bin_count(), 3);
        assert_eq!(view.by_day().len(), 5);
    }
}
