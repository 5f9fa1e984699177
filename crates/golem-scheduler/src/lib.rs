//! `golem-scheduler`: time-bin arithmetic for periodic analysis jobs.
//!
//! # Overview
//!
//! A [`bins::Cadence`] aligns instants to `interval`-sized bins counted from
//! a fixed epoch. Each bin anchors one iteration whose data window runs from
//! `bin + interval - span` to `bin + max(interval, span)`.
//!
//! | Concept  | Meaning                                                     |
//! |----------|-------------------------------------------------------------|
//! | interval | Cadence between iterations                                  |
//! | span     | Width of data one iteration consumes                        |
//! | epoch    | Alignment anchor (default Monday 1970-01-05)                |
//! | lag      | How far behind wall-clock the horizon sits                  |
//! | realtime | Use the current bin before it ends; forces lag to zero      |

pub mod bins;
pub mod duration;
pub mod precision;
pub mod slice;

pub use bins::{default_epoch, BinDates, Cadence};
pub use duration::{iso_duration, parse_duration, seconds};
pub use precision::{parse_instant, DateParts, Precision};
pub use slice::{by_day, by_hour, Slice};
