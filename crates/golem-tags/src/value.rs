//! Tag values and flow-query descriptors.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDateTime, TimeDelta};
use golem_core::{ArgList, AsArgs};
use golem_scheduler::{duration::micros, Slice};
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::Serialize;

const INSTANT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const FLOW_DATE_FORMAT: &str = "%Y/%m/%d:%H";

/// One value in an iteration's tag dictionary.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Scalar(String),
    Int(i64),
    Duration(TimeDelta),
    Instant(NaiveDateTime),
    Args(ArgList),
    Flow(FlowQuery),
    Map(BTreeMap<String, TagValue>),
}

impl TagValue {
    pub fn scalar(s: impl Into<String>) -> Self {
        TagValue::Scalar(s.into())
    }

    pub fn as_args_list(&self) -> Option<&ArgList> {
        match self {
            TagValue::Args(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_instant(&self) -> Option<NaiveDateTime> {
        match self {
            TagValue::Instant(t) => Some(*t),
            _ => None,
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Scalar(s) => f.write_str(s),
            TagValue::Int(n) => write!(f, "{n}"),
            // Whole seconds, with a fraction only when needed.
            TagValue::Duration(d) => {
                let us = micros(*d);
                if us % 1_000_000 == 0 {
                    write!(f, "{}", us / 1_000_000)
                } else {
                    write!(f, "{}", us as f64 / 1_000_000.0)
                }
            }
            TagValue::Instant(t) => write!(f, "{}", t.format(INSTANT_FORMAT)),
            TagValue::Args(a) => write!(f, "{a}"),
            TagValue::Flow(q) => write!(f, "{q}"),
            TagValue::Map(_) => f.write_str(&self.as_args().join(" ")),
        }
    }
}

impl AsArgs for TagValue {
    fn as_args(&self) -> Vec<String> {
        match self {
            TagValue::Args(a) => a.as_args(),
            TagValue::Flow(q) => q.as_args(),
            TagValue::Map(m) => {
                let mut all = ArgList::new();
                for v in m.values() {
                    all.extend(v.as_args());
                }
                all.into_vec()
            }
            other => vec![other.to_string()],
        }
    }
}

impl Serialize for TagValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TagValue::Scalar(s) => serializer.serialize_str(s),
            TagValue::Int(n) => serializer.serialize_i64(*n),
            TagValue::Duration(d) => serializer.serialize_i64(micros(*d) / 1_000_000),
            TagValue::Instant(t) => serializer.collect_str(&t.format(INSTANT_FORMAT)),
            TagValue::Args(a) => {
                let mut seq = serializer.serialize_seq(Some(a.len()))?;
                for item in a {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            TagValue::Flow(q) => q.serialize(serializer),
            TagValue::Map(m) => {
                let mut map = serializer.serialize_map(Some(m.len()))?;
                for (k, v) in m {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

/// Parameters of one flow-repository query: a time window, the sensors to
/// read, and extra `--field=value` selectors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowQuery {
    pub name: String,
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
    pub sensors: ArgList,
    pub fields: BTreeMap<String, String>,
}

impl FlowQuery {
    pub fn new(name: &str, start_date: NaiveDateTime, end_date: NaiveDateTime) -> Self {
        Self {
            name: name.to_string(),
            start_date,
            end_date,
            sensors: ArgList::new().with_separator(","),
            fields: BTreeMap::new(),
        }
    }

    fn with_window(&self, (start_date, end_date): Slice) -> Self {
        Self {
            start_date,
            end_date,
            ..self.clone()
        }
    }

    /// One query per calendar hour of the window.
    pub fn by_hour(&self) -> Vec<FlowQuery> {
        golem_scheduler::by_hour(self.start_date, self.end_date)
            .into_iter()
            .map(|s| self.with_window(s))
            .collect()
    }

    /// One query per calendar day of the window.
    pub fn by_day(&self) -> Vec<FlowQuery> {
        golem_scheduler::by_day(self.start_date, self.end_date)
            .into_iter()
            .map(|s| self.with_window(s))
            .collect()
    }

    /// One query per sensor.
    pub fn by_sensor(&self) -> Vec<FlowQuery> {
        self.sensors
            .iter()
            .map(|s| Self {
                sensors: ArgList::single(s.as_str()).with_separator(","),
                ..self.clone()
            })
            .collect()
    }
}

impl AsArgs for FlowQuery {
    fn as_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--start-date={}", self.start_date.format(FLOW_DATE_FORMAT)),
            format!("--end-date={}", self.end_date.format(FLOW_DATE_FORMAT)),
        ];
        if !self.sensors.is_empty() {
            args.push(format!("--sensors={}", self.sensors.as_slice().join(",")));
        }
        for (field, value) in &self.fields {
            args.push(format!("--{field}={value}"));
        }
        args
    }
}

impl fmt::Display for FlowQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_args().join(" "))
    }
}
