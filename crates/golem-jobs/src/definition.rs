//! TOML job definitions.
//!
//! A definition file `<job>.toml` describes one job; upstream jobs are named
//! in `[[golem_inputs]]` and resolved through a caller-supplied lookup (see
//! [`crate::registry::JobRegistry`]).
//!
//! ```toml
//! suite = "netflow"
//! interval = "1d"
//! span = "7d"
//! lag = "2h"
//!
//! [[loops]]
//! name = "sensor"
//! values = ["LAB0", "LAB1", "OPS0"]
//! group_name = "sensor_group"
//! group_by_prefix = true
//!
//! [tags]
//! stem = "weekly/%(sensor)s"
//!
//! [[outputs]]
//! name = "summary"
//! template = "%(stem)s/%(golem_bin_iso)s.txt"
//!
//! [[golem_inputs]]
//! job = "daily"
//! cover = true
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::TimeDelta;
use golem_core::{GolemError, Result};
use golem_scheduler::{parse_duration, parse_instant, seconds};
use serde::Deserialize;

use crate::job::{
    GolemInputSpec, InputSpec, Job, JobBuilder, OutputSpec, QueryTemplate,
};
use crate::loops::Loop;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A duration written as whole seconds or as `1d12h`-style text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DurationValue {
    Seconds(i64),
    Text(String),
}

impl DurationValue {
    pub fn to_delta(&self) -> Result<TimeDelta> {
        match self {
            DurationValue::Seconds(s) => seconds(*s),
            DurationValue::Text(t) => parse_duration(t),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobDefinition {
    /// Defaults to the file stem.
    pub name: Option<String>,
    pub suite: Option<String>,
    pub interval: DurationValue,
    pub span: Option<DurationValue>,
    pub epoch: Option<String>,
    pub lag: Option<DurationValue>,
    #[serde(default)]
    pub realtime: bool,
    #[serde(default)]
    pub loops: Vec<LoopDefinition>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub arg_tags: BTreeMap<String, String>,
    #[serde(default)]
    pub inputs: Vec<InputDefinition>,
    #[serde(default)]
    pub outputs: Vec<OutputDefinition>,
    #[serde(default)]
    pub queries: Vec<QueryDefinition>,
    #[serde(default)]
    pub golem_inputs: Vec<GolemInputDefinition>,
    #[serde(default)]
    pub self_inputs: Vec<SelfInputDefinition>,
    #[serde(default)]
    pub input_groups: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub output_groups: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub flow_maps: Vec<FlowMapDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoopDefinition {
    pub name: String,
    pub values: Vec<String>,
    pub group_name: Option<String>,
    #[serde(default)]
    pub groups: Vec<GroupDefinition>,
    /// Derive groups from each value's leading alphabetic prefix.
    #[serde(default)]
    pub group_by_prefix: bool,
    pub separator: Option<String>,
    pub sensor: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupDefinition {
    pub label: String,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputDefinition {
    pub name: String,
    pub template: String,
    pub required: Option<usize>,
    pub mime_type: Option<String>,
    pub description: Option<String>,
    pub source_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputDefinition {
    pub name: String,
    pub template: String,
    pub scope: Option<u32>,
    pub mime_type: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryDefinition {
    pub name: String,
    pub mime_type: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GolemInputDefinition {
    /// Upstream job name.
    pub job: String,
    /// Upstream output → local input name. Omitted takes every output.
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
    /// Upstream loop → local loop. Omitted joins shared loop names.
    pub join: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub cover: bool,
    #[serde(default)]
    pub trail: bool,
    pub span: Option<DurationValue>,
    pub required: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelfInputDefinition {
    pub output: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowMapDefinition {
    pub name: String,
    pub fields: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

impl JobDefinition {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| GolemError::Config(format!("invalid job definition: {e}")))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            GolemError::Config(format!("cannot read job definition {}: {e}", path.display()))
        })?;
        Self::from_toml(&text).map_err(|e| e.in_context(path.display().to_string()))
    }

    /// Names of the upstream jobs this definition depends on.
    pub fn upstream_names(&self) -> impl Iterator<Item = &str> {
        self.golem_inputs.iter().map(|g| g.job.as_str())
    }

    /// Turn the definition into a builder. `upstream` supplies the built
    /// job for each `[[golem_inputs]]` entry.
    pub fn into_builder<F>(self, default_name: &str, mut upstream: F) -> Result<JobBuilder>
    where
        F: FnMut(&str) -> Result<Arc<Job>>,
    {
        let name = self.name.as_deref().unwrap_or(default_name);
        let mut builder = Job::builder(name, self.interval.to_delta()?).realtime(self.realtime);
        if let Some(suite) = &self.suite {
            builder = builder.suite(suite);
        }
        if let Some(span) = &self.span {
            builder = builder.span(span.to_delta()?);
        }
        if let Some(epoch) = &self.epoch {
            let epoch = parse_instant(epoch)
                .map_err(|_| GolemError::Config(format!("invalid epoch '{epoch}'")))?;
            builder = builder.epoch(epoch);
        }
        if let Some(lag) = &self.lag {
            builder = builder.lag(lag.to_delta()?);
        }

        for def in self.loops {
            builder = builder.add_loop(def.into_loop()?);
        }
        for (name, template) in &self.tags {
            builder = builder.tag(name, template);
        }
        for (name, template) in &self.arg_tags {
            builder = builder.arg_tag(name, template);
        }
        for def in self.inputs {
            let spec = InputSpec {
                required: def.required.unwrap_or(1),
                mime_type: def.mime_type,
                description: def.description,
                source_name: def.source_name,
            };
            builder = builder.input(&def.name, &def.template, spec);
        }
        for def in self.outputs {
            let spec = OutputSpec {
                scope: def.scope.unwrap_or(1),
                mime_type: def.mime_type,
                description: def.description,
            };
            builder = builder.output(&def.name, &def.template, spec);
        }
        for def in self.queries {
            builder = builder.query(QueryTemplate {
                name: def.name,
                mime_type: def.mime_type,
                description: def.description,
            });
        }
        for def in self.golem_inputs {
            let job = upstream(&def.job)?;
            let spec = GolemInputSpec {
                outputs: def.outputs.into_iter().collect(),
                join: def.join,
                count: def.count,
                offset: def.offset,
                cover: def.cover,
                trail: def.trail,
                span: def.span.map(|s| s.to_delta()).transpose()?,
                required: def.required.unwrap_or(1),
            };
            builder = builder.golem_input(job, spec);
        }
        for def in &self.self_inputs {
            builder = builder.self_input(&def.output, &def.name);
        }
        for (name, members) in &self.input_groups {
            let members: Vec<&str> = members.iter().map(String::as_str).collect();
            builder = builder.input_group(name, &members);
        }
        for (name, members) in &self.output_groups {
            let members: Vec<&str> = members.iter().map(String::as_str).collect();
            builder = builder.output_group(name, &members);
        }
        for def in &self.flow_maps {
            let fields: Vec<(&str, &str)> = def
                .fields
                .iter()
                .map(|(f, t)| (f.as_str(), t.as_str()))
                .collect();
            builder = builder.flow_map(&def.name, &fields);
        }
        Ok(builder)
    }
}

impl LoopDefinition {
    fn into_loop(self) -> Result<Loop> {
        let mut l = Loop::new(&self.name, self.values);
        if let Some(separator) = &self.separator {
            l = l.with_separator(separator);
        }
        if let Some(sensor) = self.sensor {
            l = l.with_sensor(sensor);
        }
        match (self.group_name, self.group_by_prefix, self.groups.is_empty()) {
            (Some(group_name), true, true) => Ok(l.with_prefix_groups(&group_name)),
            (Some(group_name), false, false) => Ok(l.with_groups(
                &group_name,
                self.groups.into_iter().map(|g| (g.label, g.members)).collect(),
            )),
            (Some(_), true, false) => Err(GolemError::Config(format!(
                "loop '{}' sets both groups and group_by_prefix",
                self.name
            ))),
            (None, false, true) | (Some(_), false, true) => Ok(l),
            (None, _, _) => Err(GolemError::Config(format!(
                "loop '{}' declares groups without group_name",
                self.name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAILY: &str = r#"
        interval = "1d"
        epoch = "2024-01-01"

        [[loops]]
        name = "sensor"
        values = ["LAB0", "LAB1", "OPS0"]
        group_name = "sensor_group"
        group_by_prefix = true

        [tags]
        stem = "daily/%(sensor)s"

        [[outputs]]
        name = "flows"
        template = "%(stem)s/%(golem_bin_iso)s.rw"
        description = "daily flow file"
    "#;

    fn no_upstream(name: &str) -> Result<Arc<Job>> {
        Err(GolemError::Config(format!("unknown job '{name}'")))
    }

    #[test]
    fn durations_accept_seconds_or_text() {
        assert_eq!(DurationValue::Seconds(3600).to_delta().unwrap(), TimeDelta::hours(1));
        assert_eq!(
            DurationValue::Text("1d12h".into()).to_delta().unwrap(),
            TimeDelta::hours(36)
        );
    }

    #[test]
    fn out_of_range_interval_is_a_config_error() {
        assert!(DurationValue::Seconds(i64::MAX).to_delta().is_err());
        let def = JobDefinition::from_toml("interval = 9223372036854775807").unwrap();
        let err = def.into_builder("huge", no_upstream).err().unwrap();
        assert!(matches!(err, GolemError::Config(_)));
    }

    #[test]
    fn builds_job_from_toml() {
        let def = JobDefinition::from_toml(DAILY).unwrap();
        let job = def.into_builder("daily", no_upstream).unwrap().build().unwrap();
        assert_eq!(job.name, "daily");
        assert_eq!(job.interval(), TimeDelta::days(1));
        assert_eq!(job.loops[0].group("LAB").map(|g| g.len()), Some(2));
        assert_eq!(job.outputs[0].spec.description.as_deref(), Some("daily flow file"));
        assert_eq!(job.outputs[0].spec.scope, 1);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = JobDefinition::from_toml("interval = 60\nintervall = 5").unwrap_err();
        assert!(err.to_string().contains("invalid job definition"));
    }

    #[test]
    fn upstream_is_resolved_through_lookup() {
        let daily = JobDefinition::from_toml(DAILY)
            .unwrap()
            .into_builder("daily", no_upstream)
            .unwrap()
            .build()
            .unwrap();
        let weekly = JobDefinition::from_toml(
            r#"
            interval = "1w"

            [[loops]]
            name = "sensor"
            values = ["LAB0", "LAB1", "OPS0"]

            [[golem_inputs]]
            job = "daily"
            cover = true
            outputs = { flows = "daily_flows" }
            "#,
        )
        .unwrap();
        assert_eq!(weekly.upstream_names().collect::<Vec<_>>(), vec!["daily"]);
        let job = weekly
            .into_builder("weekly", |name| {
                assert_eq!(name, "daily");
                Ok(daily.clone())
            })
            .unwrap()
            .build()
            .unwrap();
        let input = &job.golem_inputs[0];
        assert!(input.sync.cover);
        assert_eq!(input.outputs, vec![("flows".to_string(), "daily_flows".to_string())]);
    }

    #[test]
    fn missing_upstream_fails() {
        let def = JobDefinition::from_toml(
            "interval = \"1h\"\n[[golem_inputs]]\njob = \"nowhere\"\n",
        )
        .unwrap();
        assert!(def.into_builder("x", no_upstream).is_err());
    }
}
