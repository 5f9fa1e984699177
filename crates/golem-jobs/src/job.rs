//! The immutable job model and its builder.
//!
//! A [`Job`] is only ever produced by [`JobBuilder::build`], which checks
//! every static invariant (positive cadence, unique tag names, resolvable
//! template references, acyclic user tags, valid joins, bound loops) and
//! fails with [`GolemError::Config`] otherwise.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDateTime, TimeDelta};
use golem_core::{GolemError, Result};
use golem_scheduler::{duration::micros, Cadence, Precision};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::builtin;
use crate::loops::Loop;
use crate::template::Template;
use crate::view::SyncOptions;

/// Stable job identity used to key audit and process caches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobKey(pub String);

impl JobKey {
    fn compute(name: &str, cadence: &Cadence, outputs: &[OutputTemplate]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        hasher.update(micros(cadence.interval).to_le_bytes());
        hasher.update(micros(cadence.span).to_le_bytes());
        for output in outputs {
            hasher.update(output.name.as_bytes());
            hasher.update([0u8]);
            hasher.update(output.template.source().as_bytes());
            hasher.update([0u8]);
        }
        let digest = hex::encode(hasher.finalize());
        Self(format!("{name}-{}", &digest[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    /// Number of intervals that together make one complete result.
    pub scope: u32,
    pub mime_type: Option<String>,
    pub description: Option<String>,
}

impl Default for OutputSpec {
    fn default() -> Self {
        Self {
            scope: 1,
            mime_type: None,
            description: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTemplate {
    pub name: String,
    pub template: Template,
    pub spec: OutputSpec,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSpec {
    /// Minimum number of resolved files that must exist; 0 never fails.
    pub required: usize,
    pub mime_type: Option<String>,
    pub description: Option<String>,
    pub source_name: Option<String>,
}

impl Default for InputSpec {
    fn default() -> Self {
        Self {
            required: 1,
            mime_type: None,
            description: None,
            source_name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputTemplate {
    pub name: String,
    pub template: Template,
    pub spec: InputSpec,
}

/// An on-demand output with no repository path of its own.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryTemplate {
    pub name: String,
    pub mime_type: Option<String>,
    pub description: Option<String>,
}

/// Fields of an external flow-query descriptor, each a template over tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowMap {
    pub name: String,
    pub fields: Vec<(String, Template)>,
}

/// How a local job consumes another job's outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GolemInputSpec {
    /// Upstream output name → local input name. Empty takes every output
    /// under its own name.
    pub outputs: Vec<(String, String)>,
    /// Upstream loop → local loop. `None` joins every shared loop name;
    /// `Some(empty)` joins nothing.
    pub join: Option<BTreeMap<String, String>>,
    pub count: u32,
    pub offset: u32,
    pub cover: bool,
    pub trail: bool,
    /// Converted to `count = ceil(span / upstream.interval)`.
    pub span: Option<TimeDelta>,
    pub required: usize,
}

impl Default for GolemInputSpec {
    fn default() -> Self {
        Self {
            outputs: Vec::new(),
            join: None,
            count: 0,
            offset: 0,
            cover: false,
            trail: false,
            span: None,
            required: 1,
        }
    }
}

/// A resolved upstream dependency.
#[derive(Debug, Clone)]
pub struct GolemInput {
    pub job: Arc<Job>,
    /// Upstream output name → local input name.
    pub outputs: Vec<(String, String)>,
    /// Upstream loop → local loop.
    pub join: BTreeMap<String, String>,
    pub sync: SyncOptions,
    pub required: usize,
}

/// Immutable job record. Build through [`JobBuilder`]; share as `Arc<Job>`.
#[derive(Debug, Clone)]
pub struct Job {
    pub name: String,
    pub suite: Option<String>,
    pub cadence: Cadence,
    pub loops: Vec<Loop>,
    pub tags: BTreeMap<String, Template>,
    pub arg_tags: BTreeMap<String, Template>,
    pub flow_maps: Vec<FlowMap>,
    pub inputs: Vec<InputTemplate>,
    pub outputs: Vec<OutputTemplate>,
    pub queries: Vec<QueryTemplate>,
    pub golem_inputs: Vec<GolemInput>,
    pub input_groups: Vec<(String, Vec<String>)>,
    pub output_groups: Vec<(String, Vec<String>)>,
    pub key: JobKey,
}

impl Job {
    pub fn builder(name: &str, interval: TimeDelta) -> JobBuilder {
        JobBuilder::new(name, interval)
    }

    pub fn interval(&self) -> TimeDelta {
        self.cadence.interval
    }

    pub fn span(&self) -> TimeDelta {
        self.cadence.span
    }

    pub fn precision(&self) -> Precision {
        self.cadence.precision()
    }

    pub fn loop_named(&self, name: &str) -> Option<&Loop> {
        self.loops.iter().find(|l| l.name == name)
    }

    pub fn loop_index(&self, name: &str) -> Option<usize> {
        self.loops.iter().position(|l| l.name == name)
    }

    /// The loop publishing tag `name`, either as its values or its group labels.
    pub fn loop_for_tag(&self, name: &str) -> Option<&Loop> {
        self.loops
            .iter()
            .find(|l| l.name == name || l.group_name.as_deref() == Some(name))
    }

    pub fn output(&self, name: &str) -> Option<&OutputTemplate> {
        self.outputs.iter().find(|o| o.name == name)
    }

    /// Names of the loops a template depends on, following user and
    /// argument tags.
    pub fn loops_in(&self, template: &Template) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let mut visited = BTreeSet::new();
        self.collect_loops(template, &mut found, &mut visited);
        found
    }

    fn collect_loops(
        &self,
        template: &Template,
        found: &mut BTreeSet<String>,
        visited: &mut BTreeSet<String>,
    ) {
        for name in template.references() {
            if let Some(l) = self.loop_for_tag(name) {
                found.insert(l.name.clone());
            } else if let Some(inner) = self.tags.get(name).or_else(|| self.arg_tags.get(name)) {
                if visited.insert(name.to_string()) {
                    self.collect_loops(inner, found, visited);
                }
            }
        }
    }

    /// Copy of this job reduced to one output and no dependencies, used as
    /// the upstream of a self-input.
    fn filtered_to(&self, output: &str) -> Job {
        let outputs: Vec<OutputTemplate> = self
            .outputs
            .iter()
            .filter(|o| o.name == output)
            .cloned()
            .collect();
        Job {
            name: self.name.clone(),
            suite: self.suite.clone(),
            cadence: self.cadence.clone(),
            loops: self.loops.clone(),
            tags: self.tags.clone(),
            arg_tags: self.arg_tags.clone(),
            flow_maps: Vec::new(),
            inputs: Vec::new(),
            key: JobKey::compute(&self.name, &self.cadence, &outputs),
            outputs,
            queries: Vec::new(),
            golem_inputs: Vec::new(),
            input_groups: Vec::new(),
            output_groups: Vec::new(),
        }
    }
}

/// Collects a job definition and validates it in [`JobBuilder::build`].
#[derive(Debug, Clone)]
pub struct JobBuilder {
    name: String,
    suite: Option<String>,
    interval: TimeDelta,
    span: Option<TimeDelta>,
    epoch: Option<NaiveDateTime>,
    lag: TimeDelta,
    realtime: bool,
    loops: Vec<Loop>,
    tags: Vec<(String, String)>,
    arg_tags: Vec<(String, String)>,
    flow_maps: Vec<(String, Vec<(String, String)>)>,
    inputs: Vec<(String, String, InputSpec)>,
    outputs: Vec<(String, String, OutputSpec)>,
    queries: Vec<QueryTemplate>,
    golem_inputs: Vec<(Arc<Job>, GolemInputSpec)>,
    self_inputs: Vec<(String, String)>,
    input_groups: Vec<(String, Vec<String>)>,
    output_groups: Vec<(String, Vec<String>)>,
}

impl JobBuilder {
    pub fn new(name: &str, interval: TimeDelta) -> Self {
        Self {
            name: name.to_string(),
            suite: None,
            interval,
            span: None,
            epoch: None,
            lag: TimeDelta::zero(),
            realtime: false,
            loops: Vec::new(),
            tags: Vec::new(),
            arg_tags: Vec::new(),
            flow_maps: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            queries: Vec::new(),
            golem_inputs: Vec::new(),
            self_inputs: Vec::new(),
            input_groups: Vec::new(),
            output_groups: Vec::new(),
        }
    }

    pub fn suite(mut self, suite: &str) -> Self {
        self.suite = Some(suite.to_string());
        self
    }

    /// Defaults to the interval.
    pub fn span(mut self, span: TimeDelta) -> Self {
        self.span = Some(span);
        self
    }

    pub fn epoch(mut self, epoch: NaiveDateTime) -> Self {
        self.epoch = Some(epoch);
        self
    }

    pub fn lag(mut self, lag: TimeDelta) -> Self {
        self.lag = lag;
        self
    }

    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    pub fn add_loop(mut self, l: Loop) -> Self {
        self.loops.push(l);
        self
    }

    pub fn tag(mut self, name: &str, template: &str) -> Self {
        self.tags.push((name.to_string(), template.to_string()));
        self
    }

    pub fn arg_tag(mut self, name: &str, template: &str) -> Self {
        self.arg_tags.push((name.to_string(), template.to_string()));
        self
    }

    pub fn flow_map(mut self, name: &str, fields: &[(&str, &str)]) -> Self {
        self.flow_maps.push((
            name.to_string(),
            fields
                .iter()
                .map(|(f, t)| (f.to_string(), t.to_string()))
                .collect(),
        ));
        self
    }

    pub fn input(mut self, name: &str, template: &str, spec: InputSpec) -> Self {
        self.inputs.push((name.to_string(), template.to_string(), spec));
        self
    }

    pub fn output(mut self, name: &str, template: &str, spec: OutputSpec) -> Self {
        self.outputs.push((name.to_string(), template.to_string(), spec));
        self
    }

    pub fn query(mut self, query: QueryTemplate) -> Self {
        self.queries.push(query);
        self
    }

    pub fn golem_input(mut self, upstream: Arc<Job>, spec: GolemInputSpec) -> Self {
        self.golem_inputs.push((upstream, spec));
        self
    }

    /// Consume this job's own `output` from the previous bin as `local`.
    pub fn self_input(mut self, output: &str, local: &str) -> Self {
        self.self_inputs.push((output.to_string(), local.to_string()));
        self
    }

    pub fn input_group(mut self, name: &str, members: &[&str]) -> Self {
        self.input_groups
            .push((name.to_string(), members.iter().map(|m| m.to_string()).collect()));
        self
    }

    pub fn output_group(mut self, name: &str, members: &[&str]) -> Self {
        self.output_groups
            .push((name.to_string(), members.iter().map(|m| m.to_string()).collect()));
        self
    }

    pub fn build(self) -> Result<Arc<Job>> {
        let mut cadence = Cadence::new(self.interval, self.span.unwrap_or(self.interval))?
            .with_realtime(self.realtime)
            .with_lag(self.lag)?;
        if let Some(epoch) = self.epoch {
            cadence = cadence.with_epoch(epoch);
        }

        let mut names = NameRegistry::new();
        for l in &self.loops {
            l.validate()?;
            names.register(&l.name, "loop")?;
            if let (Some(group_name), Some(_)) = (&l.group_name, &l.groups) {
                names.register(group_name, "loop group")?;
            }
        }

        let tags = parse_named(&self.tags, "tag", &mut names)?;
        let arg_tags = parse_named(&self.arg_tags, "argument tag", &mut names)?;

        let mut inputs = Vec::new();
        for (name, template, spec) in self.inputs {
            names.register(&name, "input")?;
            inputs.push(InputTemplate {
                template: Template::parse(&template)?,
                name,
                spec,
            });
        }

        let mut outputs = Vec::new();
        for (name, template, spec) in self.outputs {
            names.register(&name, "output")?;
            if spec.scope == 0 {
                return Err(GolemError::Config(format!("output '{name}' has scope 0")));
            }
            outputs.push(OutputTemplate {
                template: Template::parse(&template)?,
                name,
                spec,
            });
        }

        for q in &self.queries {
            names.register(&q.name, "query")?;
        }

        let mut flow_maps = Vec::new();
        for (name, fields) in &self.flow_maps {
            names.register(name, "flow map")?;
            let mut parsed = Vec::new();
            for (field, template) in fields {
                parsed.push((field.clone(), Template::parse(template)?));
            }
            flow_maps.push(FlowMap {
                name: name.clone(),
                fields: parsed,
            });
        }

        let mut job = Job {
            key: JobKey::compute(&self.name, &cadence, &outputs),
            name: self.name,
            suite: self.suite,
            cadence,
            loops: self.loops,
            tags,
            arg_tags,
            flow_maps,
            inputs,
            outputs,
            queries: self.queries,
            golem_inputs: Vec::new(),
            input_groups: Vec::new(),
            output_groups: Vec::new(),
        };

        job.check_user_tags()?;
        job.check_references()?;

        let mut golem_inputs = Vec::new();
        for (upstream, spec) in self.golem_inputs {
            golem_inputs.push(job.resolve_golem_input(upstream, spec, &mut names)?);
        }
        for (output, local) in &self.self_inputs {
            if job.output(output).is_none() {
                return Err(GolemError::Config(format!(
                    "self input '{local}' names unknown output '{output}'"
                )));
            }
            let upstream = Arc::new(job.filtered_to(output));
            let spec = GolemInputSpec {
                outputs: vec![(output.clone(), local.clone())],
                offset: 1,
                required: 0,
                ..GolemInputSpec::default()
            };
            golem_inputs.push(job.resolve_golem_input(upstream, spec, &mut names)?);
        }

        let input_names: BTreeSet<String> = job
            .inputs
            .iter()
            .map(|i| i.name.clone())
            .chain(
                golem_inputs
                    .iter()
                    .flat_map(|g| g.outputs.iter().map(|(_, local)| local.clone())),
            )
            .collect();
        let output_names: BTreeSet<String> = job.outputs.iter().map(|o| o.name.clone()).collect();
        job.input_groups = check_groups(self.input_groups, &input_names, "input", &mut names)?;
        job.output_groups = check_groups(self.output_groups, &output_names, "output", &mut names)?;
        job.golem_inputs = golem_inputs;

        job.check_flow_maps(&names)?;

        debug!(job = %job.name, key = %job.key, loops = job.loops.len(), outputs = job.outputs.len(), "job built");
        Ok(Arc::new(job))
    }
}

impl Job {
    /// User tags may reference built-ins, loops and other user tags, without cycles.
    fn check_user_tags(&self) -> Result<()> {
        for (name, template) in &self.tags {
            for r in template.references() {
                if !(builtin::is_builtin(r) || self.loop_for_tag(r).is_some() || self.tags.contains_key(r)) {
                    return Err(GolemError::Config(format!(
                        "tag '{name}' references unknown tag '{r}'"
                    )));
                }
            }
        }

        // Depth-first search; `stack` holds the current path for the error message.
        fn visit<'a>(
            job: &'a Job,
            name: &'a str,
            done: &mut BTreeSet<&'a str>,
            stack: &mut Vec<&'a str>,
        ) -> Result<()> {
            if done.contains(name) {
                return Ok(());
            }
            if let Some(pos) = stack.iter().position(|n| *n == name) {
                let mut cycle: Vec<&str> = stack[pos..].to_vec();
                cycle.push(name);
                return Err(GolemError::Config(format!(
                    "tag reference cycle: {}",
                    cycle.join(" -> ")
                )));
            }
            stack.push(name);
            if let Some(template) = job.tags.get(name) {
                for r in template.references() {
                    if job.tags.contains_key(r) {
                        visit(job, r, done, stack)?;
                    }
                }
            }
            stack.pop();
            done.insert(name);
            Ok(())
        }

        let mut done = BTreeSet::new();
        for name in self.tags.keys() {
            visit(self, name, &mut done, &mut Vec::new())?;
        }
        Ok(())
    }

    /// Argument tags, inputs and outputs may only reference built-ins,
    /// loops, user tags (and argument tags, except from argument tags).
    fn check_references(&self) -> Result<()> {
        let known = |r: &str, allow_args: bool| {
            builtin::is_builtin(r)
                || self.loop_for_tag(r).is_some()
                || self.tags.contains_key(r)
                || (allow_args && self.arg_tags.contains_key(r))
        };
        for (name, template) in &self.arg_tags {
            if let Some(r) = template.references().find(|r| !known(r, false)) {
                return Err(GolemError::Config(format!(
                    "argument tag '{name}' references unknown tag '{r}'"
                )));
            }
        }
        for output in &self.outputs {
            if let Some(r) = output.template.references().find(|r| !known(r, true)) {
                return Err(GolemError::Config(format!(
                    "output '{}' references unknown tag '{r}'",
                    output.name
                )));
            }
        }
        for input in &self.inputs {
            if let Some(r) = input.template.references().find(|r| !known(r, true)) {
                return Err(GolemError::Config(format!(
                    "input '{}' references unknown tag '{r}'",
                    input.name
                )));
            }
        }
        Ok(())
    }

    /// Flow-map fields may reference any registered tag.
    fn check_flow_maps(&self, names: &NameRegistry) -> Result<()> {
        for flow in &self.flow_maps {
            for (field, template) in &flow.fields {
                if let Some(r) = template.references().find(|r| !names.contains(r)) {
                    return Err(GolemError::Config(format!(
                        "flow map '{}' field '{field}' references unknown tag '{r}'",
                        flow.name
                    )));
                }
            }
        }
        Ok(())
    }

    fn resolve_golem_input(
        &self,
        upstream: Arc<Job>,
        spec: GolemInputSpec,
        names: &mut NameRegistry,
    ) -> Result<GolemInput> {
        let outputs: Vec<(String, String)> = if spec.outputs.is_empty() {
            upstream
                .outputs
                .iter()
                .map(|o| (o.name.clone(), o.name.clone()))
                .collect()
        } else {
            spec.outputs
        };
        for (output, local) in &outputs {
            if upstream.output(output).is_none() {
                return Err(GolemError::Config(format!(
                    "job '{}' has no output '{output}'",
                    upstream.name
                )));
            }
            names.register(local, "input")?;
        }

        let join = match spec.join {
            Some(join) => join,
            None => upstream
                .loops
                .iter()
                .filter(|l| self.loop_named(&l.name).is_some())
                .map(|l| (l.name.clone(), l.name.clone()))
                .collect(),
        };
        for (up, local) in &join {
            if upstream.loop_named(up).is_none() {
                return Err(GolemError::Config(format!(
                    "join key '{up}' is not a loop of job '{}'",
                    upstream.name
                )));
            }
            if self.loop_named(local).is_none() {
                return Err(GolemError::Config(format!(
                    "join target '{local}' is not a loop of job '{}'",
                    self.name
                )));
            }
        }

        for (output, _) in &outputs {
            if let Some(o) = upstream.output(output) {
                let unbound: Vec<String> = upstream
                    .loops_in(&o.template)
                    .into_iter()
                    .filter(|l| !join.contains_key(l))
                    .collect();
                if !unbound.is_empty() {
                    return Err(GolemError::Config(format!(
                        "unbound loops {} in output '{output}' of job '{}'",
                        unbound.join(", "),
                        upstream.name
                    )));
                }
            }
        }

        let mut count = spec.count;
        if let Some(span) = spec.span {
            if count > 0 {
                return Err(GolemError::Config(format!(
                    "input from '{}' sets both span and count",
                    upstream.name
                )));
            }
            let step = micros(upstream.interval());
            let converted = (micros(span) + step - 1) / step;
            if converted <= 1 {
                return Err(GolemError::Config(format!(
                    "input span {span} from '{}' covers a single interval; use count or offset",
                    upstream.name
                )));
            }
            count = converted as u32;
        }

        Ok(GolemInput {
            job: upstream,
            outputs,
            join,
            sync: SyncOptions {
                count,
                offset: spec.offset,
                cover: spec.cover,
                trail: spec.trail,
            },
            required: spec.required,
        })
    }
}

/// Tracks every published name so duplicates fail at construction.
struct NameRegistry {
    kinds: BTreeMap<String, &'static str>,
}

impl NameRegistry {
    fn new() -> Self {
        let kinds = builtin::names()
            .into_iter()
            .map(|n| (n, "built-in tag"))
            .collect();
        Self { kinds }
    }

    fn register(&mut self, name: &str, kind: &'static str) -> Result<()> {
        if let Some(existing) = self.kinds.get(name) {
            return Err(GolemError::Config(format!(
                "duplicate tag name '{name}' ({kind}, already registered as {existing})"
            )));
        }
        self.kinds.insert(name.to_string(), kind);
        Ok(())
    }

    fn contains(&self, name: &str) -> bool {
        self.kinds.contains_key(name)
    }
}

fn parse_named(
    entries: &[(String, String)],
    kind: &'static str,
    names: &mut NameRegistry,
) -> Result<BTreeMap<String, Template>> {
    let mut out = BTreeMap::new();
    for (name, template) in entries {
        names.register(name, kind)?;
        out.insert(name.clone(), Template::parse(template)?);
    }
    Ok(out)
}

fn check_groups(
    groups: Vec<(String, Vec<String>)>,
    members_allowed: &BTreeSet<String>,
    kind: &'static str,
    names: &mut NameRegistry,
) -> Result<Vec<(String, Vec<String>)>> {
    for (name, members) in &groups {
        names.register(name, if kind == "input" { "input group" } else { "output group" })?;
        if let Some(m) = members.iter().find(|m| !members_allowed.contains(*m)) {
            return Err(GolemError::Config(format!(
                "{kind} group '{name}' names unknown {kind} '{m}'"
            )));
        }
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn daily(name: &str) -> JobBuilder {
        Job::builder(name, TimeDelta::days(1))
    }

    fn sensor_loop() -> Loop {
        Loop::new("sensor", ["LAB0", "LAB1", "OPS0"]).with_prefix_groups("sensor_group")
    }

    #[test]
    fn minimal_job_builds() {
        let job = daily("flows")
            .output("result", "result/%(golem_bin_iso)s.out", OutputSpec::default())
            .build()
            .unwrap();
        assert_eq!(job.span(), TimeDelta::days(1));
        assert!(job.key.as_str().starts_with("flows-"));
        assert_eq!(job.key.as_str().len(), "flows-".len() + 16);
    }

    #[test]
    fn job_key_depends_on_outputs() {
        let a = daily("flows")
            .output("r", "a/%(golem_bin_iso)s", OutputSpec::default())
            .build()
            .unwrap();
        let b = daily("flows")
            .output("r", "b/%(golem_bin_iso)s", OutputSpec::default())
            .build()
            .unwrap();
        assert_ne!(a.key, b.key);
    }

    #[test]
    fn realtime_zeros_lag() {
        let job = Job::builder("rt", TimeDelta::hours(1))
            .lag(TimeDelta::minutes(15))
            .realtime(true)
            .build()
            .unwrap();
        assert_eq!(job.cadence.lag, TimeDelta::zero());
    }

    #[test]
    fn non_positive_interval_rejected() {
        assert!(Job::builder("bad", TimeDelta::zero()).build().is_err());
        assert!(daily("bad").span(TimeDelta::seconds(-5)).build().is_err());
    }

    #[test]
    fn duplicate_names_rejected() {
        let err = daily("dup")
            .add_loop(sensor_loop())
            .tag("sensor", "x")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("duplicate tag name 'sensor'"));

        let err = daily("dup")
            .add_loop(sensor_loop())
            .tag("sensor_group", "x")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("sensor_group"));

        let err = daily("dup")
            .tag("golem_bin_iso", "x")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("built-in"));

        let err = daily("dup")
            .output("a", "a", OutputSpec::default())
            .input("a", "b", InputSpec::default())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("'a'"));
    }

    #[test]
    fn unknown_reference_rejected() {
        let err = daily("refs")
            .output("out", "x/%(nope)s", OutputSpec::default())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn tag_cycles_rejected() {
        let err = daily("cyc")
            .tag("a", "%(b)s")
            .tag("b", "%(c)s")
            .tag("c", "%(a)s")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn loops_are_found_through_tags() {
        let job = daily("deps")
            .add_loop(sensor_loop())
            .tag("prefix", "%(sensor)s-x")
            .output("out", "%(prefix)s/%(golem_bin_iso)s", OutputSpec::default())
            .build()
            .unwrap();
        let loops = job.loops_in(&job.outputs[0].template);
        assert!(loops.contains("sensor"));
    }

    #[test]
    fn auto_join_binds_shared_loops() {
        let upstream = daily("up")
            .add_loop(sensor_loop())
            .output("flows", "up/%(sensor)s/%(golem_bin_iso)s", OutputSpec::default())
            .build()
            .unwrap();
        let job = daily("down")
            .add_loop(sensor_loop())
            .golem_input(upstream, GolemInputSpec::default())
            .build()
            .unwrap();
        let input = &job.golem_inputs[0];
        assert_eq!(input.join.get("sensor").map(String::as_str), Some("sensor"));
        assert_eq!(input.outputs, vec![("flows".to_string(), "flows".to_string())]);
    }

    #[test]
    fn unbound_loops_rejected() {
        let upstream = daily("up")
            .add_loop(sensor_loop())
            .output("flows", "up/%(sensor)s/%(golem_bin_iso)s", OutputSpec::default())
            .build()
            .unwrap();
        let err = daily("down")
            .golem_input(upstream, GolemInputSpec::default())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("unbound loops sensor"));
    }

    #[test]
    fn join_keys_must_be_upstream_loops() {
        let upstream = daily("up")
            .output("flows", "up/%(golem_bin_iso)s", OutputSpec::default())
            .build()
            .unwrap();
        let spec = GolemInputSpec {
            join: Some([("site".to_string(), "sensor".to_string())].into()),
            ..GolemInputSpec::default()
        };
        let err = daily("down")
            .add_loop(sensor_loop())
            .golem_input(upstream, spec)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("join key 'site'"));
    }

    #[test]
    fn span_converts_to_count() {
        let upstream = Job::builder("hourly", TimeDelta::hours(1))
            .output("flows", "h/%(golem_bin_iso)s", OutputSpec::default())
            .build()
            .unwrap();
        let spec = GolemInputSpec {
            span: Some(TimeDelta::minutes(150)),
            ..GolemInputSpec::default()
        };
        let job = daily("down").golem_input(upstream.clone(), spec).build().unwrap();
        assert_eq!(job.golem_inputs[0].sync.count, 3);

        let spec = GolemInputSpec {
            span: Some(TimeDelta::hours(1)),
            ..GolemInputSpec::default()
        };
        assert!(daily("down").golem_input(upstream.clone(), spec).build().is_err());

        let spec = GolemInputSpec {
            span: Some(TimeDelta::hours(4)),
            count: 2,
            ..GolemInputSpec::default()
        };
        assert!(daily("down").golem_input(upstream, spec).build().is_err());
    }

    #[test]
    fn self_input_uses_previous_bin() {
        let job = daily("acc")
            .output("state", "acc/%(golem_bin_iso)s.state", OutputSpec::default())
            .output("report", "acc/%(golem_bin_iso)s.txt", OutputSpec::default())
            .self_input("state", "previous_state")
            .build()
            .unwrap();
        let input = &job.golem_inputs[0];
        assert_eq!(input.sync.offset, 1);
        assert_eq!(input.required, 0);
        assert_eq!(input.job.outputs.len(), 1);
        assert!(input.job.golem_inputs.is_empty());
    }

    #[test]
    fn groups_must_name_members() {
        let err = daily("grp")
            .output("a", "a/%(golem_bin_iso)s", OutputSpec::default())
            .output_group("all", &["a", "b"])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("unknown output 'b'"));
    }
}
