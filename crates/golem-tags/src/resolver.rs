//! Builds the tag dictionary of one iteration.
//!
//! Tags are published in a fixed order so later stages can reference
//! earlier ones:
//!
//! 1. built-in time and job tags
//! 2. loop tags (values, and group labels under the loop's group name)
//! 3. user tags, expanded in dependency order
//! 4. argument tags, one substitution per combination of referenced loops
//! 5. output tags and `golem_outputs`
//! 6. input tags and `golem_inputs`
//! 7. flow-query tags
//!
//! Publishing a name twice is a configuration error at any stage.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use golem_core::{ArgList, GolemError, Result};
use golem_jobs::{builtin, Job, Template, View};
use golem_repo::{glob, Repository};
use golem_scheduler::{iso_duration, parse_instant, DateParts};
use serde::Serialize;
use tracing::trace;

use crate::io::{GolemInputs, GolemOutputs};
use crate::value::{FlowQuery, TagValue};

/// Invocation-wide settings shared by every resolution.
#[derive(Debug, Clone, Default)]
pub struct TagContext {
    pub repository: Option<Arc<Repository>>,
    pub home: Option<PathBuf>,
    /// Expand output wildcards against the filesystem.
    pub glob_outputs: bool,
}

/// An iteration's name → value dictionary.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Tags {
    values: BTreeMap<String, TagValue>,
}

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `name`; a second publication of the same name fails.
    pub fn insert(&mut self, name: &str, value: TagValue) -> Result<()> {
        if self.values.contains_key(name) {
            return Err(GolemError::Config(format!("tag name collision: '{name}'")));
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Overwrite an already published name, or publish a new one.
    pub fn bind(&mut self, name: &str, value: TagValue) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&TagValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TagValue)> {
        self.values.iter()
    }

    /// Substitute every reference with the textual form of its value.
    pub fn render(&self, template: &Template) -> Result<String> {
        template.render(|name| {
            self.get(name)
                .map(|v| v.to_string())
                .ok_or_else(|| unknown(name))
        })
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// A fully resolved iteration.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub tags: Tags,
    pub outputs: GolemOutputs,
    pub inputs: GolemInputs,
}

/// The tag resolver.
#[derive(Debug, Clone, Default)]
pub struct GolemTags {
    ctx: TagContext,
}

impl GolemTags {
    pub fn new(ctx: TagContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &TagContext {
        &self.ctx
    }

    pub fn repository(&self) -> Option<&Repository> {
        self.ctx.repository.as_deref()
    }

    /// Every stage, for `view`.
    pub fn resolve(&self, view: &View) -> Result<Resolved> {
        let job = view.job();
        let mut tags = self.base(view)?;
        let outputs = GolemOutputs::resolve(self, view)?;
        outputs.publish(job, &mut tags)?;
        let inputs = GolemInputs::resolve(self, view)?;
        inputs.publish(job, &mut tags)?;
        publish_flow_maps(job, &mut tags)?;
        trace!(job = %job.name, view = %view, tags = tags.len(), "tags resolved");
        Ok(Resolved {
            tags,
            outputs,
            inputs,
        })
    }

    /// Stages 1 through 4: everything that does not touch the filesystem.
    pub fn base(&self, view: &View) -> Result<Tags> {
        let mut tags = Tags::new();
        self.publish_builtins(view, &mut tags)?;
        publish_loops(view, &mut tags)?;
        publish_user_tags(view.job(), &mut tags)?;
        publish_arg_tags(view, &mut tags)?;
        Ok(tags)
    }

    /// Render each template once per iteration of `view`; one list of
    /// renderings per template, in iteration order.
    pub fn render_each(&self, view: &View, templates: &[&Template]) -> Result<Vec<Vec<String>>> {
        let mut out = vec![Vec::new(); templates.len()];
        for iteration in view.product() {
            let tags = self.base(&iteration)?;
            for (slot, template) in out.iter_mut().zip(templates) {
                slot.push(tags.render(template)?);
            }
        }
        Ok(out)
    }

    /// Paths for a rendered output template.
    pub fn output_paths(&self, rendered: &str) -> Result<Vec<String>> {
        let paths = match self.repository() {
            Some(repo) => {
                let path = repo.resolve_output(rendered)?;
                if self.ctx.glob_outputs {
                    repo.expand(&path)
                } else {
                    vec![path]
                }
            }
            None if self.ctx.glob_outputs => expand_or_literal(Path::new(rendered)),
            None => vec![PathBuf::from(rendered)],
        };
        Ok(paths.iter().map(|p| p.to_string_lossy().into_owned()).collect())
    }

    /// Paths for a rendered input template; wildcards always expand.
    pub fn input_paths(&self, rendered: &str) -> Vec<String> {
        let paths = match self.repository() {
            Some(repo) => repo.expand(&repo.resolve_input(rendered)),
            None => expand_or_literal(Path::new(rendered)),
        };
        paths.iter().map(|p| p.to_string_lossy().into_owned()).collect()
    }

    /// Paths for a rendered upstream output template.
    pub fn upstream_paths(&self, rendered: &str) -> Result<Vec<String>> {
        let paths = match self.repository() {
            Some(repo) => repo.expand(&repo.resolve_output(rendered)?),
            None => expand_or_literal(Path::new(rendered)),
        };
        Ok(paths.iter().map(|p| p.to_string_lossy().into_owned()).collect())
    }

    fn publish_builtins(&self, view: &View, tags: &mut Tags) -> Result<()> {
        let job = view.job();
        let precision = job.precision();
        let repository = self
            .repository()
            .map(|r| r.root().display().to_string())
            .unwrap_or_default();
        let home = self
            .ctx
            .home
            .as_ref()
            .map(|h| h.display().to_string())
            .unwrap_or_default();

        tags.insert("golem_name", TagValue::scalar(&job.name))?;
        tags.insert("golem_suite", TagValue::scalar(job.suite.clone().unwrap_or_default()))?;
        tags.insert("golem_repository", TagValue::Scalar(repository))?;
        tags.insert("golem_home", TagValue::Scalar(home))?;
        tags.insert("golem_span", TagValue::Duration(job.span()))?;
        tags.insert("golem_interval", TagValue::Duration(job.interval()))?;
        tags.insert("golem_span_iso", TagValue::Scalar(iso_duration(job.span())))?;
        tags.insert("golem_interval_iso", TagValue::Scalar(iso_duration(job.interval())))?;
        tags.insert("golem_precision", TagValue::Scalar(precision.to_string()))?;

        let instants = [
            view.first_bin(),
            view.start_date(),
            view.end_date(),
            job.cadence.next_bin(view.last_bin()),
        ];
        for (prefix, t) in builtin::TIME_PREFIXES.into_iter().zip(instants) {
            tags.insert(&format!("{prefix}_date"), TagValue::Instant(t))?;
            tags.insert(&format!("{prefix}_iso"), TagValue::Scalar(precision.iso(t)))?;
            tags.insert(&format!("{prefix}_silk"), TagValue::Scalar(precision.silk(t)))?;
            tags.insert(&format!("{prefix}_basic"), TagValue::Scalar(precision.basic(t)))?;
            for (part, value) in DateParts::of(t).named() {
                tags.insert(&format!("{prefix}_{part}"), TagValue::Int(value))?;
            }
        }
        Ok(())
    }
}

fn unknown(name: &str) -> GolemError {
    GolemError::Config(format!("unknown tag '{name}'"))
}

fn expand_or_literal(path: &Path) -> Vec<PathBuf> {
    let found = glob::expand(path);
    if found.is_empty() {
        vec![path.to_path_buf()]
    } else {
        found
    }
}

fn publish_loops(view: &View, tags: &mut Tags) -> Result<()> {
    for (l, items) in view.job().loops.iter().zip(view.selection()) {
        tags.insert(&l.name, TagValue::Args(l.value_args(items)))?;
        if let (Some(group_name), Some(_)) = (&l.group_name, &l.groups) {
            tags.insert(group_name, TagValue::Args(l.group_args(items)))?;
        }
    }
    Ok(())
}

fn publish_user_tags(job: &Job, tags: &mut Tags) -> Result<()> {
    let no_loops = BTreeMap::new();
    let mut user = UserTags::new(job, tags, &no_loops);
    let mut resolved = Vec::with_capacity(job.tags.len());
    for name in job.tags.keys() {
        resolved.push((name, user.tag(name)?));
    }
    for (name, text) in resolved {
        tags.insert(name, TagValue::Scalar(text))?;
    }
    Ok(())
}

/// Renders user tags over published tags, with `bound` pinning loop tags to
/// single values. Each user tag is rendered once and reused by every
/// template that references it.
struct UserTags<'a> {
    job: &'a Job,
    tags: &'a Tags,
    bound: &'a BTreeMap<String, String>,
    rendered: HashMap<String, String>,
    stack: Vec<String>,
}

impl<'a> UserTags<'a> {
    fn new(job: &'a Job, tags: &'a Tags, bound: &'a BTreeMap<String, String>) -> Self {
        Self {
            job,
            tags,
            bound,
            rendered: HashMap::new(),
            stack: Vec::new(),
        }
    }

    fn tag(&mut self, name: &str) -> Result<String> {
        if let Some(text) = self.rendered.get(name) {
            return Ok(text.clone());
        }
        if let Some(pos) = self.stack.iter().position(|n| n == name) {
            let mut cycle = self.stack[pos..].to_vec();
            cycle.push(name.to_string());
            return Err(GolemError::Config(format!(
                "tag reference cycle: {}",
                cycle.join(" -> ")
            )));
        }
        let job = self.job;
        let template = job.tags.get(name).ok_or_else(|| unknown(name))?;
        self.stack.push(name.to_string());
        let text = self.render(template);
        self.stack.pop();
        let text = text?;
        self.rendered.insert(name.to_string(), text.clone());
        Ok(text)
    }

    fn render(&mut self, template: &Template) -> Result<String> {
        template.render(|r| {
            if let Some(value) = self.bound.get(r) {
                return Ok(value.clone());
            }
            if self.job.tags.contains_key(r) {
                return self.tag(r);
            }
            self.tags.get(r).map(|v| v.to_string()).ok_or_else(|| unknown(r))
        })
    }
}

fn publish_arg_tags(view: &View, tags: &mut Tags) -> Result<()> {
    let job = view.job();
    let mut resolved = Vec::with_capacity(job.arg_tags.len());
    for (name, template) in &job.arg_tags {
        let referenced = job.loops_in(template);
        let loops: Vec<_> = job
            .loops
            .iter()
            .filter(|l| referenced.contains(&l.name))
            .collect();
        let values: Vec<Vec<String>> = loops
            .iter()
            .map(|l| {
                view.items(&l.name)
                    .unwrap_or_default()
                    .iter()
                    .flat_map(|item| item.members.iter().cloned())
                    .collect::<ArgList>()
                    .into_vec()
            })
            .collect();

        let mut args = ArgList::new();
        for combination in cartesian(&values) {
            let mut bound = BTreeMap::new();
            for (l, value) in loops.iter().zip(&combination) {
                bound.insert(l.name.clone(), value.clone());
                if let (Some(group_name), Some(_)) = (&l.group_name, &l.groups) {
                    bound.insert(group_name.clone(), l.groups_of(value).join(&l.separator));
                }
            }
            args.push(UserTags::new(job, tags, &bound).render(template)?);
        }
        resolved.push((name, args));
    }
    for (name, args) in resolved {
        tags.insert(name, TagValue::Args(args))?;
    }
    Ok(())
}

fn cartesian(lists: &[Vec<String>]) -> Vec<Vec<String>> {
    let mut out: Vec<Vec<String>> = vec![Vec::new()];
    for list in lists {
        out = out
            .into_iter()
            .flat_map(|prefix| {
                list.iter().map(move |v| {
                    let mut next = prefix.clone();
                    next.push(v.clone());
                    next
                })
            })
            .collect();
    }
    out
}

fn publish_flow_maps(job: &Job, tags: &mut Tags) -> Result<()> {
    let start = tags.get("golem_start_date").and_then(TagValue::as_instant);
    let end = tags.get("golem_end_date").and_then(TagValue::as_instant);
    let (Some(start), Some(end)) = (start, end) else {
        return Ok(());
    };
    let sensors = job
        .loops
        .iter()
        .rev()
        .find(|l| l.sensor)
        .and_then(|l| tags.get(&l.name))
        .and_then(TagValue::as_args_list)
        .map(|a| a.iter().collect::<ArgList>())
        .unwrap_or_default()
        .with_separator(",");

    let mut queries = Vec::with_capacity(job.flow_maps.len());
    for flow in &job.flow_maps {
        let mut query = FlowQuery::new(&flow.name, start, end);
        query.sensors = sensors.clone();
        for (field, template) in &flow.fields {
            let text = tags.render(template)?;
            match field.as_str() {
                "start_date" => query.start_date = parse_instant(&text)?,
                "end_date" => query.end_date = parse_instant(&text)?,
                "sensors" => {
                    query.sensors = text
                        .split([',', ' '])
                        .filter(|s| !s.is_empty())
                        .collect::<ArgList>()
                        .with_separator(",")
                }
                _ => {
                    query.fields.insert(field.clone(), text);
                }
            }
        }
        queries.push(query);
    }
    for query in queries {
        let name = query.name.clone();
        tags.insert(&name, TagValue::Flow(query))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
    use golem_jobs::{Loop, OutputSpec};

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn later() -> NaiveDateTime {
        at(2030, 1, 1, 0)
    }

    fn sensors() -> Loop {
        Loop::new("sensor", ["LAB0", "LAB1", "OPS0"]).with_prefix_groups("sensor_group")
    }

    fn text(tags: &Tags, name: &str) -> String {
        tags.get(name).map(|v| v.to_string()).unwrap_or_default()
    }

    #[test]
    fn builtins_render_at_precision() {
        let job = Job::builder("daily", TimeDelta::days(1))
            .suite("netflow")
            .epoch(at(2024, 1, 1, 0))
            .build()
            .unwrap();
        let view = View::new(job, at(2024, 2, 12, 10), at(2024, 2, 12, 10), later()).unwrap();
        let tags = GolemTags::default().base(&view).unwrap();
        assert_eq!(text(&tags, "golem_name"), "daily");
        assert_eq!(text(&tags, "golem_suite"), "netflow");
        assert_eq!(text(&tags, "golem_bin_iso"), "2024-02-12");
        assert_eq!(text(&tags, "golem_bin_silk"), "2024/02/12");
        assert_eq!(text(&tags, "golem_bin_basic"), "20240212");
        assert_eq!(text(&tags, "golem_next_bin_iso"), "2024-02-13");
        assert_eq!(text(&tags, "golem_end_date"), "2024-02-12T23:59:59.999999");
        assert_eq!(text(&tags, "golem_bin_month"), "2");
        assert_eq!(text(&tags, "golem_interval_iso"), "P1D");
        assert_eq!(text(&tags, "golem_precision"), "day");
        for name in builtin::names() {
            if name != builtin::GOLEM_INPUTS && name != builtin::GOLEM_OUTPUTS {
                assert!(tags.contains(&name), "missing {name}");
            }
        }
    }

    #[test]
    fn daily_outputs_for_each_bin() {
        let job = Job::builder("daily", TimeDelta::days(1))
            .epoch(at(2024, 1, 1, 0))
            .output("result", "result/%(golem_bin_iso)s.out", OutputSpec::default())
            .build()
            .unwrap();
        let view = View::new(job, at(2024, 2, 12, 10), at(2024, 2, 18, 10), later()).unwrap();
        let resolver = GolemTags::default();
        let outputs: Vec<String> = view
            .product()
            .iter()
            .map(|it| text(&resolver.resolve(it).unwrap().tags, "result"))
            .collect();
        assert_eq!(outputs.len(), 7);
        assert_eq!(outputs[0], "result/2024-02-12.out");
        assert_eq!(outputs[6], "result/2024-02-18.out");

        let whole = resolver.resolve(&view).unwrap();
        assert_eq!(whole.outputs.get("result").unwrap().paths.len(), 7);
    }

    #[test]
    fn group_selection_publishes_members_and_label() {
        let job = Job::builder("looped", TimeDelta::days(1))
            .add_loop(sensors())
            .output("out", "out/%(sensor_group)s/%(sensor)s.txt", OutputSpec::default())
            .build()
            .unwrap();
        let view = View::new(job, at(2024, 2, 12, 0), at(2024, 2, 12, 0), later())
            .unwrap()
            .select("sensor_group", &["LAB".to_string()])
            .unwrap();
        let product = view.product();
        assert_eq!(product.len(), 1);
        let tags = GolemTags::default().resolve(&product[0]).unwrap().tags;
        assert_eq!(text(&tags, "sensor"), "LAB0,LAB1");
        assert_eq!(text(&tags, "sensor_group"), "LAB");
        assert_eq!(text(&tags, "out"), "out/LAB/LAB0,LAB1.txt");
    }

    #[test]
    fn user_tags_expand_in_dependency_order() {
        let job = Job::builder("tags", TimeDelta::days(1))
            .add_loop(sensors())
            .tag("root", "data/%(golem_bin_iso)s")
            .tag("dir", "%(root)s/%(sensor)s")
            .build()
            .unwrap();
        let view = View::new(job, at(2024, 2, 12, 0), at(2024, 2, 12, 0), later())
            .unwrap()
            .select("sensor", &["OPS0".to_string()])
            .unwrap();
        let tags = GolemTags::default().base(&view).unwrap();
        assert_eq!(text(&tags, "dir"), "data/2024-02-12/OPS0");
    }

    #[test]
    fn shared_user_tags_render_once() {
        // Every level references the one below twice: 2^40 paths unless
        // rendered texts are reused.
        let mut builder = Job::builder("diamond", TimeDelta::days(1)).tag("t0", "");
        for i in 1..=40 {
            let below = format!("t{}", i - 1);
            builder = builder.tag(&format!("t{i}"), &format!("%({below})s%({below})s"));
        }
        let job = builder.tag("top", "%(golem_bin_iso)s%(t40)s").build().unwrap();
        let view = View::new(job, at(2024, 2, 12, 0), at(2024, 2, 12, 0), later()).unwrap();
        let tags = GolemTags::default().base(&view).unwrap();
        assert_eq!(text(&tags, "top"), "2024-02-12");
        assert_eq!(text(&tags, "t40"), "");
    }

    #[test]
    fn arg_tags_enumerate_referenced_loops() {
        let job = Job::builder("args", TimeDelta::days(1))
            .add_loop(sensors())
            .add_loop(Loop::new("proto", ["tcp", "udp"]))
            .tag("stem", "%(sensor)s-%(sensor_group)s")
            .arg_tag("files", "in/%(stem)s.rw")
            .build()
            .unwrap();
        let view = View::new(job, at(2024, 2, 12, 0), at(2024, 2, 12, 0), later())
            .unwrap()
            .select("sensor", &["LAB".to_string()])
            .unwrap();
        let tags = GolemTags::default().base(&view).unwrap();
        assert_eq!(text(&tags, "files"), "in/LAB0-LAB.rw in/LAB1-LAB.rw");
    }

    #[test]
    fn flow_maps_default_to_window_and_sensor() {
        let job = Job::builder("flows", TimeDelta::days(1))
            .add_loop(sensors())
            .flow_map("query", &[("type", "in,out"), ("class", "all")])
            .build()
            .unwrap();
        let view = View::new(job, at(2024, 2, 12, 0), at(2024, 2, 12, 0), later())
            .unwrap()
            .select("sensor", &["LAB0".to_string(), "OPS0".to_string()])
            .unwrap();
        let tags = GolemTags::default().resolve(&view).unwrap().tags;
        assert_eq!(
            text(&tags, "query"),
            "--start-date=2024/02/12:00 --end-date=2024/02/12:23 --sensors=LAB0,OPS0 --class=all --type=in,out"
        );
    }

    #[test]
    fn resolution_is_deterministic() {
        let job = Job::builder("det", TimeDelta::hours(1))
            .add_loop(sensors())
            .output("o", "o/%(sensor)s/%(golem_bin_basic)s", OutputSpec::default())
            .build()
            .unwrap();
        let view = View::new(job, at(2024, 2, 12, 0), at(2024, 2, 12, 5), later()).unwrap();
        let resolver = GolemTags::default();
        assert_eq!(
            resolver.resolve(&view).unwrap().tags,
            resolver.resolve(&view).unwrap().tags
        );
    }

    #[test]
    fn collisions_name_the_tag() {
        let mut tags = Tags::new();
        tags.insert("sensor", TagValue::scalar("a")).unwrap();
        let err = tags.insert("sensor", TagValue::scalar("b")).unwrap_err();
        assert!(err.to_string().contains("'sensor'"));
    }

    #[test]
    fn outputs_resolve_inside_repository() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(Repository::open(dir.path()).unwrap());
        let job = Job::builder("daily", TimeDelta::days(1))
            .epoch(at(2024, 1, 1, 0))
            .output("result", "result/%(golem_bin_iso)s.out", OutputSpec::default())
            .build()
            .unwrap();
        let view = View::new(job, at(2024, 2, 12, 0), at(2024, 2, 12, 0), later()).unwrap();
        let resolver = GolemTags::new(TagContext {
            repository: Some(repo.clone()),
            ..TagContext::default()
        });
        let tags = resolver.resolve(&view).unwrap().tags;
        let expected = repo.root().join("result/2024-02-12.out");
        assert_eq!(text(&tags, "result"), expected.to_string_lossy());
        assert_eq!(text(&tags, "golem_repository"), repo.root().to_string_lossy());
        let json = tags.to_json().unwrap();
        assert_eq!(json["golem_outputs"]["result"][0], &*expected.to_string_lossy());
    }
}
