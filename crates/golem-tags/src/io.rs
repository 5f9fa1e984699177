//! Output and input expansion for one view.
//!
//! Outputs render the job's own templates over every iteration of the view.
//! Inputs come from two places: the job's input templates, rendered the same
//! way, and upstream jobs, whose outputs are rendered over an upstream view
//! joined on loops and synchronized to the local window.

use std::collections::BTreeMap;

use golem_core::{ArgList, GolemError, Result};
use golem_jobs::{builtin, GolemInput, Job, LoopItem, View};
use serde::Serialize;
use tracing::debug;

use crate::resolver::{GolemTags, Tags};
use crate::value::TagValue;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedOutput {
    pub name: String,
    pub paths: ArgList,
    pub scope: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedInput {
    pub name: String,
    pub paths: ArgList,
    pub required: usize,
    /// Producing job, for inputs drawn from another job's outputs.
    pub upstream: Option<String>,
}

/// Resolved outputs of a view, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct GolemOutputs {
    outputs: Vec<ResolvedOutput>,
}

impl GolemOutputs {
    pub fn resolve(resolver: &GolemTags, view: &View) -> Result<Self> {
        let job = view.job();
        let templates: Vec<_> = job.outputs.iter().map(|o| &o.template).collect();
        let rendered = resolver.render_each(view, &templates)?;
        let mut outputs = Vec::with_capacity(job.outputs.len());
        for (output, texts) in job.outputs.iter().zip(rendered) {
            let mut paths = ArgList::new();
            for text in texts {
                paths.extend(resolver.output_paths(&text)?);
            }
            outputs.push(ResolvedOutput {
                name: output.name.clone(),
                paths,
                scope: output.spec.scope,
            });
        }
        Ok(Self { outputs })
    }

    pub fn get(&self, name: &str) -> Option<&ResolvedOutput> {
        self.outputs.iter().find(|o| o.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResolvedOutput> {
        self.outputs.iter()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Keep only the named outputs; unknown names are parameter errors.
    pub fn select(&self, names: &[String]) -> Result<Self> {
        if let Some(bad) = names.iter().find(|n| self.get(n).is_none()) {
            return Err(GolemError::Parameter(format!("unknown output '{bad}'")));
        }
        Ok(Self {
            outputs: self
                .outputs
                .iter()
                .filter(|o| names.contains(&o.name))
                .cloned()
                .collect(),
        })
    }

    /// Every output path, in declaration order.
    pub fn paths(&self) -> ArgList {
        let mut all = ArgList::new();
        for o in &self.outputs {
            all.extend(o.paths.iter().cloned());
        }
        all
    }

    pub fn publish(&self, job: &Job, tags: &mut Tags) -> Result<()> {
        let mut map = BTreeMap::new();
        for o in &self.outputs {
            tags.insert(&o.name, TagValue::Args(o.paths.clone()))?;
            map.insert(o.name.clone(), TagValue::Args(o.paths.clone()));
        }
        for (group, members) in &job.output_groups {
            let union = union_of(members, |m| self.get(m).map(|o| &o.paths));
            tags.insert(group, TagValue::Args(union))?;
        }
        tags.insert(builtin::GOLEM_OUTPUTS, TagValue::Map(map))
    }
}

/// Resolved inputs of a view: input templates first, then upstream outputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct GolemInputs {
    inputs: Vec<ResolvedInput>,
}

impl GolemInputs {
    pub fn resolve(resolver: &GolemTags, view: &View) -> Result<Self> {
        let job = view.job();
        let mut inputs = Vec::new();

        let templates: Vec<_> = job.inputs.iter().map(|i| &i.template).collect();
        let rendered = resolver.render_each(view, &templates)?;
        for (input, texts) in job.inputs.iter().zip(rendered) {
            let mut paths = ArgList::new();
            for text in texts {
                paths.extend(resolver.input_paths(&text));
            }
            inputs.push(ResolvedInput {
                name: input.name.clone(),
                paths,
                required: input.spec.required,
                upstream: None,
            });
        }

        for golem_input in &job.golem_inputs {
            let upstream = golem_input.job.as_ref();
            let window = upstream_view(view, golem_input)?;
            debug!(
                job = %job.name,
                upstream = %upstream.name,
                window = %window,
                "upstream window"
            );
            for (output_name, local) in &golem_input.outputs {
                let output = upstream.output(output_name).ok_or_else(|| {
                    GolemError::Config(format!(
                        "job '{}' has no output '{output_name}'",
                        upstream.name
                    ))
                })?;
                let scoped = if output.spec.scope > 1 {
                    window.extend_back(upstream.interval() * (output.spec.scope as i32 - 1))
                } else {
                    window.clone()
                };
                let mut paths = ArgList::new();
                for text in resolver.render_each(&scoped, &[&output.template])?.concat() {
                    paths.extend(resolver.upstream_paths(&text)?);
                }
                inputs.push(ResolvedInput {
                    name: local.clone(),
                    paths,
                    required: golem_input.required,
                    upstream: Some(upstream.name.clone()),
                });
            }
        }
        Ok(Self { inputs })
    }

    pub fn get(&self, name: &str) -> Option<&ResolvedInput> {
        self.inputs.iter().find(|i| i.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResolvedInput> {
        self.inputs.iter()
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Every input path, in resolution order.
    pub fn paths(&self) -> ArgList {
        let mut all = ArgList::new();
        for i in &self.inputs {
            all.extend(i.paths.iter().cloned());
        }
        all
    }

    pub fn publish(&self, job: &Job, tags: &mut Tags) -> Result<()> {
        let mut map = BTreeMap::new();
        for i in &self.inputs {
            tags.insert(&i.name, TagValue::Args(i.paths.clone()))?;
            map.insert(i.name.clone(), TagValue::Args(i.paths.clone()));
        }
        for (group, members) in &job.input_groups {
            let union = union_of(members, |m| self.get(m).map(|i| &i.paths));
            tags.insert(group, TagValue::Args(union))?;
        }
        tags.insert(builtin::GOLEM_INPUTS, TagValue::Map(map))
    }
}

fn union_of<'a, F>(members: &[String], mut lookup: F) -> ArgList
where
    F: FnMut(&str) -> Option<&'a ArgList>,
{
    let mut union = ArgList::new();
    for m in members {
        if let Some(paths) = lookup(m) {
            union = union + paths.clone();
        }
    }
    union
}

/// The upstream view feeding `input` for the local `view`: loops joined to
/// the local selection, then synchronized to the local window.
pub fn upstream_view(view: &View, input: &GolemInput) -> Result<View> {
    let upstream = &input.job;
    let local_job = view.job();
    let mut joined = View::new(upstream.clone(), view.first_date(), view.last_date(), view.now())?;

    for (up_name, local_name) in &input.join {
        let (Some(index), Some(up_loop), Some(local_loop)) = (
            upstream.loop_index(up_name),
            upstream.loop_named(up_name),
            local_job.loop_named(local_name),
        ) else {
            return Err(GolemError::Config(format!(
                "invalid join {up_name} -> {local_name} between '{}' and '{}'",
                upstream.name, local_job.name
            )));
        };

        let mut items: Vec<LoopItem> = Vec::new();
        let mut push = |item: LoopItem| {
            if !items.contains(&item) {
                items.push(item);
            }
        };
        for item in view.items(local_name).unwrap_or_default() {
            if item.is_group {
                if let Some(members) = up_loop.group(&item.label) {
                    push(LoopItem::group(&item.label, members));
                    continue;
                }
            }
            for member in &item.members {
                if up_loop.values.contains(member) {
                    push(LoopItem::value(member));
                } else if let Some(members) = up_loop.group(member) {
                    push(LoopItem::group(member, members));
                } else {
                    return Err(GolemError::Config(format!(
                        "value '{member}' of loop '{local_name}' is not in loop '{up_name}' of job '{}'",
                        upstream.name
                    )));
                }
            }
        }

        // Every upstream value selected must be a local value or a member of
        // a local group.
        let uncovered = items.iter().flat_map(|i| &i.members).find(|m| {
            !local_loop.values.contains(m)
                && !local_loop
                    .groups
                    .iter()
                    .flatten()
                    .any(|(_, members)| members.contains(m))
        });
        if let Some(member) = uncovered {
            return Err(GolemError::Config(format!(
                "join {up_name} -> {local_name}: value '{member}' of job '{}' has no local counterpart",
                upstream.name
            )));
        }
        joined = joined.with_items(index, items);
    }

    Ok(joined.sync_to(view, input.sync))
}
