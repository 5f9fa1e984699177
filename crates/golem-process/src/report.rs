//! Read-only views of a process, plus purge and single-iteration queries.

use std::path::{Path, PathBuf};

use golem_core::{ArgList, GolemError, Result};
use golem_jobs::{builtin, View};
use golem_repo::{Audit, OutputAudit, Presence};
use golem_tags::{GolemInputs, GolemOutputs, TagValue};
use serde::Serialize;
use tracing::{debug, info};

use crate::process::{check_inputs, path_list, GolemProcess, Iteration};

/// Output audit of one iteration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationStatus {
    pub iteration: String,
    pub complete: bool,
    pub outputs: Vec<OutputAudit>,
}

/// Resolved paths of one named input or output in one iteration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathReport {
    pub iteration: String,
    pub name: String,
    pub paths: Vec<Audit>,
}

impl GolemProcess {
    /// Audit every iteration's outputs.
    pub fn status(&self) -> Result<Vec<IterationStatus>> {
        self.view
            .product()
            .iter()
            .map(|view| self.status_of(view))
            .collect()
    }

    /// Iterations that would run: outputs incomplete and inputs available.
    pub fn queue(&self) -> Result<Vec<IterationStatus>> {
        let mut queued = Vec::new();
        for view in self.view.product() {
            let status = self.status_of(&view)?;
            if status.complete {
                continue;
            }
            let inputs = GolemInputs::resolve(&self.resolver, &view)?;
            if check_inputs(&inputs).is_ok() {
                queued.push(status);
            }
        }
        Ok(queued)
    }

    /// Iterations whose outputs are all present.
    pub fn complete(&self) -> Result<Vec<IterationStatus>> {
        Ok(self.status()?.into_iter().filter(|s| s.complete).collect())
    }

    pub fn inputs(&self) -> Result<Vec<PathReport>> {
        let mut reports = Vec::new();
        for view in self.view.product() {
            let inputs = GolemInputs::resolve(&self.resolver, &view)?;
            for input in inputs.iter() {
                reports.push(PathReport {
                    iteration: view.describe(),
                    name: input.name.clone(),
                    paths: audit_each(input.paths.iter()),
                });
            }
        }
        Ok(reports)
    }

    pub fn outputs(&self) -> Result<Vec<PathReport>> {
        let mut reports = Vec::new();
        for view in self.view.product() {
            for output in self.outputs_of(&view)?.iter() {
                reports.push(PathReport {
                    iteration: view.describe(),
                    name: output.name.clone(),
                    paths: audit_each(output.paths.iter()),
                });
            }
        }
        Ok(reports)
    }

    /// Remove every iteration's outputs and the directories they leave
    /// empty. Returns the files removed.
    pub fn purge(&self) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        for view in self.view.product() {
            let paths = path_list(&self.outputs_of(&view)?);
            removed.extend(
                self.repository
                    .purge_output(self.job_key(), &view.describe(), &paths)?,
            );
        }
        info!(job = %self.view.job().name, files = removed.len(), "purge finished");
        Ok(removed)
    }

    /// Tags of the single selected iteration with `path` bound to the single
    /// selected output or query template. Nothing is prepared or finalized.
    pub fn query(&self, path: &str) -> Result<Iteration> {
        let mut views = self.view.product();
        if views.len() != 1 {
            return Err(GolemError::Parameter(format!(
                "ambiguous query selection: {} iterations selected",
                views.len()
            )));
        }
        let view = views.remove(0);
        let job = view.job().clone();
        let names: Vec<String> = match &self.output_select {
            Some(names) => names.clone(),
            None => job
                .outputs
                .iter()
                .map(|o| o.name.clone())
                .chain(job.queries.iter().map(|q| q.name.clone()))
                .collect(),
        };
        let [name] = names.as_slice() else {
            return Err(GolemError::Parameter(format!(
                "ambiguous query selection: {} outputs selected",
                names.len()
            )));
        };

        let resolved = self.resolver.resolve(&view)?;
        let mut tags = resolved.tags;
        let bound = TagValue::Args(ArgList::single(path));
        tags.bind(name, bound.clone());
        if job.output(name).is_some() {
            if let Some(TagValue::Map(mut all)) = tags.get(builtin::GOLEM_OUTPUTS).cloned() {
                all.insert(name.clone(), bound);
                tags.bind(builtin::GOLEM_OUTPUTS, TagValue::Map(all));
            }
        }
        let kept: Vec<String> = job
            .output(name)
            .map(|_| vec![name.clone()])
            .unwrap_or_default();
        let outputs = resolved.outputs.select(&kept)?;
        debug!(job = %job.name, output = %name, path, "query bound");
        Ok(Iteration {
            view,
            tags,
            outputs,
            inputs: resolved.inputs,
        })
    }

    fn outputs_of(&self, view: &View) -> Result<GolemOutputs> {
        self.selected(&GolemOutputs::resolve(&self.resolver, view)?)
    }

    fn status_of(&self, view: &View) -> Result<IterationStatus> {
        let label = view.describe();
        let resolved: Vec<(String, Vec<PathBuf>)> = self
            .outputs_of(view)?
            .iter()
            .map(|o| (o.name.clone(), o.paths.iter().map(PathBuf::from).collect()))
            .collect();
        let outputs = self.repository.audit(self.job_key(), &label, &resolved);
        let keep_empty = self.options.keep_empty_outputs;
        let complete = !outputs.is_empty()
            && outputs.iter().all(|a| {
                if keep_empty {
                    a.presence.exists()
                } else {
                    a.presence.is_complete()
                }
            });
        Ok(IterationStatus {
            iteration: label,
            complete,
            outputs,
        })
    }
}

fn audit_each<'a>(paths: impl Iterator<Item = &'a String>) -> Vec<Audit> {
    paths
        .map(|p| {
            let path = PathBuf::from(p);
            let presence = Presence::of(Path::new(&path));
            Audit { path, presence }
        })
        .collect()
}
