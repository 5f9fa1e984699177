//! Drives a job over every iteration of a view.
//!
//! Each iteration goes through the same steps:
//!
//! 1. check that required inputs exist
//! 2. prepare outputs (create directories, clear what must be rewritten)
//! 3. hand the tag dictionary to the caller
//! 4. finalize outputs (drop empty files and directories nothing was written to)
//!
//! Steps 1 and 2 may raise signals. The process handler turns each one into
//! a skip, an abort, or nothing.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use golem_core::{GolemConfig, GolemError, Result};
use golem_jobs::View;
use golem_repo::{PrepareOptions, Presence, Repository};
use golem_tags::{GolemInputs, GolemOutputs, GolemTags, TagContext, Tags};
use serde::Serialize;
use tracing::{debug, info};

use crate::handler::{DefaultHandler, SignalHandler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOptions {
    pub skip_incomplete: bool,
    pub skip_partial: bool,
    pub overwrite: bool,
    pub keep_empty_outputs: bool,
    pub create_dirs: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            skip_incomplete: false,
            skip_partial: false,
            overwrite: false,
            keep_empty_outputs: false,
            create_dirs: true,
        }
    }
}

impl From<&GolemConfig> for ProcessOptions {
    fn from(config: &GolemConfig) -> Self {
        Self {
            skip_incomplete: config.skip_incomplete,
            skip_partial: config.skip_partial,
            overwrite: config.overwrite,
            keep_empty_outputs: config.keep_empty_outputs,
            create_dirs: config.create_dirs,
        }
    }
}

/// One prepared iteration, ready for the caller to produce its outputs.
#[derive(Debug, Clone)]
pub struct Iteration {
    pub view: View,
    pub tags: Tags,
    pub outputs: GolemOutputs,
    pub inputs: GolemInputs,
}

impl Iteration {
    /// Cache label and error context of this iteration.
    pub fn label(&self) -> String {
        self.view.describe()
    }

    pub fn output_paths(&self) -> Vec<PathBuf> {
        path_list(&self.outputs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub processed: usize,
    pub skipped: usize,
}

/// A job bound to a view, a repository and a signal handler.
pub struct GolemProcess {
    pub(crate) view: View,
    pub(crate) resolver: GolemTags,
    pub(crate) repository: Arc<Repository>,
    pub(crate) options: ProcessOptions,
    handler: Box<dyn SignalHandler>,
    pub(crate) output_select: Option<Vec<String>>,
}

impl GolemProcess {
    pub fn new(
        view: View,
        repository: Arc<Repository>,
        home: Option<PathBuf>,
        options: ProcessOptions,
    ) -> Self {
        let resolver = GolemTags::new(TagContext {
            repository: Some(repository.clone()),
            home,
            glob_outputs: true,
        });
        let handler = DefaultHandler {
            skip_incomplete: options.skip_incomplete,
            skip_partial: options.skip_partial,
        };
        Self {
            view,
            resolver,
            repository,
            options,
            handler: Box::new(handler),
            output_select: None,
        }
    }

    pub fn with_handler(mut self, handler: impl SignalHandler + 'static) -> Self {
        self.handler = Box::new(handler);
        self
    }

    /// Restrict the run to the named outputs or query templates. An empty
    /// list clears the restriction.
    pub fn output_select(mut self, names: &[String]) -> Result<Self> {
        let job = self.view.job();
        if let Some(bad) = names
            .iter()
            .find(|n| job.output(n).is_none() && !job.queries.iter().any(|q| &q.name == *n))
        {
            return Err(GolemError::Parameter(format!(
                "unknown output '{bad}' for job {}",
                job.name
            )));
        }
        self.output_select = (!names.is_empty()).then(|| names.to_vec());
        Ok(self)
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn options(&self) -> ProcessOptions {
        self.options
    }

    pub fn repository(&self) -> &Arc<Repository> {
        &self.repository
    }

    /// Prepared iterations in bin order, then declared loop order. Requesting
    /// the next item finalizes the previous one; skipped iterations are never
    /// yielded. The first error ends the sequence.
    pub fn iterations(&self) -> Iterations<'_> {
        Iterations {
            process: self,
            pending: self.view.product().into_iter(),
            current: None,
            skipped: 0,
            failed: false,
        }
    }

    /// Call `body` once per prepared iteration. A failing body stops the run
    /// and leaves that iteration's outputs prepared but not finalized.
    pub fn run<F>(&self, mut body: F) -> Result<RunSummary>
    where
        F: FnMut(&Iteration) -> Result<()>,
    {
        let job = self.view.job();
        info!(job = %job.name, view = %self.view, "run started");
        let mut iterations = self.iterations();
        let mut processed = 0;
        for iteration in iterations.by_ref() {
            body(&iteration?)?;
            processed += 1;
        }
        let summary = RunSummary {
            processed,
            skipped: iterations.skipped(),
        };
        info!(job = %job.name, processed, skipped = summary.skipped, "run finished");
        Ok(summary)
    }

    /// Outputs taking part in this run.
    pub(crate) fn selected(&self, outputs: &GolemOutputs) -> Result<GolemOutputs> {
        match &self.output_select {
            None => Ok(outputs.clone()),
            Some(names) => {
                let names: Vec<String> = names
                    .iter()
                    .filter(|n| outputs.get(n).is_some())
                    .cloned()
                    .collect();
                outputs.select(&names)
            }
        }
    }

    pub(crate) fn job_key(&self) -> &str {
        self.view.job().key.as_str()
    }

    fn prepare_options(&self) -> PrepareOptions {
        PrepareOptions {
            overwrite: self.options.overwrite,
            zap_empty: !self.options.keep_empty_outputs,
            create: self.options.create_dirs,
        }
    }

    /// Resolve and prepare one iteration. `None` when the handler skipped it.
    fn enter(&self, view: View) -> Result<Option<Iteration>> {
        let resolved = self.resolver.resolve(&view)?;
        let outputs = self.selected(&resolved.outputs)?;

        if let Err(signal) = check_inputs(&resolved.inputs) {
            if !self.proceed(signal, &view)? {
                return Ok(None);
            }
        }

        let label = view.describe();
        let paths = path_list(&outputs);
        let (present, absent) =
            self.repository
                .prepare_output(self.job_key(), &label, &paths, self.prepare_options())?;
        if !present.is_empty() {
            let signal = if absent.is_empty() {
                GolemError::Complete
            } else {
                GolemError::PartialComplete {
                    present: present.into_vec(),
                    missing: absent.into_vec(),
                }
            };
            let decision = self.proceed(signal, &view);
            if !matches!(decision, Ok(true)) {
                // Leave no trace of the preparation behind.
                self.repository
                    .finalize_output(self.job_key(), &label, &paths, false)?;
                if !decision? {
                    return Ok(None);
                }
            }
        }

        debug!(iteration = %label, outputs = paths.len(), "iteration prepared");
        Ok(Some(Iteration {
            view,
            tags: resolved.tags,
            outputs,
            inputs: resolved.inputs,
        }))
    }

    fn finalize(&self, label: &str, paths: &[PathBuf]) -> Result<()> {
        self.repository.finalize_output(
            self.job_key(),
            label,
            paths,
            !self.options.keep_empty_outputs,
        )
    }

    /// `Ok(true)` to go on, `Ok(false)` to skip, `Err` to abort.
    fn proceed(&self, signal: GolemError, view: &View) -> Result<bool> {
        match self.handler.handle(signal, view) {
            Ok(()) => Ok(true),
            Err(GolemError::Ignore) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Iterator returned by [`GolemProcess::iterations`].
pub struct Iterations<'a> {
    process: &'a GolemProcess,
    pending: std::vec::IntoIter<View>,
    /// Label and output paths of the iteration last handed out.
    current: Option<(String, Vec<PathBuf>)>,
    skipped: usize,
    failed: bool,
}

impl Iterations<'_> {
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl Iterator for Iterations<'_> {
    type Item = Result<Iteration>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if let Some((label, paths)) = self.current.take() {
            if let Err(e) = self.process.finalize(&label, &paths) {
                self.failed = true;
                return Some(Err(e));
            }
        }
        for view in self.pending.by_ref() {
            match self.process.enter(view) {
                Ok(Some(iteration)) => {
                    self.current = Some((iteration.label(), iteration.output_paths()));
                    return Some(Ok(iteration));
                }
                Ok(None) => self.skipped += 1,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

/// Required inputs must be on disk. `required == 1` wants every resolved
/// file; a larger count wants at least that many; zero never fails.
pub(crate) fn check_inputs(inputs: &GolemInputs) -> Result<()> {
    for input in inputs.iter() {
        if input.required == 0 {
            continue;
        }
        let missing: Vec<&String> = input
            .paths
            .iter()
            .filter(|p| !Presence::of(Path::new(p.as_str())).exists())
            .collect();
        let found = input.paths.len() - missing.len();
        let satisfied = if input.required == 1 {
            missing.is_empty() && found > 0
        } else {
            found >= input.required
        };
        if !satisfied {
            return Err(GolemError::InputMissing {
                label: input.name.clone(),
                path: missing.first().map(|p| p.to_string()).unwrap_or_default(),
            });
        }
    }
    Ok(())
}

pub(crate) fn path_list(outputs: &GolemOutputs) -> Vec<PathBuf> {
    outputs.paths().iter().map(PathBuf::from).collect()
}
