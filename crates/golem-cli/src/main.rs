use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use golem_core::{GolemConfig, GolemError};
use golem_jobs::{Job, JobRegistry, View};
use golem_process::{GolemProcess, ProcessOptions, RunSummary};
use golem_repo::Repository;
use serde::Serialize;
use tracing::{debug, info};

mod args;

use args::{Cli, Mode};

fn main() -> ExitCode {
    // logs go to stderr; stdout carries JSON for the host
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "golem=info,golem_process=info,golem_repo=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = GolemConfig::load(cli.config.as_deref())?;
    let (job, script) = load_job(&cli.job, &config)?;
    info!(job = %job.name, key = %job.key, "job loaded");

    let now = cli
        .now
        .unwrap_or_else(|| chrono::Utc::now().naive_utc());
    let view = build_view(&cli, job, now)?;
    debug!(view = %view, bins = view.bin_count(), "view selected");

    let root = cli
        .repository
        .clone()
        .or_else(|| config.repository.clone())
        .ok_or_else(|| GolemError::Repository("no repository configured".into()))?;
    let repository = Arc::new(Repository::open(&root)?);

    let mut options = ProcessOptions::from(&config);
    options.skip_incomplete |= cli.skip_incomplete;
    options.skip_partial |= cli.skip_partial;
    options.overwrite |= cli.overwrite;
    options.keep_empty_outputs |= cli.keep_empty_outputs;

    let home = script.map(|s| config.home_for(&s)).or_else(|| config.home.clone());
    let process =
        GolemProcess::new(view, repository, home, options).output_select(&cli.output_select)?;

    match cli.mode() {
        Mode::Process => {
            let summary = drive(&process, std::io::stdin().lock(), std::io::stdout().lock())?;
            info!(processed = summary.processed, skipped = summary.skipped, "done");
        }
        Mode::Purge => emit(&process.purge()?)?,
        Mode::Status => emit(&process.status()?)?,
        Mode::Queue => emit(&process.queue()?)?,
        Mode::Complete => emit(&process.complete()?)?,
        Mode::Inputs => emit(&process.inputs()?)?,
        Mode::Outputs => emit(&process.outputs()?)?,
        Mode::Query(path) => emit(&process.query(&path)?.tags)?,
    }
    Ok(())
}

/// The job and, when it came from a file, that file's path.
fn load_job(spec: &str, config: &GolemConfig) -> anyhow::Result<(Arc<Job>, Option<PathBuf>)> {
    let mut registry = JobRegistry::new(config.sources.clone());
    let path = Path::new(spec);
    if path.is_file() {
        let job = registry
            .load_path(path)
            .with_context(|| format!("loading {}", path.display()))?;
        return Ok((job, Some(path.to_path_buf())));
    }
    let located = registry.locate(spec, None);
    let job = registry.load(spec)?;
    Ok((job, located))
}

/// The main view from the window and selection switches.
fn build_view(cli: &Cli, job: Arc<Job>, now: chrono::NaiveDateTime) -> anyhow::Result<View> {
    let interval = job.interval();
    let horizon = job.cadence.horizon_bin(now);
    let last = match (cli.last_date, cli.last_interval) {
        (Some(date), _) => date,
        (None, Some(n)) => horizon - interval * n as i32,
        (None, None) => horizon,
    };
    let first = match (cli.first_date, cli.intervals) {
        (Some(date), _) => date,
        (None, Some(0)) => {
            return Err(GolemError::Parameter("--intervals must be at least 1".into()).into())
        }
        (None, Some(n)) => job.cadence.date_bin(last) - interval * (n as i32 - 1),
        (None, None) => last,
    };
    let mut view = View::new(job, first, last, now)?;
    for (name, values) in &cli.select {
        view = view.select(name, values)?;
    }
    Ok(view)
}

/// Hand each iteration to the host: one JSON tag line on `out`, then block
/// until the host answers one line on `host`. The iteration is finalized only
/// after that answer. An empty line or `ok` continues; any other answer aborts
/// the run with that text, and end of input aborts it too.
fn drive<R: BufRead, W: Write>(process: &GolemProcess, mut host: R, mut out: W) -> anyhow::Result<RunSummary> {
    let mut answer = String::new();
    let summary = process.run(|iteration| {
        writeln!(out, "{}", serde_json::to_string(&iteration.tags)?)?;
        out.flush()?;
        answer.clear();
        if host.read_line(&mut answer)? == 0 {
            return Err(GolemError::User {
                context: iteration.label(),
                message: "host closed its input before answering".to_string(),
            });
        }
        match answer.trim() {
            "" | "ok" => Ok(()),
            reason => Err(GolemError::User {
                context: iteration.label(),
                message: reason.to_string(),
            }),
        }
    })?;
    Ok(summary)
}

fn emit<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
