use std::path::PathBuf;

use chrono::NaiveDateTime;
use clap::{ArgGroup, Parser};
use golem_scheduler::parse_instant;

/// Golem - run a periodic analysis job over a window of time bins
#[derive(Parser, Debug)]
#[command(name = "golem")]
#[command(version)]
#[command(about = "Schedule periodic analysis jobs over a file repository", long_about = None)]
#[command(group(
    ArgGroup::new("mode")
        .args([
            "data_process",
            "data_purge",
            "data_status",
            "data_queue",
            "data_complete",
            "data_inputs",
            "data_outputs",
            "output_path",
        ])
        .multiple(false)
))]
pub struct Cli {
    /// Job definition: a path to a TOML file, or a job name on the search path
    #[arg(long = "job")]
    pub job: String,

    /// Configuration file (default: $GOLEM_CONFIG, then ~/.golem/golem.toml)
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Repository root; overrides the configured one
    #[arg(long = "repository")]
    pub repository: Option<PathBuf>,

    /// First date of the window
    #[arg(long = "first-date", value_parser = parse_instant, conflicts_with = "intervals")]
    pub first_date: Option<NaiveDateTime>,

    /// Last date of the window (default: the most recent finished bin)
    #[arg(long = "last-date", value_parser = parse_instant, conflicts_with = "last_interval")]
    pub last_date: Option<NaiveDateTime>,

    /// Number of bins in the window, counted back from the last date
    #[arg(long = "intervals", value_name = "N")]
    pub intervals: Option<u32>,

    /// End the window N bins before the horizon
    #[arg(long = "last-interval", value_name = "N")]
    pub last_interval: Option<u32>,

    /// Restrict a loop: LOOP=V1,V2 (repeatable). A loop's group name selects group labels
    #[arg(long = "select", value_name = "LOOP=VALUES", value_parser = parse_select)]
    pub select: Vec<(String, Vec<String>)>,

    /// Pretend the current time is this instant
    #[arg(long = "now", value_parser = parse_instant, hide = true)]
    pub now: Option<NaiveDateTime>,

    /// Skip iterations whose required inputs are missing
    #[arg(long = "skip-incomplete")]
    pub skip_incomplete: bool,

    /// Skip iterations whose outputs are partly present
    #[arg(long = "skip-partial")]
    pub skip_partial: bool,

    /// Remove existing outputs before an iteration runs
    #[arg(long = "overwrite")]
    pub overwrite: bool,

    /// Keep zero-byte outputs instead of removing them
    #[arg(long = "keep-empty-outputs")]
    pub keep_empty_outputs: bool,

    /// Run the job: print one JSON tag dictionary per iteration and wait for
    /// the host to answer `ok` on stdin before finalizing it
    #[arg(long = "data-process", visible_alias = "data-load")]
    pub data_process: bool,

    /// Remove the outputs of every iteration
    #[arg(long = "data-purge")]
    pub data_purge: bool,

    /// Audit the outputs of every iteration (default)
    #[arg(long = "data-status")]
    pub data_status: bool,

    /// List iterations that would run
    #[arg(long = "data-queue")]
    pub data_queue: bool,

    /// List iterations whose outputs are complete
    #[arg(long = "data-complete")]
    pub data_complete: bool,

    /// List resolved input paths
    #[arg(long = "data-inputs")]
    pub data_inputs: bool,

    /// List resolved output paths
    #[arg(long = "data-outputs")]
    pub data_outputs: bool,

    /// Restrict outputs by name (comma-separated)
    #[arg(long = "output-select", value_delimiter = ',')]
    pub output_select: Vec<String>,

    /// Query mode: bind the selected output to this path and print its tags
    #[arg(long = "output-path")]
    pub output_path: Option<String>,
}

/// What the invocation does, from the mutually exclusive mode switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Process,
    Purge,
    Status,
    Queue,
    Complete,
    Inputs,
    Outputs,
    Query(String),
}

impl Cli {
    pub fn mode(&self) -> Mode {
        if let Some(path) = &self.output_path {
            return Mode::Query(path.clone());
        }
        [
            (self.data_process, Mode::Process),
            (self.data_purge, Mode::Purge),
            (self.data_queue, Mode::Queue),
            (self.data_complete, Mode::Complete),
            (self.data_inputs, Mode::Inputs),
            (self.data_outputs, Mode::Outputs),
        ]
        .into_iter()
        .find_map(|(on, mode)| on.then_some(mode))
        .unwrap_or(Mode::Status)
    }
}

/// `LOOP=V1,V2` into the loop name and its values.
fn parse_select(s: &str) -> Result<(String, Vec<String>), String> {
    let (name, values) = s
        .split_once('=')
        .ok_or_else(|| format!("expected LOOP=VALUES, got '{s}'"))?;
    let values: Vec<String> = values
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect();
    if name.trim().is_empty() || values.is_empty() {
        return Err(format!("expected LOOP=VALUES, got '{s}'"));
    }
    Ok((name.trim().to_string(), values))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("golem").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_to_status() {
        let cli = parse(&["--job", "daily"]).unwrap();
        assert_eq!(cli.mode(), Mode::Status);
        assert!(cli.select.is_empty());
    }

    #[test]
    fn parses_window_and_selection() {
        let cli = parse(&[
            "--job",
            "daily",
            "--last-date",
            "2024-02-18",
            "--intervals",
            "7",
            "--select",
            "sensor=LAB0,LAB1",
            "--select",
            "proto=tcp",
            "--data-load",
        ])
        .unwrap();
        assert_eq!(cli.intervals, Some(7));
        assert_eq!(cli.last_date.unwrap().to_string(), "2024-02-18 00:00:00");
        assert_eq!(
            cli.select,
            vec![
                ("sensor".to_string(), vec!["LAB0".to_string(), "LAB1".to_string()]),
                ("proto".to_string(), vec!["tcp".to_string()]),
            ]
        );
        assert_eq!(cli.mode(), Mode::Process);
    }

    #[test]
    fn rejects_conflicting_switches() {
        assert!(parse(&["--job", "j", "--first-date", "2024-02-12", "--intervals", "3"]).is_err());
        assert!(parse(&["--job", "j", "--data-status", "--data-purge"]).is_err());
        assert!(parse(&["--job", "j", "--select", "sensor"]).is_err());
        assert!(parse(&["--job", "j", "--first-date", "yesterday"]).is_err());
    }

    #[test]
    fn output_select_and_query() {
        let cli = parse(&["--job", "j", "--output-select", "a,b", "--output-path", "/tmp/x"]).unwrap();
        assert_eq!(cli.output_select, vec!["a", "b"]);
        assert_eq!(cli.mode(), Mode::Query("/tmp/x".into()));
    }
}
