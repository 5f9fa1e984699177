//! Locates and builds jobs by name.
//!
//! A job named `flows` lives in `flows.toml`. Upstream references are
//! searched in the referring job's directory first, then in each source
//! directory in order; the first match wins. Built jobs are cached so a
//! shared upstream is built once per registry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use golem_core::{GolemError, Result};
use tracing::debug;

use crate::definition::JobDefinition;
use crate::job::Job;

#[derive(Debug, Default)]
pub struct JobRegistry {
    sources: Vec<PathBuf>,
    cache: HashMap<PathBuf, Arc<Job>>,
}

impl JobRegistry {
    pub fn new(sources: Vec<PathBuf>) -> Self {
        Self {
            sources,
            cache: HashMap::new(),
        }
    }

    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Find `<name>.toml`, checking `near` before the source directories.
    pub fn locate(&self, name: &str, near: Option<&Path>) -> Option<PathBuf> {
        let file = format!("{name}.toml");
        near.into_iter()
            .chain(self.sources.iter().map(PathBuf::as_path))
            .map(|dir| dir.join(&file))
            .find(|p| p.is_file())
    }

    /// Build the job named `name` found on the search path.
    pub fn load(&mut self, name: &str) -> Result<Arc<Job>> {
        let path = self
            .locate(name, None)
            .ok_or_else(|| GolemError::Config(format!("unknown job '{name}'")))?;
        self.load_path(&path)
    }

    /// Build the job defined at `path`, and every upstream it names.
    pub fn load_path(&mut self, path: &Path) -> Result<Arc<Job>> {
        let mut stack = Vec::new();
        self.build(path, &mut stack)
    }

    fn build(&mut self, path: &Path, stack: &mut Vec<PathBuf>) -> Result<Arc<Job>> {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if let Some(job) = self.cache.get(&key) {
            return Ok(job.clone());
        }
        if stack.contains(&key) {
            let chain: Vec<String> = stack
                .iter()
                .chain(std::iter::once(&key))
                .map(|p| stem(p))
                .collect();
            return Err(GolemError::Config(format!(
                "job reference cycle: {}",
                chain.join(" -> ")
            )));
        }

        let definition = JobDefinition::from_file(&key)?;
        let dir = key.parent().map(Path::to_path_buf);
        let mut upstream = HashMap::new();
        stack.push(key.clone());
        for name in definition.upstream_names() {
            if upstream.contains_key(name) {
                continue;
            }
            let path = self
                .locate(name, dir.as_deref())
                .ok_or_else(|| {
                    GolemError::Config(format!(
                        "unknown job '{name}' referenced from {}",
                        key.display()
                    ))
                })?;
            let job = self.build(&path, stack)?;
            upstream.insert(name.to_string(), job);
        }
        stack.pop();

        let job = definition
            .into_builder(&stem(&key), |name| {
                upstream
                    .get(name)
                    .cloned()
                    .ok_or_else(|| GolemError::Config(format!("unknown job '{name}'")))
            })?
            .build()?;
        debug!(job = %job.name, path = %key.display(), "job loaded");
        self.cache.insert(key, job.clone());
        Ok(job)
    }
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(format!("{name}.toml"));
        std::fs::write(&path, body).unwrap();
        path
    }

    const DAILY: &str = r#"
        interval = "1d"
        [[outputs]]
        name = "flows"
        template = "daily/%(golem_bin_iso)s.rw"
    "#;

    const WEEKLY: &str = r#"
        interval = "1w"
        [[golem_inputs]]
        job = "daily"
        cover = true
        [[outputs]]
        name = "summary"
        template = "weekly/%(golem_bin_iso)s.txt"
    "#;

    #[test]
    fn loads_upstream_from_sibling_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "daily", DAILY);
        let weekly = write(dir.path(), "weekly", WEEKLY);

        let mut registry = JobRegistry::default();
        let job = registry.load_path(&weekly).unwrap();
        assert_eq!(job.name, "weekly");
        assert_eq!(job.golem_inputs[0].job.name, "daily");
    }

    #[test]
    fn falls_back_to_sources() {
        let jobs = tempfile::tempdir().unwrap();
        let shared = tempfile::tempdir().unwrap();
        write(shared.path(), "daily", DAILY);
        let weekly = write(jobs.path(), "weekly", WEEKLY);

        let mut registry = JobRegistry::new(vec![shared.path().to_path_buf()]);
        assert!(registry.load_path(&weekly).is_ok());
        assert!(registry.load("daily").is_ok());
        assert!(registry.load("monthly").is_err());
    }

    #[test]
    fn shared_upstream_is_built_once() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "daily", DAILY);
        let weekly = write(dir.path(), "weekly", WEEKLY);

        let mut registry = JobRegistry::new(vec![dir.path().to_path_buf()]);
        let daily = registry.load("daily").unwrap();
        let weekly = registry.load_path(&weekly).unwrap();
        assert!(Arc::ptr_eq(&daily, &weekly.golem_inputs[0].job));
    }

    #[test]
    fn reference_cycles_fail() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(
            dir.path(),
            "a",
            "interval = 60\n[[golem_inputs]]\njob = \"b\"\n",
        );
        write(
            dir.path(),
            "b",
            "interval = 60\n[[golem_inputs]]\njob = \"a\"\n",
        );
        let err = JobRegistry::default().load_path(&a).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }
}
