//! The local filesystem repository that jobs read from and write to.

use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use golem_core::{ArgList, GolemError, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::glob;

/// What the filesystem holds at one resolved path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "size", rename_all = "snake_case")]
pub enum Presence {
    Missing,
    /// Exists with zero bytes. Distinct from missing, but not complete.
    Empty,
    Present(u64),
}

impl Presence {
    pub fn of(path: &Path) -> Self {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() == 0 => Presence::Empty,
            Ok(meta) => Presence::Present(meta.len()),
            Err(_) => Presence::Missing,
        }
    }

    /// Combined status of several files matched by one template.
    pub fn aggregate<I: IntoIterator<Item = Presence>>(items: I) -> Self {
        let mut out = Presence::Missing;
        for item in items {
            out = match (out, item) {
                (Presence::Present(a), Presence::Present(b)) => Presence::Present(a + b),
                (Presence::Present(a), _) | (_, Presence::Present(a)) => Presence::Present(a),
                (Presence::Empty, _) | (_, Presence::Empty) => Presence::Empty,
                _ => Presence::Missing,
            };
        }
        out
    }

    pub fn exists(self) -> bool {
        !matches!(self, Presence::Missing)
    }

    pub fn is_complete(self) -> bool {
        matches!(self, Presence::Present(_))
    }

    pub fn size(self) -> Option<u64> {
        match self {
            Presence::Missing => None,
            Presence::Empty => Some(0),
            Presence::Present(n) => Some(n),
        }
    }
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Presence::Missing => write!(f, "missing"),
            Presence::Empty => write!(f, "empty"),
            Presence::Present(n) => write!(f, "{n} bytes"),
        }
    }
}

/// One audited path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Audit {
    pub path: PathBuf,
    pub presence: Presence,
}

/// One output template, audited as a whole: a wildcard that matched several
/// files reports their aggregate presence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputAudit {
    pub name: String,
    pub paths: Vec<PathBuf>,
    pub presence: Presence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareOptions {
    /// Unlink existing outputs so the iteration rewrites them.
    pub overwrite: bool,
    /// Unlink existing zero-byte outputs.
    pub zap_empty: bool,
    /// Create missing parent directories.
    pub create: bool,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            zap_empty: true,
            create: true,
        }
    }
}

/// `(job key, label)`.
type CacheKey = (String, String);

/// A repository rooted at an existing directory.
///
/// Audits are cached per `(job, label)` until cleared; lifecycle
/// operations evict their own entries.
#[derive(Debug)]
pub struct Repository {
    root: PathBuf,
    audits: Mutex<HashMap<CacheKey, Vec<OutputAudit>>>,
    created: Mutex<HashMap<CacheKey, Vec<PathBuf>>>,
}

impl Repository {
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let meta = std::fs::metadata(root).map_err(|_| {
            GolemError::Repository(format!("repository {} does not exist", root.display()))
        })?;
        if !meta.is_dir() {
            return Err(GolemError::Repository(format!(
                "repository {} is not a directory",
                root.display()
            )));
        }
        let root = root.canonicalize()?;
        debug!(root = %root.display(), "repository opened");
        Ok(Self {
            root,
            audits: Mutex::new(HashMap::new()),
            created: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for a rendered output template. Outputs must stay
    /// inside the repository.
    pub fn resolve_output(&self, rendered: &str) -> Result<PathBuf> {
        let path = normalize(&self.root.join(rendered));
        if !path.starts_with(&self.root) || path == self.root {
            return Err(GolemError::Repository(format!(
                "output path {rendered} escapes repository {}",
                self.root.display()
            )));
        }
        Ok(path)
    }

    /// Absolute path for a rendered input template; inputs may live anywhere.
    pub fn resolve_input(&self, rendered: &str) -> PathBuf {
        normalize(&self.root.join(rendered))
    }

    pub fn relative<'a>(&self, path: &'a Path) -> Option<&'a Path> {
        path.strip_prefix(&self.root).ok()
    }

    /// Existing matches of a wildcard path, or the path itself when nothing
    /// matches.
    pub fn expand(&self, path: &Path) -> Vec<PathBuf> {
        let found = glob::expand(path);
        if found.is_empty() {
            vec![path.to_path_buf()]
        } else {
            found
        }
    }

    /// Status of each named output, cached under `(job, label)`. Every
    /// output is given as the paths its template resolved to.
    pub fn audit(&self, job: &str, label: &str, outputs: &[(String, Vec<PathBuf>)]) -> Vec<OutputAudit> {
        let key = (job.to_string(), label.to_string());
        if let Some(hit) = lock(&self.audits).get(&key) {
            return hit.clone();
        }
        let audits: Vec<OutputAudit> = outputs
            .iter()
            .map(|(name, paths)| OutputAudit {
                name: name.clone(),
                paths: paths.clone(),
                presence: Presence::aggregate(paths.iter().map(|p| Presence::of(p))),
            })
            .collect();
        lock(&self.audits).insert(key, audits.clone());
        audits
    }

    /// Drop cached audits of `job`: one label, or all of them.
    pub fn clear_audit_cache(&self, job: &str, label: Option<&str>) {
        lock(&self.audits).retain(|(j, l), _| !(j == job && label.map_or(true, |label| label == l)));
    }

    /// Get the outputs of one iteration ready to be written and partition
    /// them into `(present, absent)`.
    pub fn prepare_output(
        &self,
        job: &str,
        label: &str,
        paths: &[PathBuf],
        opts: PrepareOptions,
    ) -> Result<(ArgList, ArgList)> {
        let key = (job.to_string(), label.to_string());
        let mut created = Vec::new();
        for path in paths {
            if opts.create {
                if let Some(parent) = path.parent() {
                    created.extend(self.create_dirs(parent)?);
                }
            }
            match Presence::of(path) {
                Presence::Present(_) if opts.overwrite => {
                    info!(path = %path.display(), "removing output for overwrite");
                    std::fs::remove_file(path)?;
                }
                Presence::Empty if opts.overwrite || opts.zap_empty => {
                    debug!(path = %path.display(), "removing empty output");
                    std::fs::remove_file(path)?;
                }
                _ => {}
            }
        }
        if !created.is_empty() {
            lock(&self.created).entry(key.clone()).or_default().extend(created);
        }
        lock(&self.audits).remove(&key);

        let mut present = ArgList::new();
        let mut absent = ArgList::new();
        for path in paths {
            let text = path.to_string_lossy().into_owned();
            if Presence::of(path).exists() {
                present.push(text);
            } else {
                absent.push(text);
            }
        }
        Ok((present, absent))
    }

    /// Close one iteration: drop outputs left empty when `zap_empty`, prune
    /// directories `prepare_output` created that are empty again, and evict
    /// the cached audit.
    pub fn finalize_output(&self, job: &str, label: &str, paths: &[PathBuf], zap_empty: bool) -> Result<()> {
        let key = (job.to_string(), label.to_string());
        if zap_empty {
            for path in paths {
                if Presence::of(path) == Presence::Empty {
                    debug!(path = %path.display(), "removing empty output");
                    std::fs::remove_file(path)?;
                }
            }
        }
        let mut dirs = lock(&self.created).remove(&key).unwrap_or_default();
        // Deepest first.
        dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
        for dir in dirs {
            if is_empty_dir(&dir) {
                std::fs::remove_dir(&dir)?;
            }
        }
        lock(&self.audits).remove(&key);
        Ok(())
    }

    /// Unlink every path and any parent directory left empty, stopping at
    /// the repository root. Returns the files removed.
    pub fn purge_output(&self, job: &str, label: &str, paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        for path in paths {
            if !path.starts_with(&self.root) {
                warn!(path = %path.display(), "refusing to purge path outside repository");
                continue;
            }
            if path.is_file() {
                std::fs::remove_file(path)?;
                removed.push(path.clone());
            }
            let mut dir = path.parent();
            while let Some(d) = dir {
                if d == self.root || !d.starts_with(&self.root) || !is_empty_dir(d) {
                    break;
                }
                std::fs::remove_dir(d)?;
                dir = d.parent();
            }
        }
        lock(&self.audits).remove(&(job.to_string(), label.to_string()));
        if !removed.is_empty() {
            info!(job, label, files = removed.len(), "outputs purged");
        }
        Ok(removed)
    }

    /// Create `dir` and its missing ancestors, returning those created.
    fn create_dirs(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut missing = Vec::new();
        let mut cursor = Some(dir);
        while let Some(d) = cursor {
            if d.exists() {
                break;
            }
            missing.push(d.to_path_buf());
            cursor = d.parent();
        }
        if !missing.is_empty() {
            std::fs::create_dir_all(dir)?;
        }
        Ok(missing)
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn is_empty_dir(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

/// Resolve `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
