use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{GolemError, Result};

pub const ENV_PREFIX: &str = "GOLEM_";
pub const CONFIG_ENV: &str = "GOLEM_CONFIG";

/// Process-wide settings (golem.toml + GOLEM_* env overrides).
///
/// Everything here is a default for the host; command-line switches win.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GolemConfig {
    /// Repository root all outputs resolve below.
    #[serde(default)]
    pub repository: Option<PathBuf>,
    /// Default script home. Falls back to the job definition's directory.
    #[serde(default)]
    pub home: Option<PathBuf>,
    /// Search path for job definitions referenced by name.
    /// `GOLEM_SOURCES` supplies it colon-separated.
    #[serde(default, deserialize_with = "deserialize_sources")]
    pub sources: Vec<PathBuf>,
    #[serde(default)]
    pub skip_incomplete: bool,
    #[serde(default)]
    pub skip_partial: bool,
    #[serde(default)]
    pub overwrite: bool,
    /// Treat zero-byte outputs as present instead of removing them.
    #[serde(default)]
    pub keep_empty_outputs: bool,
    /// Create missing output directories before an iteration runs.
    #[serde(default = "bool_true")]
    pub create_dirs: bool,
}

impl Default for GolemConfig {
    fn default() -> Self {
        Self {
            repository: None,
            home: None,
            sources: Vec::new(),
            skip_incomplete: false,
            skip_partial: false,
            overwrite: false,
            keep_empty_outputs: false,
            create_dirs: true,
        }
    }
}

fn bool_true() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SourcesRepr {
    Joined(String),
    List(Vec<PathBuf>),
}

fn deserialize_sources<'de, D>(deserializer: D) -> std::result::Result<Vec<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match SourcesRepr::deserialize(deserializer)? {
        SourcesRepr::Joined(s) => split_search_path(&s),
        SourcesRepr::List(list) => list,
    })
}

/// Split a colon-separated search path, dropping empty entries.
pub fn split_search_path(s: &str) -> Vec<PathBuf> {
    s.split(':')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .collect()
}

impl GolemConfig {
    /// Load config from a TOML file with GOLEM_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. `GOLEM_CONFIG`
    ///   3. ~/.golem/golem.toml
    ///
    /// A missing file is not an error; the env layer and defaults still apply.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let path = config_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .unwrap_or_else(default_config_path);

        let config: GolemConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]))
            .extract()
            .map_err(|e| GolemError::Config(e.to_string()))?;

        tracing::debug!(path = %path.display(), sources = config.sources.len(), "configuration loaded");
        Ok(config)
    }

    /// Script home: explicit config, else the directory holding `script`.
    pub fn home_for(&self, script: &Path) -> PathBuf {
        if let Some(home) = &self.home {
            return home.clone();
        }
        script
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(format!("{}/.golem/golem.toml", home))
}
