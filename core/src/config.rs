//! Run configuration.
//!
//! Values come from an optional TOML file (`nearmatch.toml`) and are then
//! overridden by command-line tokens:
//!
//! ```toml
//! reference_root = "facereal"
//! candidate_root = "outputs/txt2img-images"
//! concurrency = 8
//! cap = 50000
//! timeout_ms = 30000
//! models = ["combined", "ahash"]
//! backends = ["image"]
//! average = "references"
//! selection = { max_distance = 0.5 }
//! ```

use crate::accumulator::AverageBase;
use crate::enumerator::default_extensions;
use crate::oracle::{Backend, Metric};
use crate::pool::DEFAULT_CONCURRENCY;
use crate::scorer::DEFAULT_COMPARISON_CAP;
use crate::selection::SelectionPolicy;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "nearmatch.toml";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Directory holding the trusted reference images.
    pub reference_root: PathBuf,
    /// Directory holding the candidate corpus to rank.
    pub candidate_root: Option<PathBuf>,
    /// Parent of the per-tag output directories; defaults to `<candidate_root>-best`.
    pub output_root: Option<PathBuf>,
    pub concurrency: usize,
    /// Accepted observations per reference before scoring stops early.
    pub cap: usize,
    /// Per oracle call limit in milliseconds, 0 disables it.
    pub timeout_ms: u64,
    pub extensions: Vec<String>,
    pub models: Vec<String>,
    pub backends: Vec<String>,
    pub selection: SelectionPolicy,
    pub average: AverageBase,
    /// Write `ranking.json` next to the copied files.
    pub manifest: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            reference_root: PathBuf::from("facereal"),
            candidate_root: None,
            output_root: None,
            concurrency: DEFAULT_CONCURRENCY,
            cap: DEFAULT_COMPARISON_CAP,
            timeout_ms: 30_000,
            extensions: default_extensions(),
            models: vec![String::from("combined")],
            backends: vec![String::from("image")],
            selection: SelectionPolicy::default(),
            average: AverageBase::default(),
            manifest: true,
        }
    }
}

impl RunConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            source,
            path: path.to_path_buf(),
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            source,
            path: path.to_path_buf(),
        })
    }

    /// Load from the working directory, then the user config directory,
    /// falling back to defaults when neither file exists.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Self::load(&local);
        }
        if let Some(path) = default_config_path().filter(|path| path.exists()) {
            return Self::load(&path);
        }
        Ok(Self::default())
    }

    pub fn candidate_root(&self) -> Result<&Path, ConfigError> {
        self.candidate_root
            .as_deref()
            .ok_or(ConfigError::MissingCandidateRoot)
    }

    pub fn output_root(&self) -> Result<PathBuf, ConfigError> {
        if let Some(root) = &self.output_root {
            return Ok(root.clone());
        }
        let candidate_root = self.candidate_root()?;
        let name = candidate_root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("candidates"));
        let parent = candidate_root.parent().unwrap_or_else(|| Path::new(""));
        Ok(parent.join(format!("{}-best", name)))
    }

    pub fn oracle_timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    /// Every backend/model pair to run, backend-major.
    pub fn combinations(&self) -> Vec<(String, String)> {
        self.backends
            .iter()
            .flat_map(|backend| {
                self.models
                    .iter()
                    .map(move |model| (backend.clone(), model.clone()))
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.candidate_root()?;
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid(String::from(
                "concurrency must be at least 1",
            )));
        }
        if self.cap == 0 {
            return Err(ConfigError::Invalid(String::from("cap must be at least 1")));
        }
        if self.extensions.is_empty() {
            return Err(ConfigError::Invalid(String::from(
                "at least one image extension is required",
            )));
        }
        if self.models.is_empty() || self.backends.is_empty() {
            return Err(ConfigError::Invalid(String::from(
                "at least one model and one backend tag are required",
            )));
        }
        for model in &self.models {
            Metric::from_tag(model).map_err(|error| ConfigError::Invalid(error.to_string()))?;
        }
        for backend in &self.backends {
            Backend::from_tag(backend).map_err(|error| ConfigError::Invalid(error.to_string()))?;
        }
        match self.selection {
            SelectionPolicy::TopN(0) => Err(ConfigError::Invalid(String::from(
                "top_n must be at least 1",
            ))),
            SelectionPolicy::Threshold(max) if !(max.is_finite() && max >= 0.0) => {
                Err(ConfigError::Invalid(format!(
                    "max_distance must be a non-negative number, got {}",
                    max
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Location of the per-user configuration file.
pub fn default_config_path() -> Option<PathBuf> {
    let mut dir = dirs::config_dir()?;
    dir.push("nearmatch");
    dir.push(DEFAULT_CONFIG_FILE);
    Some(dir)
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    Parse {
        source: toml::de::Error,
        path: PathBuf,
    },
    MissingCandidateRoot,
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { source, path } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            Self::Parse { source, path } => {
                write!(f, "invalid config TOML in {}: {}", path.display(), source)
            }
            Self::MissingCandidateRoot => write!(f, "candidate root directory is required"),
            Self::Invalid(message) => write!(f, "invalid configuration: {}", message),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            _ => None,
        }
    }
}
