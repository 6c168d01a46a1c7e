//! User settings (`config.toml` in the BDK home directory).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level `config.toml` contents. Every field has a default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub tools: ToolSettings,
    #[serde(default)]
    pub build: BuildSettings,
}

/// External programs driven by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSettings {
    /// Package extraction tool (path or name on `PATH`).
    #[serde(default = "default_exporter")]
    pub exporter: String,
    /// Asset compiler (path or name on `PATH`).
    #[serde(default = "default_builder")]
    pub builder: String,
    /// Script handed to the asset compiler.
    #[serde(default = "default_build_script")]
    pub build_script: PathBuf,
    /// Tool that prints a package's dependency names, one per line.
    #[serde(default = "default_dependency_reader")]
    pub dependency_reader: String,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            exporter: default_exporter(),
            builder: default_builder(),
            build_script: default_build_script(),
            dependency_reader: default_dependency_reader(),
        }
    }
}

fn default_exporter() -> String {
    "umodel".to_owned()
}

fn default_builder() -> String {
    "blender".to_owned()
}

fn default_build_script() -> PathBuf {
    PathBuf::from("build_package.py")
}

fn default_dependency_reader() -> String {
    "bdk-deps".to_owned()
}

/// Pipeline tuning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSettings {
    /// Worker count per batch; `0` means one per available CPU.
    #[serde(default)]
    pub jobs: usize,
    /// Default cache directory for new repositories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_directory: Option<PathBuf>,
}

impl Settings {
    /// Read settings from `path`. A missing file yields defaults.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or is invalid TOML.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::ParseToml {
            path: path.display().to_string(),
            source,
        })
    }

    /// Apply `BDK_EXPORTER`, `BDK_BUILDER`, and `BDK_DEPENDENCY_READER`.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("BDK_EXPORTER") {
            self.tools.exporter = v;
        }
        if let Some(v) = lookup("BDK_BUILDER") {
            self.tools.builder = v;
        }
        if let Some(v) = lookup("BDK_DEPENDENCY_READER") {
            self.tools.dependency_reader = v;
        }
        self
    }

    /// Worker count to use, resolving `0` to the available parallelism.
    pub fn effective_jobs(&self) -> usize {
        effective_jobs(self.build.jobs)
    }

    /// The cache directory for new repositories, defaulting to `<home>/cache`.
    pub fn cache_directory(&self, home: &Path) -> PathBuf {
        self.build
            .cache_directory
            .clone()
            .unwrap_or_else(|| home.join("cache"))
    }
}

/// Resolve a requested worker count; `0` becomes the available parallelism.
pub fn effective_jobs(requested: usize) -> usize {
    if requested > 0 {
        return requested;
    }
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}
