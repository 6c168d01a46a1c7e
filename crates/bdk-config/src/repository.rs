//! Repository description: game location, cache location, and package rules.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::package::Package;

/// What a rule does to the packages it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Include,
    Exclude,
    SetAssetDirectory,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Include => "include",
            Self::Exclude => "exclude",
            Self::SetAssetDirectory => "set-asset-directory",
        };
        f.write_str(label)
    }
}

impl FromStr for RuleKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "include" => Ok(Self::Include),
            "exclude" => Ok(Self::Exclude),
            "set-asset-directory" => Ok(Self::SetAssetDirectory),
            other => Err(ConfigError::InvalidRule {
                message: format!(
                    "unknown rule type `{other}` — expected include, exclude, or set-asset-directory"
                ),
            }),
        }
    }
}

/// A glob directive evaluated against package paths. Order matters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(rename = "type")]
    pub kind: RuleKind,
    /// Glob matched against the package file name, then its path.
    pub pattern: String,
    /// Only meaningful for [`RuleKind::SetAssetDirectory`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_directory: Option<String>,
    /// Muted rules are skipped during evaluation.
    #[serde(default)]
    pub mute: bool,
}

impl Rule {
    pub fn include(pattern: &str) -> Self {
        Self::new(RuleKind::Include, pattern, None)
    }

    pub fn exclude(pattern: &str) -> Self {
        Self::new(RuleKind::Exclude, pattern, None)
    }

    pub fn set_asset_directory(pattern: &str, asset_directory: &str) -> Self {
        Self::new(
            RuleKind::SetAssetDirectory,
            pattern,
            Some(asset_directory.to_owned()),
        )
    }

    fn new(kind: RuleKind, pattern: &str, asset_directory: Option<String>) -> Self {
        Self {
            kind,
            pattern: pattern.to_owned(),
            asset_directory,
            mute: false,
        }
    }

    /// Check that the rule is usable.
    ///
    /// # Errors
    /// Returns an error if the pattern is empty or a `SetAssetDirectory` rule
    /// has no directory.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pattern.trim().is_empty() {
            return Err(ConfigError::InvalidRule {
                message: "pattern must not be empty".to_owned(),
            });
        }
        if self.kind == RuleKind::SetAssetDirectory
            && self.asset_directory.as_deref().map_or(true, str::is_empty)
        {
            return Err(ConfigError::InvalidRule {
                message: "set-asset-directory rules need an asset directory".to_owned(),
            });
        }
        Ok(())
    }
}

/// One asset repository: a game installation plus its build cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Stable identifier; also the cache subdirectory name.
    pub id: String,
    pub name: String,
    pub game_directory: PathBuf,
    /// Optional mod subdirectory of the game directory.
    #[serde(rename = "mod", default, skip_serializing_if = "Option::is_none")]
    pub mod_name: Option<String>,
    pub cache_directory: PathBuf,
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Result of the latest scan. Never persisted.
    #[serde(skip)]
    pub packages: Vec<Package>,
}

impl Repository {
    pub fn new(
        id: &str,
        name: &str,
        game_directory: &Path,
        mod_name: Option<&str>,
        cache_directory: &Path,
    ) -> Self {
        Self {
            id: id.to_owned(),
            name: name.to_owned(),
            game_directory: game_directory.to_path_buf(),
            mod_name: mod_name.map(str::to_owned),
            cache_directory: cache_directory.to_path_buf(),
            rules: Vec::new(),
            packages: Vec::new(),
        }
    }

    /// `<cache_directory>/<id>`: everything this repository owns on disk.
    pub fn cache_root(&self) -> PathBuf {
        self.cache_directory.join(&self.id)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.cache_root().join("manifest.json")
    }

    pub fn exports_directory(&self) -> PathBuf {
        self.cache_root().join("exports")
    }

    pub fn assets_directory(&self) -> PathBuf {
        self.cache_root().join("assets")
    }

    /// Where the build step writes assets for `package`.
    ///
    /// A relative `SetAssetDirectory` override is resolved against the
    /// default assets directory.
    pub fn asset_output_directory(&self, package: &Package) -> PathBuf {
        match package.asset_directory.as_deref() {
            Some(dir) if Path::new(dir).is_absolute() => PathBuf::from(dir),
            Some(dir) => self.assets_directory().join(dir),
            None => self.assets_directory(),
        }
    }

    /// Absolute path of a package file.
    pub fn package_file(&self, package: &Package) -> PathBuf {
        self.game_directory.join(&package.path)
    }

    /// Read a standalone repository document.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not a valid repository document.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::ParseJson {
            path: path.display().to_string(),
            source,
        })
    }

    /// Write this repository as a standalone document that can be linked elsewhere.
    ///
    /// # Errors
    /// Returns an error if serialization fails or the file cannot be written.
    pub fn write_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialize {
                what: "repository",
                message: e.to_string(),
            })?;
        bdk_util::fs::write_atomic(path, content.as_bytes())?;
        Ok(())
    }

    /// Append a rule after validating it.
    ///
    /// # Errors
    /// Returns an error if the rule is invalid.
    pub fn add_rule(&mut self, rule: Rule) -> Result<(), ConfigError> {
        rule.validate()?;
        self.rules.push(rule);
        Ok(())
    }

    /// Remove and return the rule at `index`.
    ///
    /// # Errors
    /// Returns an error if `index` is out of range.
    pub fn remove_rule(&mut self, index: usize) -> Result<Rule, ConfigError> {
        self.check_rule_index(index)?;
        Ok(self.rules.remove(index))
    }

    /// Move the rule at `from` so that it ends up at `to`.
    ///
    /// # Errors
    /// Returns an error if either index is out of range.
    pub fn move_rule(&mut self, from: usize, to: usize) -> Result<(), ConfigError> {
        self.check_rule_index(from)?;
        self.check_rule_index(to)?;
        let rule = self.rules.remove(from);
        self.rules.insert(to, rule);
        Ok(())
    }

    /// Mute or unmute the rule at `index`.
    ///
    /// # Errors
    /// Returns an error if `index` is out of range.
    pub fn set_rule_muted(&mut self, index: usize, mute: bool) -> Result<(), ConfigError> {
        let len = self.rules.len();
        let rule = self
            .rules
            .get_mut(index)
            .ok_or(ConfigError::RuleIndex { index, len })?;
        rule.mute = mute;
        Ok(())
    }

    fn check_rule_index(&self, index: usize) -> Result<(), ConfigError> {
        if index < self.rules.len() {
            Ok(())
        } else {
            Err(ConfigError::RuleIndex {
                index,
                len: self.rules.len(),
            })
        }
    }
}
