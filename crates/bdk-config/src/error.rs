//! Error types for bdk-config.

/// Errors produced while reading, validating, or writing persisted state.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A file could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    /// A JSON document is malformed.
    #[error("invalid JSON document at {path}: {source}")]
    ParseJson {
        path: String,
        source: serde_json::Error,
    },

    /// A TOML settings file is malformed.
    #[error("invalid settings file at {path}: {source}")]
    ParseToml {
        path: String,
        source: toml::de::Error,
    },

    /// A document could not be serialized.
    #[error("cannot serialize {what}: {message}")]
    Serialize { what: &'static str, message: String },

    /// A utility operation failed.
    #[error("{0}")]
    Util(#[from] bdk_util::error::UtilError),

    /// The game directory does not exist.
    #[error("game directory {path} does not exist")]
    GameDirectoryNotFound { path: String },

    /// A required game configuration file is missing.
    #[error("game configuration not found at {path} — check the game directory and mod name")]
    GameConfigNotFound { path: String },

    /// The game configuration declares no package search paths.
    #[error("no `Paths=` entries in [Core.System] of {path}")]
    NoSearchPatterns { path: String },

    /// A repository with this id is already registered.
    #[error("repository `{id}` already exists")]
    RepositoryExists { id: String },

    /// No repository with this id or name is registered.
    #[error("no repository named `{id}` — run `bdk repo list` to see registered repositories")]
    RepositoryNotFound { id: String },

    /// A rule index is out of range.
    #[error("rule index {index} is out of range (repository has {len} rule(s))")]
    RuleIndex { index: usize, len: usize },

    /// A rule is malformed.
    #[error("invalid rule: {message}")]
    InvalidRule { message: String },
}
