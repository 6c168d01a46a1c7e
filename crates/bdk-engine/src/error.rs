//! Error types for bdk-engine.

/// Errors produced by engine operations.
///
/// Individual export or build jobs that fail are not errors; they are
/// reported through [`crate::executor::JobStatus`] and
/// [`crate::pipeline::PipelineOutcome`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A filesystem operation failed.
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// A configuration or persisted-state operation failed.
    #[error("{0}")]
    Config(#[from] bdk_config::ConfigError),

    /// An external tool could not be located or invoked.
    #[error("{0}")]
    Tool(#[from] bdk_tools::ToolError),

    /// A utility operation failed.
    #[error("{0}")]
    Util(#[from] bdk_util::error::UtilError),

    /// A rule's glob pattern is malformed.
    #[error("invalid rule pattern `{pattern}`: {message}")]
    RulePattern { pattern: String, message: String },

    /// The worker pool could not be created.
    #[error("cannot start worker pool: {message}")]
    WorkerPool { message: String },

    /// The scheduler was handed a graph that still contains a cycle.
    #[error("dependency cycle remains among: {nodes} — cycles must be broken before scheduling")]
    UnresolvedCycle { nodes: String },

    /// No scanned package matches the given name or path.
    #[error("no package named `{name}` in repository {repository}")]
    PackageNotFound { name: String, repository: String },

    /// A cache path fell outside the set of locations BDK may delete.
    #[error("refusing to delete {path} — it is not a BDK cache location")]
    UnsafeCachePath { path: String },
}
