//! Error types for bdk-tools.

use std::path::PathBuf;

/// Errors produced while locating or invoking an external tool.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The tool was not found on the system.
    #[error("{tool} `{spec}` not found — install it and add it to PATH, or set {env_var}")]
    NotFound {
        tool: &'static str,
        spec: String,
        env_var: &'static str,
    },

    /// The tool was found but is not executable.
    #[error("{path} is not executable — check file permissions")]
    NotExecutable { path: PathBuf },

    /// A required argument was not set on a command builder.
    #[error("{tool} invocation is missing {argument}")]
    MissingArgument {
        tool: &'static str,
        argument: &'static str,
    },

    /// The dependency reader exited unsuccessfully.
    #[error("cannot read dependencies of {package}: {stderr}")]
    DependencyRead {
        package: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// An error propagated from bdk-util.
    #[error("{0}")]
    Util(#[from] bdk_util::error::UtilError),
}
