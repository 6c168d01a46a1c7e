//! Locating external tools.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ToolError;

/// The three external programs the pipeline depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// Extracts raw content from a package.
    Exporter,
    /// Compiles exported content into assets.
    Builder,
    /// Prints the names of the packages a package imports.
    DependencyReader,
}

impl ToolKind {
    /// Human-readable name used in messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::Exporter => "exporter",
            Self::Builder => "builder",
            Self::DependencyReader => "dependency reader",
        }
    }

    /// Environment variable that overrides the configured tool.
    pub fn env_var(self) -> &'static str {
        match self {
            Self::Exporter => "BDK_EXPORTER",
            Self::Builder => "BDK_BUILDER",
            Self::DependencyReader => "BDK_DEPENDENCY_READER",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A located, executable tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tool {
    pub kind: ToolKind,
    pub path: PathBuf,
}

/// Resolve `spec` (a path, or a program name looked up on `PATH`) to an
/// executable.
///
/// # Errors
/// Returns an error if the tool cannot be found or is not executable.
pub fn locate(kind: ToolKind, spec: &str) -> Result<Tool, ToolError> {
    let not_found = || ToolError::NotFound {
        tool: kind.label(),
        spec: spec.to_owned(),
        env_var: kind.env_var(),
    };

    let path = if looks_like_path(spec) {
        let p = PathBuf::from(spec);
        if !p.is_file() {
            return Err(not_found());
        }
        p
    } else {
        which::which(spec).map_err(|_| not_found())?
    };

    check_executable(&path)?;
    tracing::debug!(tool = kind.label(), path = %path.display(), "located tool");
    Ok(Tool { kind, path })
}

fn looks_like_path(spec: &str) -> bool {
    spec.contains('/') || spec.contains('\\') || Path::new(spec).is_absolute()
}

fn check_executable(path: &Path) -> Result<(), ToolError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = std::fs::metadata(path).map_err(|_| ToolError::NotExecutable {
            path: path.to_path_buf(),
        })?;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(ToolError::NotExecutable {
                path: path.to_path_buf(),
            });
        }
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
