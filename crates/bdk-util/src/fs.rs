//! Filesystem utilities for BDK.

use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use crate::error::UtilError;

/// Create a directory and all parent directories if they do not exist.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> Result<(), UtilError> {
    std::fs::create_dir_all(path).map_err(|source| UtilError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Write `contents` to `path` via a sibling temp file and a rename.
///
/// Parent directories are created as needed. A crash mid-write leaves either
/// the previous document or the new one, never a truncated file.
///
/// # Errors
/// Returns an error if the parent directory cannot be created or the file
/// cannot be written or renamed.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), UtilError> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let mut tmp_name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    std::fs::write(&tmp_path, contents).map_err(|source| UtilError::Io {
        path: tmp_path.display().to_string(),
        source,
    })?;
    std::fs::rename(&tmp_path, path).map_err(|source| UtilError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Remove a directory and all its contents. No error if the directory is absent.
///
/// # Errors
/// Returns an error if the directory exists but cannot be removed.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<(), UtilError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(UtilError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// Remove a single file. No error if the file is absent.
///
/// # Errors
/// Returns an error if the file exists but cannot be removed.
pub fn remove_file_if_exists(path: &Path) -> Result<(), UtilError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(UtilError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// Remove `path` only if it is an empty directory.
///
/// Returns `true` if the directory was removed. A missing or non-empty
/// directory is left alone and reported as `false`.
pub fn remove_dir_if_empty(path: &Path) -> bool {
    let is_empty = std::fs::read_dir(path).is_ok_and(|mut entries| entries.next().is_none());
    is_empty && std::fs::remove_dir(path).is_ok()
}

/// Return the BDK home directory.
///
/// Resolves via `BDK_HOME`, then `HOME` (Unix) or `USERPROFILE` (Windows),
/// appending `.bdk` to the latter two.
///
/// # Errors
/// Returns an error if none of the environment variables is set.
pub fn bdk_home() -> Result<PathBuf, UtilError> {
    if let Some(home) = std::env::var_os("BDK_HOME") {
        return Ok(PathBuf::from(home));
    }
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(|home| PathBuf::from(home).join(".bdk"))
        .ok_or(UtilError::NoHomeDir)
}

/// Return the last modification time of a file.
///
/// # Errors
/// Returns an error if the file metadata cannot be read.
pub fn modified_time(path: &Path) -> Result<SystemTime, UtilError> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|source| UtilError::Io {
            path: path.display().to_string(),
            source,
        })
}

/// Resolve `.` and `..` components without touching the filesystem.
///
/// A `..` that would climb above the root (or the start of a relative path)
/// is kept as-is.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out.iter().collect()
}

/// Render `path` relative to `base` with forward slashes.
///
/// Returns `None` if `path` is not under `base`.
pub fn relative_posix(path: &Path, base: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

/// Expand a glob pattern into the list of matching regular files, sorted.
///
/// Matching is case-insensitive so that `*.utx` also finds `Foo.UTX`.
/// Entries that cannot be read are logged and skipped.
///
/// # Errors
/// Returns an error if the pattern is invalid.
pub fn glob_files(pattern: &str) -> Result<Vec<PathBuf>, UtilError> {
    let options = glob::MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    let mut files: Vec<PathBuf> = glob::glob_with(pattern, options)
        .map_err(|e| UtilError::GlobPattern {
            pattern: pattern.to_owned(),
            message: e.to_string(),
        })?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(path = %e.path().display(), error = %e.error(), "skipping unreadable path");
                None
            }
        })
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    Ok(files)
}

/// Escape glob metacharacters in a literal path fragment.
pub fn escape_glob(literal: &str) -> String {
    glob::Pattern::escape(literal)
}
