//! Package search paths from the game's `System/Default.ini`.
//!
//! Unreal-engine games list where packages live in the `[Core.System]`
//! section:
//!
//! ```ini
//! [Core.System]
//! Paths=../System/*.u
//! Paths=../Textures/*.utx
//! ```
//!
//! Each entry is relative to the `System` directory holding the file.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

const SYSTEM_SECTION: &str = "core.system";
const CONFIG_FILE: &str = "Default.ini";

/// Path of the configuration file for the base game or a mod.
pub fn config_path(game_directory: &Path, mod_name: Option<&str>) -> PathBuf {
    let root = match mod_name {
        Some(name) => game_directory.join(name),
        None => game_directory.to_path_buf(),
    };
    root.join("System").join(CONFIG_FILE)
}

/// Resolve the absolute glob patterns that locate packages.
///
/// When `mod_name` is set the mod's configuration must exist too; its
/// patterns come first. Duplicates are dropped.
///
/// # Errors
/// Returns an error if the game directory or a required configuration file
/// is missing, or if no `Paths=` entries are declared at all.
pub fn resolve_search_patterns(
    game_directory: &Path,
    mod_name: Option<&str>,
) -> Result<Vec<String>, ConfigError> {
    if !game_directory.is_dir() {
        return Err(ConfigError::GameDirectoryNotFound {
            path: game_directory.display().to_string(),
        });
    }

    let mut sources = Vec::new();
    if let Some(name) = mod_name.filter(|n| !n.is_empty()) {
        sources.push(config_path(game_directory, Some(name)));
    }
    sources.push(config_path(game_directory, None));

    let mut patterns: Vec<String> = Vec::new();
    for ini in &sources {
        for pattern in read_search_patterns(ini)? {
            if !patterns.contains(&pattern) {
                patterns.push(pattern);
            }
        }
    }

    if patterns.is_empty() {
        let path = sources
            .last()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        return Err(ConfigError::NoSearchPatterns { path });
    }
    Ok(patterns)
}

fn read_search_patterns(ini: &Path) -> Result<Vec<String>, ConfigError> {
    if !ini.is_file() {
        return Err(ConfigError::GameConfigNotFound {
            path: ini.display().to_string(),
        });
    }
    let bytes = std::fs::read(ini).map_err(|source| ConfigError::Read {
        path: ini.display().to_string(),
        source,
    })?;
    // Game configs are frequently Latin-1; paths are ASCII in practice.
    let content = String::from_utf8_lossy(&bytes);
    let system_dir = ini.parent().unwrap_or(Path::new("."));

    Ok(parse_paths(&content)
        .into_iter()
        .map(|relative| absolute_pattern(system_dir, &relative))
        .collect())
}

/// Extract the raw `Paths=` values of `[Core.System]`.
fn parse_paths(content: &str) -> Vec<String> {
    let mut in_system = false;
    let mut out = Vec::new();
    for line in content.lines() {
        let line = line.trim().trim_start_matches('\u{feff}');
        if line.is_empty() || line.starts_with(';') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_system = section.trim().eq_ignore_ascii_case(SYSTEM_SECTION);
            continue;
        }
        if !in_system {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case("paths") {
            let value = value.trim();
            if !value.is_empty() {
                out.push(value.replace('\\', "/"));
            }
        }
    }
    out
}

/// Anchor a `Paths=` entry at `system_dir`.
///
/// Leading components without glob syntax (`..` included) are resolved
/// lexically and escaped, since they name real directories. Everything from
/// the first wildcard component on is kept as written.
fn absolute_pattern(system_dir: &Path, relative: &str) -> String {
    let mut base = if relative.starts_with('/') {
        PathBuf::from("/")
    } else {
        system_dir.to_path_buf()
    };
    let mut parts = relative.split('/').filter(|part| !part.is_empty()).peekable();
    while let Some(part) = parts.next_if(|part| !has_glob_syntax(part)) {
        base.push(part);
    }

    let base = bdk_util::fs::escape_glob(&bdk_util::fs::normalize_lexically(&base).display().to_string());
    let rest: Vec<&str> = parts.collect();
    if rest.is_empty() {
        base
    } else {
        format!("{}/{}", base.trim_end_matches('/'), rest.join("/"))
    }
}

fn has_glob_syntax(part: &str) -> bool {
    part.contains(['*', '?', '['])
}
