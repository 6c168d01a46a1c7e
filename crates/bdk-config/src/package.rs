//! Packages discovered in a game installation.

use std::fmt;

use serde::Serialize;
use time::OffsetDateTime;

use crate::identity::{normalize_identity, package_identity};

/// Where a package stands in the export-then-build lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    /// No valid export exists; the package must be exported, then built.
    NeedsExport,
    /// The export is current but the built assets are missing or stale.
    NeedsBuild,
    /// Both export and build are newer than the package file.
    UpToDate,
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NeedsExport => "needs export",
            Self::NeedsBuild => "needs build",
            Self::UpToDate => "up to date",
        };
        f.write_str(label)
    }
}

/// One binary asset package found by a scan.
///
/// Packages are recreated on every scan; `status` and `is_enabled` come from
/// joining the file's modification time with the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Package {
    /// Path relative to the game directory, `/`-separated, case as on disk.
    pub path: String,
    /// File name including extension.
    pub filename: String,
    #[serde(with = "time::serde::rfc3339")]
    pub modified_time: OffsetDateTime,
    pub status: PackageStatus,
    /// Set by rule evaluation after the scan.
    pub is_excluded_by_rule: bool,
    pub is_enabled: bool,
    /// Asset-output directory override set by a `SetAssetDirectory` rule.
    pub asset_directory: Option<String>,
}

impl Package {
    /// Manifest key for this package.
    pub fn key(&self) -> String {
        normalize_identity(&self.path)
    }

    /// Dependency-graph identity (lowercased basename without extension).
    pub fn identity(&self) -> String {
        package_identity(&self.filename)
    }

    /// The package name as it appears on disk, without extension.
    pub fn name(&self) -> &str {
        self.filename
            .rsplit_once('.')
            .map_or(self.filename.as_str(), |(stem, _)| stem)
    }

    /// Whether this package takes part in a build run at all.
    pub fn is_active(&self) -> bool {
        self.is_enabled && !self.is_excluded_by_rule
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A package with the given path and status, enabled and not excluded.
    pub fn package(path: &str, status: PackageStatus) -> Package {
        let filename = path.rsplit('/').next().unwrap_or(path).to_owned();
        Package {
            path: path.to_owned(),
            filename,
            modified_time: OffsetDateTime::UNIX_EPOCH,
            status,
            is_excluded_by_rule: false,
            is_enabled: true,
            asset_directory: None,
        }
    }
}
