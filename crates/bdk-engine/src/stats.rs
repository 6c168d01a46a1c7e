//! Aggregate package counts for display.

use std::fmt;

use bdk_config::{Package, PackageStatus};
use serde::Serialize;

/// Package counts by lifecycle status.
///
/// Disabled and excluded packages are counted once under their own heading
/// and not under a status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepositoryStats {
    pub total: usize,
    pub disabled: usize,
    pub excluded: usize,
    pub up_to_date: usize,
    pub needs_export: usize,
    pub needs_build: usize,
}

impl RepositoryStats {
    pub fn from_packages(packages: &[Package]) -> Self {
        let mut stats = Self::default();
        for package in packages {
            stats.total += 1;
            if !package.is_enabled {
                stats.disabled += 1;
            } else if package.is_excluded_by_rule {
                stats.excluded += 1;
            } else {
                match package.status {
                    PackageStatus::UpToDate => stats.up_to_date += 1,
                    PackageStatus::NeedsExport => stats.needs_export += 1,
                    PackageStatus::NeedsBuild => stats.needs_build += 1,
                }
            }
        }
        stats
    }

    /// Active packages that still need work.
    pub fn pending(&self) -> usize {
        self.needs_export + self.needs_build
    }
}

impl fmt::Display for RepositoryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} packages: {} up to date, {} need export, {} need build, {} excluded, {} disabled",
            self.total,
            self.up_to_date,
            self.needs_export,
            self.needs_build,
            self.excluded,
            self.disabled
        )
    }
}
