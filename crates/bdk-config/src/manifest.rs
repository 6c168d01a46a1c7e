//! The per-repository incremental-build manifest (`manifest.json`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ConfigError;
use crate::identity::normalize_identity;

/// Export/build bookkeeping for one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    #[serde(default, with = "iso8601")]
    pub exported_time: Option<OffsetDateTime>,
    #[serde(default, rename = "build_time", with = "iso8601")]
    pub built_time: Option<OffsetDateTime>,
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
}

impl Default for ManifestEntry {
    fn default() -> Self {
        Self {
            exported_time: None,
            built_time: None,
            is_enabled: true,
        }
    }
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct ManifestDocument {
    #[serde(default)]
    packages: BTreeMap<String, ManifestEntry>,
}

/// JSON-backed cache mapping package path to its export/build state.
///
/// Keys are stored in normalized form (see [`normalize_identity`]); every
/// accessor normalizes its argument, so callers may pass paths in any case.
/// Mutations create a fresh entry for unseen paths.
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    document: ManifestDocument,
}

impl Manifest {
    /// An empty manifest that will be written to `path`.
    pub fn empty(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            document: ManifestDocument::default(),
        }
    }

    /// Read a manifest from disk. A missing file yields an empty manifest.
    ///
    /// Keys written by older tools in mixed case are folded on load; if two
    /// keys fold to the same identity, the one sorting last wins.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or is not valid JSON.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::empty(path));
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let raw: ManifestDocument =
            serde_json::from_str(&content).map_err(|source| ConfigError::ParseJson {
                path: path.display().to_string(),
                source,
            })?;

        let mut packages = BTreeMap::new();
        for (key, entry) in raw.packages {
            let normalized = normalize_identity(&key);
            if normalized != key {
                tracing::debug!(%key, %normalized, "folding legacy manifest key");
            }
            packages.insert(normalized, entry);
        }

        Ok(Self {
            path: path.to_path_buf(),
            document: ManifestDocument { packages },
        })
    }

    /// Persist the full document, creating parent directories as needed.
    ///
    /// # Errors
    /// Returns an error if serialization fails or the file cannot be written.
    pub fn write(&self) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(&self.document).map_err(|e| {
            ConfigError::Serialize {
                what: "manifest",
                message: e.to_string(),
            }
        })?;
        bdk_util::fs::write_atomic(&self.path, content.as_bytes())?;
        Ok(())
    }

    /// Location of the manifest file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up the entry for a package path.
    pub fn get(&self, package_path: &str) -> Option<&ManifestEntry> {
        self.document.packages.get(&normalize_identity(package_path))
    }

    /// Whether the package is enabled. Unseen packages are enabled.
    pub fn is_enabled(&self, package_path: &str) -> bool {
        self.get(package_path).map_or(true, |e| e.is_enabled)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.document.packages.len()
    }

    /// Whether the manifest has no entries.
    pub fn is_empty(&self) -> bool {
        self.document.packages.is_empty()
    }

    /// Iterate over `(normalized key, entry)` pairs in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &ManifestEntry)> {
        self.document
            .packages
            .iter()
            .map(|(k, v)| (k.as_str(), v))
    }

    fn entry_mut(&mut self, package_path: &str) -> &mut ManifestEntry {
        self.document
            .packages
            .entry(normalize_identity(package_path))
            .or_default()
    }

    /// Record a successful export now.
    pub fn mark_exported(&mut self, package_path: &str) {
        self.mark_exported_at(package_path, OffsetDateTime::now_utc());
    }

    /// Record a successful export at `when`.
    pub fn mark_exported_at(&mut self, package_path: &str, when: OffsetDateTime) {
        self.entry_mut(package_path).exported_time = Some(when);
    }

    /// Record a successful build now.
    pub fn mark_built(&mut self, package_path: &str) {
        self.mark_built_at(package_path, OffsetDateTime::now_utc());
    }

    /// Record a successful build at `when`.
    pub fn mark_built_at(&mut self, package_path: &str, when: OffsetDateTime) {
        self.entry_mut(package_path).built_time = Some(when);
    }

    /// Forget both timestamps; the package must be exported again.
    pub fn invalidate(&mut self, package_path: &str) {
        let entry = self.entry_mut(package_path);
        entry.exported_time = None;
        entry.built_time = None;
    }

    /// Forget the build timestamp only; the export stays valid.
    pub fn invalidate_assets(&mut self, package_path: &str) {
        self.entry_mut(package_path).built_time = None;
    }

    /// Enable or disable a package.
    pub fn set_enabled(&mut self, package_path: &str, enabled: bool) {
        self.entry_mut(package_path).is_enabled = enabled;
    }
}

/// Serde adapter for optional ISO-8601 timestamps.
///
/// Writes RFC 3339. Reads RFC 3339, or an ISO-8601 date-time without an
/// offset, which is taken as UTC.
mod iso8601 {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::format_description::well_known::{Iso8601, Rfc3339};
    use time::{OffsetDateTime, PrimitiveDateTime};

    pub fn serialize<S: Serializer>(
        value: &Option<OffsetDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(when) => {
                let text = when.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
                serializer.serialize_some(&text)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<OffsetDateTime>, D::Error> {
        let Some(text) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        parse(&text).map(Some).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse(text: &str) -> Result<OffsetDateTime, time::error::Parse> {
        OffsetDateTime::parse(text, &Rfc3339).or_else(|rfc_err| {
            PrimitiveDateTime::parse(text, &Iso8601::DEFAULT)
                .map(PrimitiveDateTime::assume_utc)
                .map_err(|_| rfc_err)
        })
    }
}
