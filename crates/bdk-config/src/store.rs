//! The registry of repositories known to this installation (`repositories.json`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::identity::normalize_identity;
use crate::repository::Repository;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    repositories: Vec<Repository>,
}

/// Persisted list of repositories, passed explicitly to whoever needs it.
///
/// Repository ids are unique within a store.
#[derive(Debug, Clone)]
pub struct RepositoryStore {
    path: PathBuf,
    document: StoreDocument,
}

impl RepositoryStore {
    /// Read the store at `path`. A missing file yields an empty store.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self {
                path: path.to_path_buf(),
                document: StoreDocument::default(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let document = serde_json::from_str(&content).map_err(|source| ConfigError::ParseJson {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            document,
        })
    }

    /// Persist the store.
    ///
    /// # Errors
    /// Returns an error if serialization fails or the file cannot be written.
    pub fn write(&self) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(&self.document).map_err(|e| {
            ConfigError::Serialize {
                what: "repository store",
                message: e.to_string(),
            }
        })?;
        bdk_util::fs::write_atomic(&self.path, content.as_bytes())?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn repositories(&self) -> &[Repository] {
        &self.document.repositories
    }

    fn position(&self, id_or_name: &str) -> Option<usize> {
        let wanted = normalize_identity(id_or_name);
        let repos = &self.document.repositories;
        repos
            .iter()
            .position(|r| normalize_identity(&r.id) == wanted)
            .or_else(|| {
                repos
                    .iter()
                    .position(|r| normalize_identity(&r.name) == wanted)
            })
    }

    /// Find a repository by id, falling back to its display name.
    ///
    /// # Errors
    /// Returns an error if no repository matches.
    pub fn get(&self, id_or_name: &str) -> Result<&Repository, ConfigError> {
        self.position(id_or_name)
            .and_then(|i| self.document.repositories.get(i))
            .ok_or_else(|| ConfigError::RepositoryNotFound {
                id: id_or_name.to_owned(),
            })
    }

    /// Mutable lookup by id or name.
    ///
    /// # Errors
    /// Returns an error if no repository matches.
    pub fn get_mut(&mut self, id_or_name: &str) -> Result<&mut Repository, ConfigError> {
        let index = self.position(id_or_name);
        index
            .and_then(|i| self.document.repositories.get_mut(i))
            .ok_or_else(|| ConfigError::RepositoryNotFound {
                id: id_or_name.to_owned(),
            })
    }

    /// Register a repository.
    ///
    /// # Errors
    /// Returns an error if a repository with the same id is already registered.
    pub fn insert(&mut self, repository: Repository) -> Result<(), ConfigError> {
        let id = normalize_identity(&repository.id);
        if self
            .document
            .repositories
            .iter()
            .any(|r| normalize_identity(&r.id) == id)
        {
            return Err(ConfigError::RepositoryExists { id: repository.id });
        }
        self.document.repositories.push(repository);
        Ok(())
    }

    /// Unregister a repository and return it.
    ///
    /// # Errors
    /// Returns an error if no repository matches.
    pub fn remove(&mut self, id_or_name: &str) -> Result<Repository, ConfigError> {
        let index = self
            .position(id_or_name)
            .ok_or_else(|| ConfigError::RepositoryNotFound {
                id: id_or_name.to_owned(),
            })?;
        Ok(self.document.repositories.remove(index))
    }
}
