//! Repository lifecycle and per-package cache operations.
//!
//! Store-level operations (create, link, unlink, delete) persist the
//! [`RepositoryStore`] before returning. Package operations load the
//! manifest, apply the change, write it back, and rescan.

use std::path::{Component, Path};

use bdk_config::{
    game, normalize_identity, package_identity, Manifest, Repository, RepositoryStore,
};
use bdk_util::fs::{remove_dir_all_if_exists, remove_dir_if_empty, remove_file_if_exists};
use bdk_util::hash::short_digest;
use time::OffsetDateTime;

use crate::error::EngineError;
use crate::scan::scan_repository;
use crate::stats::RepositoryStats;

const ID_LENGTH: usize = 16;

/// Register a new repository for a game installation.
///
/// The game configuration is checked first; nothing is written if it does
/// not resolve.
///
/// # Errors
/// Returns an error if the game directory or its configuration is missing,
/// the generated id already exists, or the store cannot be written.
pub fn create_repository(
    store: &mut RepositoryStore,
    name: &str,
    game_directory: &Path,
    mod_name: Option<&str>,
    cache_directory: &Path,
) -> Result<Repository, EngineError> {
    game::resolve_search_patterns(game_directory, mod_name)?;

    let created = OffsetDateTime::now_utc().unix_timestamp_nanos().to_string();
    let game = game_directory.display().to_string();
    let cache = cache_directory.display().to_string();
    let id = short_digest(
        &[name, game.as_str(), mod_name.unwrap_or_default(), cache.as_str(), created.as_str()],
        ID_LENGTH,
    );

    let repository = Repository::new(&id, name, game_directory, mod_name, cache_directory);
    store.insert(repository.clone())?;
    store.write()?;
    tracing::info!(%id, %name, "created repository");
    Ok(repository)
}

/// Register a repository from a standalone document written by
/// [`export_repository`].
///
/// # Errors
/// Returns an error if the document is unreadable, its id is already
/// registered, or the store cannot be written.
pub fn link_repository(store: &mut RepositoryStore, file: &Path) -> Result<Repository, EngineError> {
    let repository = Repository::from_path(file)?;
    store.insert(repository.clone())?;
    store.write()?;
    tracing::info!(id = %repository.id, file = %file.display(), "linked repository");
    Ok(repository)
}

/// Write a repository as a standalone document that can be linked elsewhere.
///
/// # Errors
/// Returns an error if the repository is unknown or the file cannot be written.
pub fn export_repository(
    store: &RepositoryStore,
    id_or_name: &str,
    file: &Path,
) -> Result<(), EngineError> {
    store.get(id_or_name)?.write_to(file)?;
    Ok(())
}

/// Forget a repository, leaving its cache on disk.
///
/// # Errors
/// Returns an error if the repository is unknown or the store cannot be written.
pub fn unlink_repository(
    store: &mut RepositoryStore,
    id_or_name: &str,
) -> Result<Repository, EngineError> {
    let repository = store.remove(id_or_name)?;
    store.write()?;
    tracing::info!(id = %repository.id, "unlinked repository");
    Ok(repository)
}

/// Forget a repository and delete its cache.
///
/// # Errors
/// Returns an error if the repository is unknown, its cache location is
/// unsafe to delete, or a file cannot be removed.
pub fn delete_repository(
    store: &mut RepositoryStore,
    id_or_name: &str,
) -> Result<Repository, EngineError> {
    clean_cache(store.get(id_or_name)?)?;
    let repository = store.remove(id_or_name)?;
    store.write()?;
    tracing::info!(id = %repository.id, "deleted repository");
    Ok(repository)
}

/// Delete the manifest, `exports/`, and `assets/` of a repository.
///
/// The `<cache>/<id>` directory itself is removed only if that leaves it
/// empty. Nothing else under the cache directory is touched.
///
/// # Errors
/// Returns an error if the repository id is not a single plain path
/// component, or a file cannot be removed.
pub fn clean_cache(repository: &Repository) -> Result<(), EngineError> {
    let root = repository.cache_root();
    let mut components = Path::new(&repository.id).components();
    let plain_id = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !plain_id || repository.cache_directory.as_os_str().is_empty() {
        return Err(EngineError::UnsafeCachePath {
            path: root.display().to_string(),
        });
    }

    remove_file_if_exists(&repository.manifest_path())?;
    remove_dir_all_if_exists(&repository.exports_directory())?;
    remove_dir_all_if_exists(&repository.assets_directory())?;
    if remove_dir_if_empty(&root) {
        tracing::debug!(path = %root.display(), "removed empty cache directory");
    }
    tracing::info!(id = %repository.id, "cleaned cache");
    Ok(())
}

/// Find scanned packages by path or by package name, case-insensitively.
///
/// Returns the on-disk paths of the matches, in argument order.
fn resolve_packages(repository: &Repository, names: &[String]) -> Result<Vec<String>, EngineError> {
    names
        .iter()
        .map(|name| {
            let key = normalize_identity(name);
            let identity = package_identity(name);
            repository
                .packages
                .iter()
                .find(|p| p.key() == key)
                .or_else(|| repository.packages.iter().find(|p| p.identity() == identity))
                .map(|p| p.path.clone())
                .ok_or_else(|| EngineError::PackageNotFound {
                    name: name.clone(),
                    repository: repository.name.clone(),
                })
        })
        .collect()
}

/// Load the manifest, apply `change` to every named package, persist, and
/// rescan. Returns the affected package paths.
fn update_manifest(
    repository: &mut Repository,
    names: &[String],
    change: impl Fn(&mut Manifest, &str),
) -> Result<Vec<String>, EngineError> {
    scan_repository(repository)?;
    let paths = resolve_packages(repository, names)?;

    let mut manifest = Manifest::load(&repository.manifest_path())?;
    for path in &paths {
        change(&mut manifest, path);
    }
    manifest.write()?;

    scan_repository(repository)?;
    Ok(paths)
}

/// Force the named packages to be exported and built again.
///
/// # Errors
/// Returns an error if a name matches no package, or the manifest cannot
/// be read or written.
pub fn invalidate(repository: &mut Repository, names: &[String]) -> Result<Vec<String>, EngineError> {
    update_manifest(repository, names, |manifest, path| manifest.invalidate(path))
}

/// Force the named packages to be built again, keeping their exports.
///
/// # Errors
/// Returns an error if a name matches no package, or the manifest cannot
/// be read or written.
pub fn invalidate_assets(
    repository: &mut Repository,
    names: &[String],
) -> Result<Vec<String>, EngineError> {
    update_manifest(repository, names, |manifest, path| manifest.invalidate_assets(path))
}

/// Enable or disable the named packages.
///
/// # Errors
/// Returns an error if a name matches no package, or the manifest cannot
/// be read or written.
pub fn set_enabled(
    repository: &mut Repository,
    names: &[String],
    enabled: bool,
) -> Result<Vec<String>, EngineError> {
    update_manifest(repository, names, |manifest, path| {
        manifest.set_enabled(path, enabled);
    })
}

/// Rescan and count packages by status.
///
/// # Errors
/// Returns an error if the repository cannot be scanned.
pub fn stats(repository: &mut Repository) -> Result<RepositoryStats, EngineError> {
    scan_repository(repository)?;
    Ok(RepositoryStats::from_packages(&repository.packages))
}
