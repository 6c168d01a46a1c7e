//! Package discovery and status derivation.

use std::collections::BTreeMap;

use bdk_config::{game, normalize_identity, Manifest, ManifestEntry, Package, PackageStatus, Repository};
use bdk_util::fs::{glob_files, modified_time, normalize_lexically, relative_posix};
use time::OffsetDateTime;

use crate::error::EngineError;
use crate::rules::apply_rules;

/// Lifecycle status of a package file modified at `modified_time`.
///
/// A package needs exporting when the manifest has no export newer than the
/// file, and building when it has no build newer than the file.
pub fn derive_status(modified_time: OffsetDateTime, entry: Option<&ManifestEntry>) -> PackageStatus {
    let Some(entry) = entry else {
        return PackageStatus::NeedsExport;
    };
    match (entry.exported_time, entry.built_time) {
        (None, _) => PackageStatus::NeedsExport,
        (Some(exported), _) if modified_time > exported => PackageStatus::NeedsExport,
        (Some(_), Some(built)) if modified_time <= built => PackageStatus::UpToDate,
        (Some(_), _) => PackageStatus::NeedsBuild,
    }
}

/// Glob `patterns` and join every matched file with its manifest entry.
///
/// Files are deduplicated by normalized path and returned sorted by path.
/// Rule fields are left at their defaults; see [`scan_repository`].
///
/// # Errors
/// Returns an error if a pattern is malformed or file metadata cannot be read.
pub fn scan_packages(
    repository: &Repository,
    patterns: &[String],
    manifest: &Manifest,
) -> Result<Vec<Package>, EngineError> {
    let game_root = normalize_lexically(&repository.game_directory);
    let mut found: BTreeMap<String, Package> = BTreeMap::new();

    for pattern in patterns {
        for file in glob_files(pattern)? {
            let Some(path) = relative_posix(&normalize_lexically(&file), &game_root) else {
                tracing::warn!(file = %file.display(), "skipping package outside the game directory");
                continue;
            };
            let key = normalize_identity(&path);
            if found.contains_key(&key) {
                continue;
            }

            let modified = OffsetDateTime::from(modified_time(&file)?);
            let filename = path.rsplit('/').next().unwrap_or(&path).to_owned();
            let status = derive_status(modified, manifest.get(&path));
            tracing::debug!(package = %path, %status, "scanned");
            found.insert(
                key,
                Package {
                    is_enabled: manifest.is_enabled(&path),
                    path,
                    filename,
                    modified_time: modified,
                    status,
                    is_excluded_by_rule: false,
                    asset_directory: None,
                },
            );
        }
    }

    let mut packages: Vec<Package> = found.into_values().collect();
    packages.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(packages)
}

/// Resolve the repository's search patterns, join the files with the
/// manifest, and evaluate rules. Returns the packages and the manifest they
/// were joined with; `repository.packages` is left untouched.
///
/// # Errors
/// Returns an error if the game configuration is missing, the manifest is
/// unreadable, or a rule pattern is malformed.
pub fn scan_with_manifest(repository: &Repository) -> Result<(Vec<Package>, Manifest), EngineError> {
    let patterns =
        game::resolve_search_patterns(&repository.game_directory, repository.mod_name.as_deref())?;
    let manifest = Manifest::load(&repository.manifest_path())?;
    let mut packages = scan_packages(repository, &patterns, &manifest)?;
    apply_rules(&mut packages, &repository.rules)?;
    Ok((packages, manifest))
}

/// Rescan a repository and store the result on `repository.packages`.
///
/// Returns the number of packages found.
///
/// # Errors
/// See [`scan_with_manifest`].
pub fn scan_repository(repository: &mut Repository) -> Result<usize, EngineError> {
    let (packages, _) = scan_with_manifest(repository)?;
    tracing::info!(repository = %repository.id, packages = packages.len(), "scan complete");
    repository.packages = packages;
    Ok(repository.packages.len())
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use bdk_config::Rule;
    use time::Duration;

    use super::fixtures::game;
    use super::*;

    fn entry(exported: Option<OffsetDateTime>, built: Option<OffsetDateTime>) -> ManifestEntry {
        ManifestEntry {
            exported_time: exported,
            built_time: built,
            is_enabled: true,
        }
    }

    fn status_of(repository: &Repository, path: &str) -> PackageStatus {
        repository
            .packages
            .iter()
            .find(|p| p.path == path)
            .unwrap()
            .status
    }

    #[test]
    fn status_rules() {
        let t = OffsetDateTime::UNIX_EPOCH + Duration::days(100);
        let before = t - Duration::hours(1);
        let after = t + Duration::hours(1);

        assert_eq!(derive_status(t, None), PackageStatus::NeedsExport);
        assert_eq!(derive_status(t, Some(&entry(None, Some(after)))), PackageStatus::NeedsExport);
        assert_eq!(derive_status(t, Some(&entry(Some(before), Some(after)))), PackageStatus::NeedsExport);
        assert_eq!(derive_status(t, Some(&entry(Some(after), None))), PackageStatus::NeedsBuild);
        assert_eq!(derive_status(t, Some(&entry(Some(after), Some(before)))), PackageStatus::NeedsBuild);
        assert_eq!(derive_status(t, Some(&entry(Some(after), Some(after)))), PackageStatus::UpToDate);
        assert_eq!(derive_status(t, Some(&entry(Some(t), Some(t)))), PackageStatus::UpToDate);
    }

    #[test]
    fn scan_finds_packages_relative_to_game() {
        let tmp = tempfile::tempdir().unwrap();
        let mut repo = game(
            tmp.path(),
            &["Textures/Weapons.utx", "Textures/Armor.UTX", "Sounds/Ambient.uax", "Maps/DM-Deck.ut2"],
        );
        let count = scan_repository(&mut repo).unwrap();
        assert_eq!(count, 3);

        let paths: Vec<&str> = repo.packages.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec!["Sounds/Ambient.uax", "Textures/Armor.UTX", "Textures/Weapons.utx"]);
        assert!(repo
            .packages
            .iter()
            .all(|p| p.status == PackageStatus::NeedsExport && p.is_enabled));
        assert_eq!(repo.packages.first().unwrap().filename, "Ambient.uax");
    }

    #[test]
    fn scan_with_manifest_applies_rules_without_storing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut repo = game(tmp.path(), &["Textures/A.utx", "Sounds/B.uax"]);
        repo.rules.push(Rule::exclude("*.uax"));
        let mut manifest = Manifest::empty(&repo.manifest_path());
        manifest.mark_exported("Textures/A.utx");
        manifest.write().unwrap();

        let (packages, loaded) = scan_with_manifest(&repo).unwrap();
        assert!(repo.packages.is_empty());
        assert!(loaded.get("Textures/A.utx").unwrap().exported_time.is_some());
        let excluded: Vec<&str> = packages
            .iter()
            .filter(|p| p.is_excluded_by_rule)
            .map(|p| p.path.as_str())
            .collect();
        assert_eq!(excluded, vec!["Sounds/B.uax"]);

        scan_repository(&mut repo).unwrap();
        assert_eq!(repo.packages, packages);
    }

    #[test]
    fn scan_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let mut repo = game(tmp.path(), &["Textures/A.utx", "Textures/B.utx", "Sounds/C.uax"]);
        let mut manifest = Manifest::empty(&repo.manifest_path());
        manifest.mark_exported("Textures/A.utx");
        manifest.set_enabled("Sounds/C.uax", false);
        manifest.write().unwrap();

        scan_repository(&mut repo).unwrap();
        let first = repo.packages.clone();
        scan_repository(&mut repo).unwrap();
        assert_eq!(first, repo.packages);
    }

    #[test]
    fn scan_joins_manifest_state() {
        let tmp = tempfile::tempdir().unwrap();
        let mut repo = game(tmp.path(), &["Textures/A.utx", "Textures/B.utx", "Textures/C.utx"]);
        let later = OffsetDateTime::now_utc() + Duration::hours(1);

        let mut manifest = Manifest::empty(&repo.manifest_path());
        manifest.mark_exported_at("textures/a.utx", later);
        manifest.mark_built_at("TEXTURES/A.UTX", later);
        manifest.mark_exported_at("Textures/B.utx", later);
        manifest.set_enabled("Textures/C.utx", false);
        manifest.write().unwrap();

        scan_repository(&mut repo).unwrap();
        assert_eq!(status_of(&repo, "Textures/A.utx"), PackageStatus::UpToDate);
        assert_eq!(status_of(&repo, "Textures/B.utx"), PackageStatus::NeedsBuild);
        assert_eq!(status_of(&repo, "Textures/C.utx"), PackageStatus::NeedsExport);
        assert!(!repo.packages.iter().find(|p| p.filename == "C.utx").unwrap().is_enabled);
    }

    #[test]
    fn scan_applies_rules() {
        let tmp = tempfile::tempdir().unwrap();
        let mut repo = game(tmp.path(), &["Textures/Weapons.utx", "Textures/Armor.utx"]);
        repo.rules = vec![Rule::exclude("*.utx"), Rule::include("Weapons.utx")];
        scan_repository(&mut repo).unwrap();

        let armor = repo.packages.iter().find(|p| p.filename == "Armor.utx").unwrap();
        let weapons = repo.packages.iter().find(|p| p.filename == "Weapons.utx").unwrap();
        assert!(armor.is_excluded_by_rule);
        assert!(!weapons.is_excluded_by_rule);
    }

    #[test]
    fn overlapping_patterns_are_deduplicated() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = game(tmp.path(), &["Textures/A.utx"]);
        let pattern = format!("{}/Textures/*.utx", repo.game_directory.display());
        let manifest = Manifest::empty(&repo.manifest_path());
        let packages = scan_packages(&repo, &[pattern.clone(), pattern], &manifest).unwrap();
        assert_eq!(packages.len(), 1);
    }

    #[test]
    fn missing_game_config_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mut repo = game(tmp.path(), &[]);
        fs::remove_file(repo.game_directory.join("System").join("Default.ini")).unwrap();
        assert!(matches!(
            scan_repository(&mut repo),
            Err(EngineError::Config(_))
        ));
    }
}
