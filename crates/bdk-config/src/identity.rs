//! Case-insensitive identity for packages and dependency names.

use std::path::Path;

/// Normalize a package path or name into its comparison form.
///
/// Lowercases and converts `\` separators to `/`. Every manifest key, graph
/// node, and dependency name goes through this function before comparison.
pub fn normalize_identity(raw: &str) -> String {
    raw.replace('\\', "/").to_lowercase()
}

/// The graph identity of a package file: its basename without extension,
/// normalized.
///
/// `Textures/Weapons.utx` and `WEAPONS` both map to `weapons`.
pub fn package_identity(path: &str) -> String {
    let normalized = normalize_identity(path);
    let stem = Path::new(&normalized)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    if stem.is_empty() {
        normalized
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_lowercases_and_converts_separators() {
        assert_eq!(normalize_identity(r"Textures\Weapons.UTX"), "textures/weapons.utx");
    }

    #[test]
    fn package_identity_strips_directory_and_extension() {
        assert_eq!(package_identity("Textures/Weapons.utx"), "weapons");
        assert_eq!(package_identity(r"StaticMeshes\Trees.USX"), "trees");
    }

    #[test]
    fn package_identity_of_bare_name() {
        assert_eq!(package_identity("Engine"), "engine");
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn normalize_is_idempotent(raw in "[A-Za-z0-9_./\\\\]{0,40}") {
                let once = normalize_identity(&raw);
                prop_assert_eq!(normalize_identity(&once), once);
            }

            #[test]
            fn identity_ignores_case(name in "[A-Za-z][A-Za-z0-9_]{0,20}") {
                let upper = format!("{}.UTX", name.to_uppercase());
                let lower = format!("{}.utx", name.to_lowercase());
                prop_assert_eq!(package_identity(&upper), package_identity(&lower));
            }
        }
    }
}
