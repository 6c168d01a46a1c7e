//! Persisted state for BDK: repositories, the incremental-build manifest,
//! user settings, and game configuration lookup.

pub mod error;
pub mod game;
pub mod identity;
pub mod manifest;
pub mod package;
pub mod repository;
pub mod settings;
pub mod store;

pub use error::ConfigError;
pub use identity::{normalize_identity, package_identity};
pub use manifest::{Manifest, ManifestEntry};
pub use package::{Package, PackageStatus};
pub use repository::{Repository, Rule, RuleKind};
pub use settings::Settings;
pub use store::RepositoryStore;
