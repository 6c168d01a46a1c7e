//! The external work the pipeline delegates: export, build, and dependency
//! discovery.
//!
//! The pipeline only sees these traits. [`ToolCollaborators`] implements
//! them by spawning the configured tools; tests substitute in-process fakes.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use bdk_config::{Package, Repository, Settings};
use bdk_tools::{locate, read_dependencies, BuildCommand, ExportCommand, Tool, ToolKind};

use crate::error::EngineError;
use crate::executor::JobStatus;

/// Extracts a package's raw content into the repository's export cache.
pub trait PackageExporter: Sync {
    fn export(&self, repository: &Repository, package: &Package) -> JobStatus;
}

/// Compiles exported content into assets under `output_directory`.
pub trait PackageBuilder: Sync {
    fn build(&self, repository: &Repository, package: &Package, output_directory: &Path)
        -> JobStatus;
}

/// Reports the raw names of the packages a package imports.
pub trait DependencyReader: Sync {
    /// # Errors
    /// Returns an error if the package's dependencies cannot be read.
    fn read(&self, repository: &Repository, package: &Package)
        -> Result<BTreeSet<String>, EngineError>;
}

/// The three collaborators one pipeline run uses.
#[derive(Clone, Copy)]
pub struct Collaborators<'c> {
    pub exporter: &'c dyn PackageExporter,
    pub builder: &'c dyn PackageBuilder,
    pub dependencies: &'c dyn DependencyReader,
}

impl<'c> From<&'c ToolCollaborators> for Collaborators<'c> {
    fn from(tools: &'c ToolCollaborators) -> Self {
        Self {
            exporter: tools,
            builder: tools,
            dependencies: tools,
        }
    }
}

/// Collaborators backed by the external tools named in [`Settings`].
///
/// A missing exporter or builder does not stop the run from starting; each
/// job that needs it fails with the lookup error instead. The dependency
/// reader is needed before any job runs, so it must be present.
#[derive(Debug)]
pub struct ToolCollaborators {
    exporter: Result<Tool, String>,
    builder: Result<Tool, String>,
    build_script: PathBuf,
    dependency_reader: Tool,
}

impl ToolCollaborators {
    /// Locate the configured tools.
    ///
    /// # Errors
    /// Returns an error if the dependency reader cannot be located.
    pub fn new(settings: &Settings) -> Result<Self, EngineError> {
        let tools = &settings.tools;
        let lookup = |kind, spec: &str| locate(kind, spec).map_err(|e| e.to_string());
        Ok(Self {
            exporter: lookup(ToolKind::Exporter, &tools.exporter),
            builder: lookup(ToolKind::Builder, &tools.builder),
            build_script: tools.build_script.clone(),
            dependency_reader: locate(ToolKind::DependencyReader, &tools.dependency_reader)?,
        })
    }
}

impl PackageExporter for ToolCollaborators {
    fn export(&self, repository: &Repository, package: &Package) -> JobStatus {
        let tool = match &self.exporter {
            Ok(tool) => tool,
            Err(message) => return JobStatus::not_started(message),
        };
        ExportCommand::new()
            .game_directory(&repository.game_directory)
            .package_file(&repository.package_file(package))
            .output_directory(&repository.exports_directory())
            .execute(tool)
            .map_or_else(|e| JobStatus::not_started(&e.to_string()), JobStatus::from)
    }
}

impl PackageBuilder for ToolCollaborators {
    fn build(
        &self,
        repository: &Repository,
        package: &Package,
        output_directory: &Path,
    ) -> JobStatus {
        let tool = match &self.builder {
            Ok(tool) => tool,
            Err(message) => return JobStatus::not_started(message),
        };
        BuildCommand::new()
            .script(&self.build_script)
            .input_directory(&repository.exports_directory().join(package.name()))
            .output_directory(output_directory)
            .package_name(package.name())
            .execute(tool)
            .map_or_else(|e| JobStatus::not_started(&e.to_string()), JobStatus::from)
    }
}

impl DependencyReader for ToolCollaborators {
    fn read(
        &self,
        repository: &Repository,
        package: &Package,
    ) -> Result<BTreeSet<String>, EngineError> {
        Ok(read_dependencies(
            &self.dependency_reader,
            &repository.package_file(package),
        )?)
    }
}
