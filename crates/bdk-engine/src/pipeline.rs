//! The export-then-build pipeline.
//!
//! One run scans the repository, exports every stale package in a single
//! concurrent batch, then builds in dependency order, one concurrent batch
//! per level. The manifest is written after the export batch and after
//! every level, so completed work survives a later failure.

use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, Instant};

use bdk_config::{Manifest, Package, PackageStatus, Repository};

use crate::collab::{Collaborators, DependencyReader};
use crate::error::EngineError;
use crate::executor::{Job, JobReport, WorkerPool};
use crate::graph::{build_graph, DependencyGraph};
use crate::scan::{scan_repository, scan_with_manifest};
use crate::schedule::{layered_topological_sort, materialize_levels};
use crate::stats::RepositoryStats;

/// States of a pipeline run, in the order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Scanned,
    Filtered,
    ExportPending,
    Exporting,
    ExportFailed,
    BuildPending,
    Building,
    BuildFailed,
    Completed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Scanned => "scanned",
            Self::Filtered => "filtered",
            Self::ExportPending => "export pending",
            Self::Exporting => "exporting",
            Self::ExportFailed => "export failed",
            Self::BuildPending => "build pending",
            Self::Building => "building",
            Self::BuildFailed => "build failed",
            Self::Completed => "completed",
        };
        f.write_str(label)
    }
}

/// How a run ended. Failed package paths are sorted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Completed,
    /// At least one export failed; nothing was built.
    ExportFailed { failed: Vec<String> },
    /// A build level had failures; later levels were not started.
    BuildFailed { level: usize, failed: Vec<String> },
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn failed(&self) -> &[String] {
        match self {
            Self::Completed => &[],
            Self::ExportFailed { failed } | Self::BuildFailed { failed, .. } => failed,
        }
    }
}

/// Result of [`build_asset_library`].
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub state: PipelineState,
    pub outcome: PipelineOutcome,
    /// Packages exported successfully, by path.
    pub exported: Vec<String>,
    /// Packages built successfully, by path.
    pub built: Vec<String>,
    /// Number of non-empty build levels scheduled.
    pub levels: usize,
    /// Dependency edges dropped to break cycles, as `(from, to)` identities.
    pub removed_edges: Vec<(String, String)>,
    /// Counts from the scan taken after the run.
    pub stats: RepositoryStats,
    pub duration: Duration,
}

/// What a run would do, without running it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildPlan {
    pub to_export: Vec<String>,
    pub to_build: Vec<String>,
    /// Build batches in order, by package path.
    pub levels: Vec<Vec<String>>,
    pub removed_edges: Vec<(String, String)>,
}

impl BuildPlan {
    pub fn is_empty(&self) -> bool {
        self.to_export.is_empty() && self.to_build.is_empty()
    }
}

struct StateMachine {
    state: PipelineState,
}

impl StateMachine {
    fn new() -> Self {
        Self {
            state: PipelineState::Scanned,
        }
    }

    fn advance(&mut self, next: PipelineState) {
        tracing::debug!(from = %self.state, to = %next, "pipeline state");
        self.state = next;
    }
}

/// Packages a run must export, and packages it must build.
struct WorkSet<'p> {
    to_export: Vec<&'p Package>,
    to_build: Vec<&'p Package>,
}

impl<'p> WorkSet<'p> {
    fn new(packages: &'p [Package]) -> Self {
        let active: Vec<&Package> = packages.iter().filter(|p| p.is_active()).collect();
        Self {
            to_export: active
                .iter()
                .copied()
                .filter(|p| p.status == PackageStatus::NeedsExport)
                .collect(),
            to_build: active
                .iter()
                .copied()
                .filter(|p| p.status != PackageStatus::UpToDate)
                .collect(),
        }
    }

    fn is_empty(&self) -> bool {
        self.to_export.is_empty() && self.to_build.is_empty()
    }
}

/// Scan `repository` and evaluate its rules, advancing `machine` through
/// the scan states.
fn scan_and_filter(
    repository: &Repository,
    machine: &mut StateMachine,
) -> Result<(Vec<Package>, Manifest), EngineError> {
    let scanned = scan_with_manifest(repository)?;
    machine.advance(PipelineState::Scanned);
    machine.advance(PipelineState::Filtered);
    Ok(scanned)
}

/// Resolve dependencies for every known package and schedule `to_build`.
fn schedule<'p>(
    repository: &Repository,
    packages: &[Package],
    to_build: &[&'p Package],
    reader: &dyn DependencyReader,
    pool: &WorkerPool,
) -> Result<(Vec<Vec<&'p Package>>, Vec<(String, String)>), EngineError> {
    let mut graph: DependencyGraph =
        build_graph(packages, pool, |package| reader.read(repository, package))?;
    let removed = graph.break_cycles();
    let levels = layered_topological_sort(&graph)?;
    Ok((materialize_levels(&levels, to_build), removed))
}

/// Work out what [`build_asset_library`] would do.
///
/// Rescans the repository (updating `repository.packages`) and reads
/// dependencies, but runs no export or build job.
///
/// # Errors
/// Returns an error if scanning, dependency reading, or scheduling fails.
pub fn plan(
    repository: &mut Repository,
    reader: &dyn DependencyReader,
    jobs: usize,
) -> Result<BuildPlan, EngineError> {
    scan_repository(repository)?;
    let packages = &repository.packages;
    let work = WorkSet::new(packages);
    if work.is_empty() {
        return Ok(BuildPlan::default());
    }

    let pool = WorkerPool::new(jobs)?;
    let (levels, removed_edges) = schedule(repository, packages, &work.to_build, reader, &pool)?;
    Ok(BuildPlan {
        to_export: paths(&work.to_export),
        to_build: paths(&work.to_build),
        levels: levels.iter().map(|level| paths(level.as_slice())).collect(),
        removed_edges,
    })
}

/// Run the full pipeline over `repository` with at most `jobs` concurrent
/// jobs per batch.
///
/// Export and build failures are reported in the returned
/// [`BuildReport::outcome`], not as errors. `repository.packages` holds a
/// fresh scan afterwards.
///
/// # Errors
/// Returns an error if the repository cannot be scanned, the manifest cannot
/// be read or written, dependencies cannot be read, or the worker pool cannot
/// be started.
pub fn build_asset_library(
    repository: &mut Repository,
    collaborators: Collaborators<'_>,
    jobs: usize,
) -> Result<BuildReport, EngineError> {
    let start = Instant::now();
    let mut machine = StateMachine::new();

    // 1. Scan and filter.
    let (packages, mut manifest) = scan_and_filter(repository, &mut machine)?;
    let work = WorkSet::new(&packages);
    if work.is_empty() {
        machine.advance(PipelineState::Completed);
        tracing::info!(repository = %repository.id, "nothing to export or build");
        let stats = RepositoryStats::from_packages(&packages);
        repository.packages = packages;
        return Ok(BuildReport {
            state: machine.state,
            outcome: PipelineOutcome::Completed,
            exported: Vec::new(),
            built: Vec::new(),
            levels: 0,
            removed_edges: Vec::new(),
            stats,
            duration: start.elapsed(),
        });
    }
    machine.advance(PipelineState::ExportPending);

    let stats_before = RepositoryStats::from_packages(&packages);
    let pool = WorkerPool::new(jobs)?;
    let repo: &Repository = repository;
    let mut exported = Vec::new();
    let mut built = Vec::new();
    let mut removed_edges = Vec::new();
    let mut level_count = 0;

    // 2. Export every stale package in one batch.
    machine.advance(PipelineState::Exporting);
    tracing::info!(packages = work.to_export.len(), "exporting");
    let exporter = collaborators.exporter;
    let export_jobs = work
        .to_export
        .iter()
        .map(|&package| Job::new(package.path.clone(), move || exporter.export(repo, package)))
        .collect();
    let reports = pool.run_all(export_jobs);
    let failed = record(&reports, "export", &mut exported, |path| manifest.mark_exported(path));
    manifest.write()?;

    let outcome = if !failed.is_empty() {
        machine.advance(PipelineState::ExportFailed);
        PipelineOutcome::ExportFailed { failed }
    } else {
        // 3. Resolve dependencies and schedule the build.
        machine.advance(PipelineState::BuildPending);
        let (levels, removed) =
            schedule(repo, &packages, &work.to_build, collaborators.dependencies, &pool)?;
        removed_edges = removed;
        level_count = levels.len();

        // 4. Build level by level, persisting after each.
        machine.advance(PipelineState::Building);
        let builder = collaborators.builder;
        let mut outcome = PipelineOutcome::Completed;
        for (index, level) in levels.iter().enumerate() {
            tracing::info!(level = index, packages = level.len(), "building level");
            let build_jobs = level
                .iter()
                .map(|&package| {
                    let output = repo.asset_output_directory(package);
                    Job::new(package.path.clone(), move || builder.build(repo, package, &output))
                })
                .collect();
            let reports = pool.run_all(build_jobs);
            let failed = record(&reports, "build", &mut built, |path| manifest.mark_built(path));
            manifest.write()?;

            if !failed.is_empty() {
                machine.advance(PipelineState::BuildFailed);
                outcome = PipelineOutcome::BuildFailed {
                    level: index,
                    failed,
                };
                break;
            }
        }
        if outcome.is_success() {
            machine.advance(PipelineState::Completed);
        }
        outcome
    };

    // 5. Rescan so the caller sees the manifest's new state. The manifest is
    // already persisted, so a failed rescan keeps the pre-run view.
    let stats = match scan_repository(repository) {
        Ok(_) => RepositoryStats::from_packages(&repository.packages),
        Err(e) => {
            tracing::warn!(repository = %repository.id, error = %e, "rescan after build failed");
            repository.packages = packages;
            stats_before
        }
    };
    tracing::info!(
        repository = %repository.id,
        state = %machine.state,
        exported = exported.len(),
        built = built.len(),
        "pipeline finished"
    );

    Ok(BuildReport {
        state: machine.state,
        outcome,
        exported,
        built,
        levels: level_count,
        removed_edges,
        stats,
        duration: start.elapsed(),
    })
}

fn paths(packages: &[&Package]) -> Vec<String> {
    packages.iter().map(|p| p.path.clone()).collect()
}

/// Apply successful job reports through `mark`, log failures, and return
/// the sorted paths of the failed jobs.
fn record(
    reports: &[JobReport],
    phase: &str,
    succeeded: &mut Vec<String>,
    mut mark: impl FnMut(&str),
) -> Vec<String> {
    let mut failed = BTreeSet::new();
    for report in reports {
        if report.status.success {
            mark(&report.identity);
            succeeded.push(report.identity.clone());
        } else {
            tracing::warn!(
                package = %report.identity,
                phase,
                status = %report.status.describe(),
                stdout = %report.status.stdout.trim(),
                stderr = %report.status.stderr.trim(),
                "job failed"
            );
            failed.insert(report.identity.clone());
        }
    }
    failed.into_iter().collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::sync::Mutex;

    use bdk_config::normalize_identity;

    use super::*;
    use crate::collab::{PackageBuilder, PackageExporter};
    use crate::executor::JobStatus;
    use crate::scan::fixtures::game;

    /// In-process collaborators that record calls and fail on request.
    #[derive(Default)]
    struct Fake {
        fail_export: BTreeSet<String>,
        fail_build: BTreeSet<String>,
        dependencies: BTreeMap<String, Vec<String>>,
        exported: Mutex<Vec<String>>,
        built: Mutex<Vec<String>>,
        outputs: Mutex<Vec<String>>,
    }

    impl Fake {
        fn depends(mut self, package: &str, deps: &[&str]) -> Self {
            self.dependencies.insert(
                package.to_owned(),
                deps.iter().map(|d| (*d).to_owned()).collect(),
            );
            self
        }

        fn collaborators(&self) -> Collaborators<'_> {
            Collaborators {
                exporter: self,
                builder: self,
                dependencies: self,
            }
        }

        fn built(&self) -> Vec<String> {
            self.built.lock().unwrap().clone()
        }
    }

    impl PackageExporter for Fake {
        fn export(&self, _repository: &Repository, package: &Package) -> JobStatus {
            self.exported.lock().unwrap().push(package.name().to_owned());
            if self.fail_export.contains(package.name()) {
                JobStatus::failed(1, "export failed")
            } else {
                JobStatus::succeeded()
            }
        }
    }

    impl PackageBuilder for Fake {
        fn build(&self, _repository: &Repository, package: &Package, output: &Path) -> JobStatus {
            self.built.lock().unwrap().push(package.name().to_owned());
            self.outputs.lock().unwrap().push(output.display().to_string());
            if self.fail_build.contains(package.name()) {
                JobStatus::failed(2, "build failed")
            } else {
                JobStatus::succeeded()
            }
        }
    }

    impl DependencyReader for Fake {
        fn read(
            &self,
            _repository: &Repository,
            package: &Package,
        ) -> Result<BTreeSet<String>, EngineError> {
            Ok(self
                .dependencies
                .get(package.name())
                .map(|deps| deps.iter().cloned().collect())
                .unwrap_or_default())
        }
    }

    fn manifest(repository: &Repository) -> Manifest {
        Manifest::load(&repository.manifest_path()).unwrap()
    }

    fn built_time_set(repository: &Repository, path: &str) -> bool {
        manifest(repository)
            .get(path)
            .is_some_and(|e| e.built_time.is_some())
    }

    #[test]
    fn full_run_exports_then_builds_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let mut repo = game(tmp.path(), &["Textures/A.utx", "Textures/B.utx", "Textures/C.utx"]);
        // A depends on B, B depends on C; Engine is not a scanned package.
        let fake = Fake::default()
            .depends("A", &["b", "Engine"])
            .depends("B", &["C"]);

        let report = build_asset_library(&mut repo, fake.collaborators(), 2).unwrap();
        assert_eq!(report.state, PipelineState::Completed);
        assert!(report.outcome.is_success());
        assert_eq!(report.exported.len(), 3);
        assert_eq!(report.built.len(), 3);
        assert_eq!(report.levels, 3);
        assert_eq!(fake.built(), vec!["C", "B", "A"]);

        assert_eq!(report.stats.up_to_date, 3);
        assert!(repo.packages.iter().all(|p| p.status == PackageStatus::UpToDate));
    }

    #[test]
    fn nothing_to_do_completes_without_work() {
        let tmp = tempfile::tempdir().unwrap();
        let mut repo = game(tmp.path(), &["Textures/A.utx"]);
        let fake = Fake::default();
        build_asset_library(&mut repo, fake.collaborators(), 1).unwrap();

        let second = Fake::default();
        let report = build_asset_library(&mut repo, second.collaborators(), 1).unwrap();
        assert_eq!(report.state, PipelineState::Completed);
        assert!(report.exported.is_empty());
        assert!(report.built.is_empty());
        assert!(second.exported.lock().unwrap().is_empty());
        assert!(second.built().is_empty());
    }

    #[test]
    fn export_failure_gates_every_build() {
        let tmp = tempfile::tempdir().unwrap();
        let mut repo = game(tmp.path(), &["Textures/A.utx", "Textures/B.utx", "Sounds/C.uax"]);
        let fake = Fake {
            fail_export: ["B".to_owned()].into_iter().collect(),
            ..Fake::default()
        };

        let report = build_asset_library(&mut repo, fake.collaborators(), 3).unwrap();
        assert_eq!(report.state, PipelineState::ExportFailed);
        assert_eq!(
            report.outcome,
            PipelineOutcome::ExportFailed {
                failed: vec!["Textures/B.utx".to_owned()]
            }
        );
        assert!(fake.built().is_empty());
        assert_eq!(fake.exported.lock().unwrap().len(), 3);

        // Successful exports are persisted despite the failure.
        let m = manifest(&repo);
        assert!(m.get("Textures/A.utx").unwrap().exported_time.is_some());
        assert!(m.get("Textures/B.utx").is_none());
        assert_eq!(report.stats.needs_build, 2);
        assert_eq!(report.stats.needs_export, 1);
    }

    #[test]
    fn build_failure_keeps_earlier_levels() {
        let tmp = tempfile::tempdir().unwrap();
        let mut repo = game(
            tmp.path(),
            &["Textures/A.utx", "Textures/B.utx", "Textures/C.utx", "Textures/D.utx"],
        );
        // Four levels: D, C, B, A. Level 2 (B) fails.
        let fake = Fake {
            fail_build: ["B".to_owned()].into_iter().collect(),
            ..Fake::default()
        }
        .depends("A", &["B"])
        .depends("B", &["C"])
        .depends("C", &["D"]);

        let report = build_asset_library(&mut repo, fake.collaborators(), 2).unwrap();
        assert_eq!(report.state, PipelineState::BuildFailed);
        assert_eq!(
            report.outcome,
            PipelineOutcome::BuildFailed {
                level: 2,
                failed: vec!["Textures/B.utx".to_owned()]
            }
        );
        assert_eq!(report.levels, 4);
        assert_eq!(fake.built(), vec!["D", "C", "B"]);

        assert!(built_time_set(&repo, "Textures/D.utx"));
        assert!(built_time_set(&repo, "Textures/C.utx"));
        assert!(!built_time_set(&repo, "Textures/B.utx"));
        assert!(!built_time_set(&repo, "Textures/A.utx"));
        assert_eq!(report.stats.up_to_date, 2);
        assert_eq!(report.stats.needs_build, 2);
    }

    #[test]
    fn cycles_are_broken_and_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let mut repo = game(tmp.path(), &["Textures/A.utx", "Textures/B.utx"]);
        let fake = Fake::default().depends("A", &["B"]).depends("B", &["A"]);

        let report = build_asset_library(&mut repo, fake.collaborators(), 2).unwrap();
        assert!(report.outcome.is_success());
        assert_eq!(report.removed_edges.len(), 2);
        assert_eq!(report.levels, 1);
    }

    #[test]
    fn excluded_and_disabled_packages_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let mut repo = game(tmp.path(), &["Textures/A.utx", "Textures/B.utx", "Sounds/C.uax"]);
        repo.rules.push(bdk_config::Rule::exclude("*.uax"));
        let mut m = Manifest::empty(&repo.manifest_path());
        m.set_enabled("Textures/B.utx", false);
        m.write().unwrap();

        let fake = Fake::default();
        let report = build_asset_library(&mut repo, fake.collaborators(), 2).unwrap();
        assert_eq!(report.built, vec!["Textures/A.utx".to_owned()]);
        assert_eq!(report.stats.disabled, 1);
        assert_eq!(report.stats.excluded, 1);
    }

    #[test]
    fn builds_use_asset_directory_overrides() {
        let tmp = tempfile::tempdir().unwrap();
        let mut repo = game(tmp.path(), &["StaticMeshes/Rocks.usx"]);
        repo.rules
            .push(bdk_config::Rule::set_asset_directory("*.usx", "meshes"));
        let fake = Fake::default();
        build_asset_library(&mut repo, fake.collaborators(), 1).unwrap();

        let outputs = fake.outputs.lock().unwrap().clone();
        assert_eq!(
            outputs,
            vec![repo.assets_directory().join("meshes").display().to_string()]
        );
    }

    #[test]
    fn plan_runs_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut repo = game(tmp.path(), &["Textures/A.utx", "Textures/B.utx"]);
        let fake = Fake::default().depends("A", &["B"]);

        let plan = plan(&mut repo, &fake, 2).unwrap();
        assert_eq!(plan.to_export.len(), 2);
        assert_eq!(
            plan.levels,
            vec![vec!["Textures/B.utx".to_owned()], vec!["Textures/A.utx".to_owned()]]
        );
        assert!(fake.exported.lock().unwrap().is_empty());
        assert!(fake.built().is_empty());
        assert!(manifest(&repo).is_empty());
        assert_eq!(repo.packages.len(), 2);
    }

    #[test]
    fn dependency_read_failure_is_error() {
        struct Broken;
        impl DependencyReader for Broken {
            fn read(&self, _: &Repository, package: &Package) -> Result<BTreeSet<String>, EngineError> {
                Err(EngineError::Tool(bdk_tools::ToolError::DependencyRead {
                    package: normalize_identity(&package.path),
                    exit_code: Some(1),
                    stderr: "corrupt".to_owned(),
                }))
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let mut repo = game(tmp.path(), &["Textures/A.utx"]);
        let fake = Fake::default();
        let collaborators = Collaborators {
            exporter: &fake,
            builder: &fake,
            dependencies: &Broken,
        };
        let err = build_asset_library(&mut repo, collaborators, 1).unwrap_err();
        assert!(err.to_string().contains("corrupt"), "got {err}");
        // The export batch finished and was persisted before the failure.
        assert!(manifest(&repo).get("Textures/A.utx").unwrap().exported_time.is_some());
    }

    #[test]
    fn needs_build_packages_are_rebuilt_without_export() {
        let tmp = tempfile::tempdir().unwrap();
        let mut repo = game(tmp.path(), &["Textures/A.utx", "Textures/B.utx"]);
        build_asset_library(&mut repo, Fake::default().collaborators(), 2).unwrap();
        let exported_before = manifest(&repo).get("Textures/A.utx").unwrap().exported_time;

        crate::repository::invalidate_assets(&mut repo, &["A".to_owned()]).unwrap();
        let fake = Fake::default();
        let report = build_asset_library(&mut repo, fake.collaborators(), 2).unwrap();

        assert_eq!(report.outcome, PipelineOutcome::Completed);
        assert!(fake.exported.lock().unwrap().is_empty());
        assert!(report.exported.is_empty());
        assert_eq!(fake.built(), vec!["A"]);
        assert_eq!(report.built, vec!["Textures/A.utx".to_owned()]);
        let entry = manifest(&repo).get("Textures/A.utx").cloned().unwrap();
        assert_eq!(entry.exported_time, exported_before);
        assert!(entry.built_time.is_some());
        assert_eq!(report.stats.up_to_date, 2);
    }

    #[test]
    fn failed_rescan_still_returns_report() {
        /// Builds successfully, then removes the game configuration so the
        /// closing rescan cannot resolve search paths.
        struct RemovesConfig<'a> {
            inner: &'a Fake,
            config: std::path::PathBuf,
        }
        impl PackageBuilder for RemovesConfig<'_> {
            fn build(&self, repository: &Repository, package: &Package, output: &Path) -> JobStatus {
                let status = self.inner.build(repository, package, output);
                std::fs::remove_file(&self.config).ok();
                status
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let mut repo = game(tmp.path(), &["Textures/A.utx"]);
        let fake = Fake::default();
        let builder = RemovesConfig {
            inner: &fake,
            config: bdk_config::game::config_path(&repo.game_directory, None),
        };
        let collaborators = Collaborators {
            exporter: &fake,
            builder: &builder,
            dependencies: &fake,
        };

        let report = build_asset_library(&mut repo, collaborators, 1).unwrap();
        assert_eq!(report.outcome, PipelineOutcome::Completed);
        assert_eq!(report.built, vec!["Textures/A.utx".to_owned()]);
        // Counts come from the scan taken before the run.
        assert_eq!(report.stats.needs_export, 1);
        assert_eq!(repo.packages.len(), 1);
        assert!(built_time_set(&repo, "Textures/A.utx"));
    }
}
