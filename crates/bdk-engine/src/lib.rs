//! Package scanning, dependency scheduling, and the export-then-build
//! pipeline for BDK asset repositories.

pub mod collab;
pub mod error;
pub mod executor;
pub mod graph;
pub mod pipeline;
pub mod repository;
pub mod rules;
pub mod scan;
pub mod schedule;
pub mod stats;

pub use collab::{Collaborators, DependencyReader, PackageBuilder, PackageExporter, ToolCollaborators};
pub use error::EngineError;
pub use executor::{Job, JobReport, JobStatus, WorkerPool};
pub use graph::DependencyGraph;
pub use pipeline::{build_asset_library, plan, BuildPlan, BuildReport, PipelineOutcome, PipelineState};
pub use scan::scan_repository;
pub use stats::RepositoryStats;
