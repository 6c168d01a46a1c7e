//! Locating and invoking the external tools behind export, build, and
//! dependency discovery.

pub mod build;
pub mod deps;
pub mod detect;
pub mod error;
pub mod export;

pub use bdk_util::process::CommandOutput;
pub use build::BuildCommand;
pub use deps::read_dependencies;
pub use detect::{locate, Tool, ToolKind};
pub use error::ToolError;
pub use export::ExportCommand;
