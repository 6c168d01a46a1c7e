//! Invocation of the package extraction tool.

use std::path::{Path, PathBuf};
use std::process::Command;

use bdk_util::process::{run_command, CommandOutput};

use crate::detect::Tool;
use crate::error::ToolError;

/// Builder for one export invocation.
#[derive(Debug, Default)]
pub struct ExportCommand {
    game_directory: Option<PathBuf>,
    package_file: Option<PathBuf>,
    output_directory: Option<PathBuf>,
}

impl ExportCommand {
    /// Create a new empty command builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Game root used to resolve imported packages.
    pub fn game_directory(mut self, path: &Path) -> Self {
        self.game_directory = Some(path.to_path_buf());
        self
    }

    /// The package file to extract.
    pub fn package_file(mut self, path: &Path) -> Self {
        self.package_file = Some(path.to_path_buf());
        self
    }

    /// Directory that receives the exported content.
    pub fn output_directory(mut self, path: &Path) -> Self {
        self.output_directory = Some(path.to_path_buf());
        self
    }

    /// Build the argument list without executing.
    ///
    /// # Errors
    /// Returns an error if any of the three paths is unset.
    pub fn build_args(&self) -> Result<Vec<String>, ToolError> {
        let missing = |argument| ToolError::MissingArgument {
            tool: "exporter",
            argument,
        };
        let game = self
            .game_directory
            .as_ref()
            .ok_or_else(|| missing("a game directory"))?;
        let package = self
            .package_file
            .as_ref()
            .ok_or_else(|| missing("a package file"))?;
        let output = self
            .output_directory
            .as_ref()
            .ok_or_else(|| missing("an output directory"))?;

        Ok(vec![
            "-export".to_owned(),
            "-nooverwrite".to_owned(),
            "-nolinked".to_owned(),
            "-groups".to_owned(),
            "-uncook".to_owned(),
            format!("-path={}", game.display()),
            format!("-out={}", output.display()),
            package.display().to_string(),
        ])
    }

    /// Run the exporter. A non-zero exit is reported in the output, not as an error.
    ///
    /// # Errors
    /// Returns an error if arguments are missing, the output directory cannot
    /// be created, or the tool cannot be spawned.
    pub fn execute(&self, tool: &Tool) -> Result<CommandOutput, ToolError> {
        let args = self.build_args()?;
        if let Some(output) = &self.output_directory {
            bdk_util::fs::ensure_dir(output)?;
        }
        tracing::debug!(tool = %tool.path.display(), ?args, "running exporter");
        Ok(run_command(Command::new(&tool.path).args(&args))?)
    }
}
