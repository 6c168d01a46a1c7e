//! Invocation of the asset compiler.

use std::path::{Path, PathBuf};
use std::process::Command;

use bdk_util::process::{run_command, CommandOutput};

use crate::detect::Tool;
use crate::error::ToolError;

/// Builder for one asset-compiler invocation.
///
/// The compiler runs headless with a factory-default profile and executes
/// `script`, which reads the exported package and writes the asset library.
#[derive(Debug, Default)]
pub struct BuildCommand {
    script: Option<PathBuf>,
    input_directory: Option<PathBuf>,
    output_directory: Option<PathBuf>,
    package_name: Option<String>,
}

impl BuildCommand {
    /// Create a new empty command builder.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, path: &Path) -> Self {
        self.script = Some(path.to_path_buf());
        self
    }

    /// Exported content of the package.
    pub fn input_directory(mut self, path: &Path) -> Self {
        self.input_directory = Some(path.to_path_buf());
        self
    }

    /// Where the built assets go.
    pub fn output_directory(mut self, path: &Path) -> Self {
        self.output_directory = Some(path.to_path_buf());
        self
    }

    pub fn package_name(mut self, name: &str) -> Self {
        self.package_name = Some(name.to_owned());
        self
    }

    /// Build the argument list without executing.
    ///
    /// # Errors
    /// Returns an error if any argument is unset.
    pub fn build_args(&self) -> Result<Vec<String>, ToolError> {
        let missing = |argument| ToolError::MissingArgument {
            tool: "builder",
            argument,
        };
        let script = self.script.as_ref().ok_or_else(|| missing("a build script"))?;
        let input = self
            .input_directory
            .as_ref()
            .ok_or_else(|| missing("an input directory"))?;
        let output = self
            .output_directory
            .as_ref()
            .ok_or_else(|| missing("an output directory"))?;
        let name = self
            .package_name
            .as_ref()
            .ok_or_else(|| missing("a package name"))?;

        Ok(vec![
            "--background".to_owned(),
            "--factory-startup".to_owned(),
            "--python".to_owned(),
            script.display().to_string(),
            "--".to_owned(),
            "--input".to_owned(),
            input.display().to_string(),
            "--output".to_owned(),
            output.display().to_string(),
            "--package".to_owned(),
            name.clone(),
        ])
    }

    /// Run the compiler. A non-zero exit is reported in the output, not as an error.
    ///
    /// # Errors
    /// Returns an error if arguments are missing, the output directory cannot
    /// be created, or the tool cannot be spawned.
    pub fn execute(&self, tool: &Tool) -> Result<CommandOutput, ToolError> {
        let args = self.build_args()?;
        if let Some(output) = &self.output_directory {
            bdk_util::fs::ensure_dir(output)?;
        }
        tracing::debug!(tool = %tool.path.display(), ?args, "running builder");
        Ok(run_command(Command::new(&tool.path).args(&args))?)
    }
}
