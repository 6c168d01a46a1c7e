//! Package dependency discovery through the external reader.

use std::collections::BTreeSet;
use std::path::Path;
use std::process::Command;

use bdk_util::process::run_command;

use crate::detect::Tool;
use crate::error::ToolError;

/// Ask the dependency reader which packages `package_file` imports.
///
/// Names are returned as printed (case preserved); callers normalize them.
///
/// # Errors
/// Returns an error if the reader cannot be spawned or exits unsuccessfully.
pub fn read_dependencies(tool: &Tool, package_file: &Path) -> Result<BTreeSet<String>, ToolError> {
    let output = run_command(Command::new(&tool.path).arg(package_file))?;
    if !output.success {
        return Err(ToolError::DependencyRead {
            package: package_file.display().to_string(),
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_owned(),
        });
    }
    Ok(parse_dependency_list(&output.stdout))
}

/// One name per line; blank lines and `#` comments are ignored.
pub fn parse_dependency_list(stdout: &str) -> BTreeSet<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_owned)
        .collect()
}
