use std::path::PathBuf;
use std::process::Command;

use crate::error::{AppError, Result};

/// Returns true when `<program> -version` runs and exits cleanly.
pub fn is_installed(program: &str) -> bool {
    Command::new(program)
        .arg("-version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Locates `program` on `PATH`.
pub fn require_tool(program: &str) -> Result<PathBuf> {
    which::which(program).map_err(|_| AppError::ToolNotFound(program.to_string()))
}

pub fn ensure_installed(programs: &[&str]) -> Result<()> {
    for program in programs {
        if !is_installed(program) {
            return Err(AppError::ToolNotFound(program.to_string()));
        }
        log::debug!("{} is available", program);
    }
    Ok(())
}
