//! Resolution of the `CLAUDE_PROJECT_DIR` value handed to children.
//!
//! Precedence: the host-provided variable, then the git top-level of the
//! event's working directory, then the nearest ancestor containing a
//! `.claude` directory, then the working directory itself.

use std::path::Path;
use std::path::PathBuf;

use tracing::debug;

pub const PROJECT_DIR_ENV: &str = "CLAUDE_PROJECT_DIR";

/// Resolve the project directory for `cwd`.
pub fn resolve_project_dir(cwd: &Path) -> PathBuf {
    if let Ok(value) = std::env::var(PROJECT_DIR_ENV) {
        if !value.is_empty() {
            return PathBuf::from(value);
        }
    }

    if let Some(toplevel) = git_toplevel(cwd) {
        return toplevel;
    }

    if let Some(marker) = nearest_claude_ancestor(cwd) {
        return marker;
    }

    cwd.to_path_buf()
}

fn git_toplevel(cwd: &Path) -> Option<PathBuf> {
    let output = std::process::Command::new("git")
        .arg("-C")
        .arg(cwd)
        .args(["rev-parse", "--show-toplevel"])
        .output()
        .ok()?;
    if !output.status.success() {
        debug!(cwd = %cwd.display(), "not inside a git work tree");
        return None;
    }
    let toplevel = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if toplevel.is_empty() {
        None
    } else {
        Some(PathBuf::from(toplevel))
    }
}

fn nearest_claude_ancestor(cwd: &Path) -> Option<PathBuf> {
    cwd.ancestors()
        .find(|dir| dir.join(".claude").is_dir())
        .map(Path::to_path_buf)
}
