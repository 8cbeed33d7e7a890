//! Git and toolchain queries for capturing workspace state.

use std::path::Path;
use std::process::Command;

use crate::error::{PipelineError, Result};

/// Capture the HEAD commit SHA from a git repository.
///
/// Runs `git rev-parse HEAD` in the given directory. Returns an error if the
/// directory is not inside a git repository or if git is not available.
pub fn capture_head_sha(repo_dir: &Path) -> Result<String> {
    git_output(repo_dir, &["rev-parse", "HEAD"])
}

/// Name of the checked-out branch.
///
/// A detached HEAD has no branch and is reported as an error.
pub fn current_branch(repo_dir: &Path) -> Result<String> {
    let branch = git_output(repo_dir, &["rev-parse", "--abbrev-ref", "HEAD"])?;
    if branch == "HEAD" {
        return Err(PipelineError::Git(format!(
            "{} is on a detached HEAD",
            repo_dir.display()
        )));
    }
    Ok(branch)
}

/// Check whether a directory is inside a git work tree.
pub fn is_git_repo(dir: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(dir)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Active Rust toolchain, or `None` if rustup is unavailable.
pub fn active_toolchain(dir: &Path) -> Option<String> {
    let output = Command::new("rustup")
        .args(["show", "active-toolchain"])
        .current_dir(dir)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let line = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!line.is_empty()).then_some(line)
}

fn git_output(repo_dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .map_err(|e| PipelineError::Git(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::Git(format!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }

    let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if value.is_empty() {
        return Err(PipelineError::Git(format!(
            "git {} returned empty output",
            args.join(" ")
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    fn run_git(repo_dir: &Path, args: &[&str]) {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init"]);
        run_git(dir.path(), &["checkout", "-b", "main"]);
        run_git(dir.path(), &["config", "user.name", "test-user"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["commit", "--allow-empty", "-m", "initial"]);
        dir
    }

    #[test]
    fn capture_head_sha_returns_40_hex_chars() {
        let repo = make_git_repo();
        let sha = capture_head_sha(repo.path()).unwrap();
        assert_eq!(sha.len(), 40, "SHA should be 40 hex chars, got: {sha}");
        assert!(sha.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn current_branch_reports_checked_out_branch() {
        let repo = make_git_repo();
        assert_eq!(current_branch(repo.path()).unwrap(), "main");
    }

    #[test]
    fn current_branch_rejects_detached_head() {
        let repo = make_git_repo();
        run_git(repo.path(), &["checkout", "--detach"]);
        assert!(matches!(
            current_branch(repo.path()),
            Err(PipelineError::Git(msg)) if msg.contains("detached")
        ));
    }

    #[test]
    fn non_repo_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_git_repo(dir.path()));
        assert!(matches!(
            capture_head_sha(dir.path()),
            Err(PipelineError::Git(_))
        ));
    }

    #[test]
    fn repo_is_detected() {
        let repo = make_git_repo();
        assert!(is_git_repo(repo.path()));
    }
}
