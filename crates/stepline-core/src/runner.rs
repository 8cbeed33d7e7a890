//! Step execution.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::step::StepConfig;

/// Exit code recorded when a step could not be spawned or was killed.
pub const EXIT_CODE_ERROR: i32 = -1;

/// Why a step did not run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The step is disabled in the workflow.
    Disabled,
    /// An earlier step failed.
    Halted,
}

/// Final status of one step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    Skipped(SkipReason),
}

/// Result of a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Step name.
    pub step_name: String,

    pub status: StepStatus,

    /// Process exit code; `None` if the step never ran.
    pub exit_code: Option<i32>,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr (or the spawn/timeout error message).
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl StepResult {
    pub fn skipped(step_name: impl Into<String>, reason: SkipReason) -> Self {
        Self {
            step_name: step_name.into(),
            status: StepStatus::Skipped(reason),
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 0,
        }
    }

    /// A step that failed before or while running its process.
    pub fn errored(step_name: impl Into<String>, error: impl ToString, duration_ms: u64) -> Self {
        Self {
            step_name: step_name.into(),
            status: StepStatus::Failed,
            exit_code: Some(EXIT_CODE_ERROR),
            stdout: String::new(),
            stderr: error.to_string(),
            duration_ms,
        }
    }

    /// Whether this step passed.
    pub fn passed(&self) -> bool {
        self.status == StepStatus::Succeeded
    }

    pub fn failed(&self) -> bool {
        self.status == StepStatus::Failed
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, StepStatus::Skipped(_))
    }

    /// Last `max_lines` lines of stderr.
    pub fn stderr_tail(&self, max_lines: usize) -> String {
        let lines: Vec<&str> = self.stderr.lines().collect();
        let start = lines.len().saturating_sub(max_lines);
        lines[start..].join("\n")
    }
}

/// Environment a step runs in.
#[derive(Debug, Clone, Default)]
pub struct ExecContext {
    /// Working directory for every step.
    pub workspace: PathBuf,

    /// Variables added to the inherited process environment.
    pub env: BTreeMap<String, String>,
}

impl ExecContext {
    pub fn new(workspace: impl Into<PathBuf>, env: BTreeMap<String, String>) -> Self {
        Self {
            workspace: workspace.into(),
            env,
        }
    }
}

/// Executes one resolved step.
///
/// Implementations never return an error: anything that prevents the step
/// from succeeding is reported as [`StepStatus::Failed`].
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, step: &StepConfig, command: &[String], ctx: &ExecContext)
        -> StepResult;
}

/// Runs steps as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

#[async_trait]
impl StepExecutor for ProcessExecutor {
    async fn execute(
        &self,
        step: &StepConfig,
        command: &[String],
        ctx: &ExecContext,
    ) -> StepResult {
        let start = Instant::now();

        let Some((exe, args)) = command.split_first() else {
            return StepResult::errored(
                &step.name,
                format!("Step {} has empty command", step.name),
                0,
            );
        };

        let child = Command::new(exe)
            .args(args)
            .current_dir(&ctx.workspace)
            .envs(&ctx.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(c) => c,
            Err(e) => {
                return StepResult::errored(
                    &step.name,
                    format!("Step {} failed to spawn {}: {}", step.name, exe, e),
                    start.elapsed().as_millis() as u64,
                )
            }
        };

        let output = if step.timeout_secs > 0 {
            match tokio::time::timeout(
                Duration::from_secs(step.timeout_secs),
                child.wait_with_output(),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => {
                    // The child future was dropped, kill_on_drop reaps it.
                    return StepResult::errored(
                        &step.name,
                        format!(
                            "Step {} timed out after {} seconds",
                            step.name, step.timeout_secs
                        ),
                        start.elapsed().as_millis() as u64,
                    );
                }
            }
        } else {
            child.wait_with_output().await
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let output = match output {
            Ok(o) => o,
            Err(e) => return StepResult::errored(&step.name, e, duration_ms),
        };

        let status = if output.status.success() {
            StepStatus::Succeeded
        } else {
            StepStatus::Failed
        };

        StepResult {
            step_name: step.name.clone(),
            status,
            exit_code: Some(output.status.code().unwrap_or(EXIT_CODE_ERROR)),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ExecContext {
        ExecContext::new(".", BTreeMap::new())
    }

    async fn run(step: StepConfig, ctx: &ExecContext) -> StepResult {
        let command = match &step.kind {
            crate::step::StepKind::Run { command } => command.clone(),
            _ => unreachable!("tests only use run steps"),
        };
        ProcessExecutor.execute(&step, &command, ctx).await
    }

    #[test]
    fn step_result_predicates() {
        let skipped = StepResult::skipped("build", SkipReason::Halted);
        assert!(skipped.is_skipped());
        assert!(!skipped.passed());
        assert!(!skipped.failed());
        assert_eq!(skipped.exit_code, None);

        let errored = StepResult::errored("build", "boom", 3);
        assert!(errored.failed());
        assert_eq!(errored.exit_code, Some(EXIT_CODE_ERROR));
        assert_eq!(errored.stderr, "boom");
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let mut result = StepResult::errored("x", "a\nb\nc\nd", 0);
        assert_eq!(result.stderr_tail(2), "c\nd");
        result.stderr = "only".to_string();
        assert_eq!(result.stderr_tail(5), "only");
    }

    #[tokio::test]
    async fn test_execute_simple_command() {
        let result = run(StepConfig::run("echo_test", ["echo", "hello"]), &ctx()).await;
        assert!(result.passed());
        assert_eq!(result.exit_code, Some(0));
        assert!(result.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_execute_failing_command() {
        let result = run(StepConfig::run("false_test", ["false"]), &ctx()).await;
        assert!(result.failed());
        assert_ne!(result.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_step_failure() {
        let result = run(
            StepConfig::run("missing", ["/nonexistent-binary-that-does-not-exist"]),
            &ctx(),
        )
        .await;
        assert!(result.failed());
        assert_eq!(result.exit_code, Some(EXIT_CODE_ERROR));
        assert!(result.stderr.contains("failed to spawn"));
    }

    #[tokio::test]
    async fn test_timeout_is_step_failure() {
        let step = StepConfig::run("sleepy", ["sleep", "5"]).with_timeout(1);
        let result = run(step, &ctx()).await;
        assert!(result.failed());
        assert!(result.stderr.contains("timed out"));
    }

    #[tokio::test]
    async fn test_env_is_applied() {
        let mut env = BTreeMap::new();
        env.insert("STEPLINE_TEST_VAR".to_string(), "always".to_string());
        let ctx = ExecContext::new(".", env);
        let result = run(
            StepConfig::run("env", ["sh", "-c", "echo $STEPLINE_TEST_VAR"]),
            &ctx,
        )
        .await;
        assert!(result.passed());
        assert_eq!(result.stdout.trim(), "always");
    }

    #[tokio::test]
    async fn test_runs_in_workspace_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let ctx = ExecContext::new(dir.path(), BTreeMap::new());
        let result = run(StepConfig::run("ls", ["ls"]), &ctx).await;
        assert!(result.passed());
        assert!(result.stdout.contains("marker.txt"));
    }
}
