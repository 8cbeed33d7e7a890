//! Human-readable rendering of pipeline outcomes and gate verdicts.

use std::fmt::Write;

use crate::gate::GateVerdict;
use crate::pipeline::{PipelineOutcome, PipelineStatus};
use crate::runner::{SkipReason, StepStatus};

/// stderr lines shown for the failing step.
const FAILURE_TAIL_LINES: usize = 10;

/// Render an outcome as the multi-line summary printed by the CLI.
pub fn render_outcome(outcome: &PipelineOutcome) -> String {
    let mut out = String::new();

    if outcome.status == PipelineStatus::NotTriggered {
        let _ = writeln!(
            out,
            "Workflow '{}' not triggered by {}",
            outcome.workflow, outcome.trigger
        );
        return out;
    }

    let status = match outcome.status {
        PipelineStatus::Succeeded => "✓ PASSED",
        _ => "✗ FAILED",
    };
    if let Some(run_id) = &outcome.run_id {
        let _ = writeln!(out, "Run ID: {}", run_id);
    }
    let _ = writeln!(out, "Workflow: {} ({})", outcome.workflow, outcome.trigger);
    let _ = writeln!(out, "Status: {}", status);
    let _ = writeln!(out, "Duration: {}ms", outcome.duration_ms);
    let _ = writeln!(out);

    for step in &outcome.steps {
        let line = match step.status {
            StepStatus::Succeeded => format!(
                "  ✓ {} ({}ms, exit code: {})",
                step.step_name,
                step.duration_ms,
                step.exit_code.unwrap_or_default()
            ),
            StepStatus::Failed => format!(
                "  ✗ {} ({}ms, exit code: {})",
                step.step_name,
                step.duration_ms,
                step.exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "none".to_string())
            ),
            StepStatus::Skipped(SkipReason::Disabled) => {
                format!("  - {} (skipped: disabled)", step.step_name)
            }
            StepStatus::Skipped(SkipReason::Halted) => {
                format!("  - {} (skipped: earlier step failed)", step.step_name)
            }
        };
        let _ = writeln!(out, "{}", line);
    }

    if let Some(failed) = outcome.failed_step() {
        let tail = failed.stderr_tail(FAILURE_TAIL_LINES);
        if !tail.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Output of failed step '{}':", failed.step_name);
            for line in tail.lines() {
                let _ = writeln!(out, "    {}", line);
            }
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Summary: {}/{} steps passed, {} failed, {} skipped",
        outcome.passed_count(),
        outcome.steps.len(),
        outcome.failed_count(),
        outcome.skipped_count()
    );
    out
}

/// Render a gate verdict.
pub fn render_verdict(verdict: &GateVerdict) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Gate: {}",
        if verdict.passed { "✓ PASSED" } else { "✗ FAILED" }
    );
    if !verdict.violations.is_empty() {
        let _ = writeln!(out, "Violations:");
        for violation in &verdict.violations {
            let _ = writeln!(out, "  - {}", violation);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::StepResult;

    fn outcome(status: PipelineStatus, steps: Vec<StepResult>) -> PipelineOutcome {
        PipelineOutcome {
            run_id: Some("run-1".to_string()),
            status,
            workflow: "rust".to_string(),
            trigger: "push:main".to_string(),
            steps,
            duration_ms: 42,
            identity_digest: "d".to_string(),
        }
    }

    #[test]
    fn renders_failure_with_stderr_tail() {
        let mut failed = StepResult::errored("test", "line1\nerror: assertion failed", 5);
        failed.exit_code = Some(101);
        let text = render_outcome(&outcome(
            PipelineStatus::Failed,
            vec![failed, StepResult::skipped("coverage", SkipReason::Halted)],
        ));
        assert!(text.contains("Status: ✗ FAILED"));
        assert!(text.contains("✗ test (5ms, exit code: 101)"));
        assert!(text.contains("coverage (skipped: earlier step failed)"));
        assert!(text.contains("    error: assertion failed"));
        assert!(text.contains("Summary: 0/2 steps passed, 1 failed, 1 skipped"));
    }

    #[test]
    fn renders_not_triggered() {
        let mut o = outcome(PipelineStatus::NotTriggered, vec![]);
        o.run_id = None;
        o.trigger = "push:dev".to_string();
        let text = render_outcome(&o);
        assert_eq!(text.trim(), "Workflow 'rust' not triggered by push:dev");
    }

    #[test]
    fn renders_verdict_violations() {
        let verdict = GateVerdict {
            passed: false,
            violations: vec!["Step 'test' failed with exit code 1".to_string()],
            message: "Gate failed with 1 violation(s)".to_string(),
        };
        let text = render_verdict(&verdict);
        assert!(text.starts_with("Gate: ✗ FAILED"));
        assert!(text.contains("  - Step 'test' failed"));
    }
}
