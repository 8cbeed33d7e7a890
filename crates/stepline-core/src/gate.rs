//! Gate evaluation over a recorded run.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use stepline_state::RunEvent;

use crate::recording::PipelineEvent;
use crate::runner::SkipReason;

/// Gate evaluation verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateVerdict {
    /// Whether the gate passed.
    pub passed: bool,

    /// Violations that caused failure (empty if passed).
    pub violations: Vec<String>,

    /// Summary message.
    pub message: String,
}

/// Gate rules for a recorded pipeline run.
pub struct Gate;

impl Gate {
    /// Evaluate the events of a run against the declared step order.
    ///
    /// Gate rules:
    /// - Every `step_started` is followed by that step's `step_succeeded`
    ///   or `step_failed` before anything else starts
    /// - No step starts after a step has failed
    /// - Any `step_failed` is a violation
    /// - Each declared step has exactly one result, in declared order
    ///   (skipped counts as a result)
    /// - A non-empty run ends with `pipeline_finished`, and nothing is
    ///   recorded after it
    ///
    /// Pass an empty `expected_steps` to skip the declared-order checks.
    pub fn evaluate(events: &[RunEvent], expected_steps: &[String]) -> GateVerdict {
        let mut violations = Vec::new();

        let mut running: Option<String> = None;
        let mut failure_seen = false;
        let mut finished = false;
        let mut results: Vec<String> = Vec::new();

        for event in events {
            if finished {
                violations.push(format!(
                    "Event '{}' at seq {} recorded after the run finished",
                    event.kind, event.seq
                ));
            }
            let Some(decoded) = PipelineEvent::from_run_event(event) else {
                violations.push(format!(
                    "Unrecognized event '{}' at seq {}",
                    event.kind, event.seq
                ));
                continue;
            };

            match decoded {
                PipelineEvent::PipelineStarted { .. } => {}
                PipelineEvent::StepStarted { step, .. } => {
                    if let Some(open) = &running {
                        violations.push(format!(
                            "Step '{}' started while '{}' was still running",
                            step, open
                        ));
                    }
                    if failure_seen {
                        violations.push(format!("Step '{}' started after a failed step", step));
                    }
                    running = Some(step);
                }
                PipelineEvent::StepSucceeded { step, .. } => {
                    close_step(&mut running, &step, &mut violations);
                    results.push(step);
                }
                PipelineEvent::StepFailed {
                    step, exit_code, ..
                } => {
                    close_step(&mut running, &step, &mut violations);
                    violations.push(format!(
                        "Step '{}' failed with exit code {}",
                        step, exit_code
                    ));
                    failure_seen = true;
                    results.push(step);
                }
                PipelineEvent::StepSkipped { step, reason, .. } => {
                    if reason == SkipReason::Halted && !failure_seen {
                        violations.push(format!(
                            "Step '{}' skipped as halted but no step failed",
                            step
                        ));
                    }
                    results.push(step);
                }
                PipelineEvent::PipelineFinished { success, .. } => {
                    if success && failure_seen {
                        violations.push(
                            "Pipeline reported success despite a failed step".to_string(),
                        );
                    }
                    finished = true;
                }
            }
        }

        if let Some(open) = running {
            violations.push(format!("Step '{}' was started but never completed", open));
        }
        if !events.is_empty() && !finished {
            violations.push("Run never finished".to_string());
        }

        if !expected_steps.is_empty() {
            check_declared_order(&results, expected_steps, &mut violations);
        }

        let passed = violations.is_empty();
        let message = if passed {
            "All steps passed".to_string()
        } else {
            format!("Gate failed with {} violation(s)", violations.len())
        };

        GateVerdict {
            passed,
            violations,
            message,
        }
    }
}

fn close_step(running: &mut Option<String>, step: &str, violations: &mut Vec<String>) {
    match running.take() {
        Some(open) if open == step => {}
        _ => violations.push(format!("Step '{}' finished without being started", step)),
    }
}

fn check_declared_order(results: &[String], expected: &[String], violations: &mut Vec<String>) {
    let mut seen = HashSet::new();
    for step in results {
        if !seen.insert(step.as_str()) {
            violations.push(format!("Step '{}' has more than one result", step));
        }
        if !expected.contains(step) {
            violations.push(format!("Step '{}' is not declared in the workflow", step));
        }
    }
    for step in expected {
        if !seen.contains(step.as_str()) {
            violations.push(format!("Step '{}' has no result", step));
        }
    }

    let recorded: Vec<&String> = results.iter().filter(|s| expected.contains(*s)).collect();
    let declared: Vec<&String> = expected.iter().filter(|s| results.contains(*s)).collect();
    if recorded != declared {
        violations.push("Steps were recorded out of declared order".to_string());
    }
}
