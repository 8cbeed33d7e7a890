//! Sequential pipeline orchestration and run recording.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use stepline_state::RunLedger;
use tracing::{info, Instrument};

use crate::error::{PipelineError, Result};
use crate::identity::RunIdentity;
use crate::obs;
use crate::recording::{PipelineEvent, RunRecorder};
use crate::runner::{ExecContext, SkipReason, StepExecutor, StepResult};
use crate::trigger::TriggerEvent;
use crate::workflow::Workflow;

/// Lines of stderr kept in `step_failed` events.
const STDERR_TAIL_LINES: usize = 20;

/// Overall result of a pipeline invocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Every enabled step succeeded.
    Succeeded,
    /// A step failed; later steps were skipped.
    Failed,
    /// The event did not match the workflow triggers.
    NotTriggered,
}

/// Result of a pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutcome {
    /// Ledger run ID (`None` when not triggered).
    pub run_id: Option<String>,

    pub status: PipelineStatus,

    pub workflow: String,

    /// Trigger description, e.g. `push:main`.
    pub trigger: String,

    /// One result per declared step, in declaration order.
    pub steps: Vec<StepResult>,

    /// Total duration in milliseconds.
    pub duration_ms: u64,

    /// Digest of the run identity.
    pub identity_digest: String,
}

impl PipelineOutcome {
    pub fn success(&self) -> bool {
        self.status == PipelineStatus::Succeeded
    }

    /// Number of steps that passed.
    pub fn passed_count(&self) -> usize {
        self.steps.iter().filter(|s| s.passed()).count()
    }

    /// Number of steps that failed.
    pub fn failed_count(&self) -> usize {
        self.steps.iter().filter(|s| s.failed()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.steps.iter().filter(|s| s.is_skipped()).count()
    }

    /// The step that halted the pipeline, if any.
    pub fn failed_step(&self) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.failed())
    }
}

/// Pipeline orchestrator.
pub struct Pipeline;

impl Pipeline {
    /// Run `workflow` for `event` and record it into the ledger.
    ///
    /// Steps run strictly one after another. The first failing step halts
    /// the pipeline: every later step is recorded as skipped and never
    /// executed. An event that doesn't match the workflow triggers runs
    /// nothing and records nothing.
    ///
    /// Step failures are reported in the outcome; `Err` is returned only for
    /// an invalid workflow or a ledger failure.
    pub async fn run(
        ledger: Arc<dyn RunLedger>,
        executor: &dyn StepExecutor,
        workflow: &Workflow,
        event: &TriggerEvent,
        identity: &RunIdentity,
    ) -> Result<PipelineOutcome> {
        let start = Instant::now();
        workflow.validate()?;

        let identity_digest = identity.digest();
        let trigger = event.describe();

        if !workflow.is_triggered_by(event) {
            obs::emit_not_triggered(&workflow.name, &trigger);
            return Ok(PipelineOutcome {
                run_id: None,
                status: PipelineStatus::NotTriggered,
                workflow: workflow.name.clone(),
                trigger,
                steps: Vec::new(),
                duration_ms: start.elapsed().as_millis() as u64,
                identity_digest: identity_digest.to_string(),
            });
        }

        let metadata = identity.metadata(workflow, event);
        let mut recorder = RunRecorder::start(ledger, &identity_digest, metadata).await?;
        let run_id = recorder.run_id().to_string();
        let span = obs::run_span(&run_id);

        info!(
            run_id = %run_id,
            workflow = %workflow.name,
            trigger = %trigger,
            identity = %identity_digest.short(),
            "Starting pipeline"
        );

        let (results, halted) = async {
            recorder
                .record(&PipelineEvent::PipelineStarted {
                    workflow: workflow.name.clone(),
                    trigger: trigger.clone(),
                    steps: workflow.step_names(),
                })
                .await?;

            let ctx = ExecContext::new(identity.workspace_path.clone(), workflow.env.clone());
            let mut results = Vec::with_capacity(workflow.steps.len());
            let mut halted = false;

            for (index, step) in workflow.steps.iter().enumerate() {
                let skip = if halted {
                    Some(SkipReason::Halted)
                } else if !step.enabled {
                    Some(SkipReason::Disabled)
                } else {
                    None
                };

                if let Some(reason) = skip {
                    let result = StepResult::skipped(&step.name, reason);
                    obs::emit_step_skipped(&run_id, &step.name, skip_label(reason));
                    recorder
                        .record(&PipelineEvent::StepSkipped {
                            step: step.name.clone(),
                            index,
                            reason,
                        })
                        .await?;
                    results.push(result);
                    continue;
                }

                let command = step.resolve_command(event);
                obs::emit_step_started(&run_id, &step.name, index);
                recorder
                    .record(&PipelineEvent::StepStarted {
                        step: step.name.clone(),
                        index,
                        command: command.clone(),
                    })
                    .await?;

                let result = executor.execute(step, &command, &ctx).await;
                obs::emit_step_finished(
                    &run_id,
                    &step.name,
                    result.exit_code,
                    result.duration_ms,
                    result.passed(),
                );

                let exit_code = result.exit_code.unwrap_or(crate::runner::EXIT_CODE_ERROR);
                if result.passed() {
                    recorder
                        .record(&PipelineEvent::StepSucceeded {
                            step: step.name.clone(),
                            index,
                            exit_code,
                            duration_ms: result.duration_ms,
                        })
                        .await?;
                } else {
                    halted = true;
                    recorder
                        .record(&PipelineEvent::StepFailed {
                            step: step.name.clone(),
                            index,
                            exit_code,
                            duration_ms: result.duration_ms,
                            stderr_tail: result.stderr_tail(STDERR_TAIL_LINES),
                        })
                        .await?;
                }
                results.push(result);
            }
            Ok::<_, PipelineError>((results, halted))
        }
        .instrument(span)
        .await?;

        let success = !halted;
        let duration_ms = start.elapsed().as_millis() as u64;
        recorder
            .record(&PipelineEvent::PipelineFinished {
                success,
                duration_ms,
            })
            .await?;
        recorder.finish(success, duration_ms).await?;

        if success {
            info!(run_id = %run_id, "Pipeline completed successfully");
        } else {
            info!(run_id = %run_id, "Pipeline failed");
        }

        Ok(PipelineOutcome {
            run_id: Some(run_id),
            status: if success {
                PipelineStatus::Succeeded
            } else {
                PipelineStatus::Failed
            },
            workflow: workflow.name.clone(),
            trigger,
            steps: results,
            duration_ms,
            identity_digest: identity_digest.to_string(),
        })
    }
}

fn skip_label(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::Disabled => "disabled",
        SkipReason::Halted => "halted",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::StepStatus;

    fn step(name: &str, status: StepStatus) -> StepResult {
        StepResult {
            step_name: name.to_string(),
            status,
            exit_code: Some(if status == StepStatus::Succeeded { 0 } else { 1 }),
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 100,
        }
    }

    fn outcome(status: PipelineStatus, steps: Vec<StepResult>) -> PipelineOutcome {
        PipelineOutcome {
            run_id: Some("run123".to_string()),
            status,
            workflow: "ci".to_string(),
            trigger: "push:main".to_string(),
            steps,
            duration_ms: 300,
            identity_digest: "abc123".to_string(),
        }
    }

    #[test]
    fn test_outcome_counts() {
        let result = outcome(
            PipelineStatus::Succeeded,
            vec![
                step("build", StepStatus::Succeeded),
                step("test", StepStatus::Succeeded),
            ],
        );

        assert_eq!(result.passed_count(), 2);
        assert_eq!(result.failed_count(), 0);
        assert!(result.success());
        assert!(result.failed_step().is_none());
    }

    #[test]
    fn test_outcome_with_failure() {
        let result = outcome(
            PipelineStatus::Failed,
            vec![
                step("build", StepStatus::Succeeded),
                step("test", StepStatus::Failed),
                StepResult::skipped("coverage", SkipReason::Halted),
            ],
        );

        assert_eq!(result.passed_count(), 1);
        assert_eq!(result.failed_count(), 1);
        assert_eq!(result.skipped_count(), 1);
        assert!(!result.success());
        assert_eq!(result.failed_step().map(|s| s.step_name.as_str()), Some("test"));
    }

    #[test]
    fn test_skip_labels_match_serde() {
        for reason in [SkipReason::Disabled, SkipReason::Halted] {
            assert_eq!(
                serde_json::to_value(reason).unwrap(),
                serde_json::Value::String(skip_label(reason).to_string())
            );
        }
    }
}
