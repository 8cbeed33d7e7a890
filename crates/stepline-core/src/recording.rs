//! Pipeline lifecycle adapter: bridges typed [`PipelineEvent`]s to `RunLedger` persistence.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use stepline_state::{
    ContentDigest, RunEvent, RunId, RunLedger, RunMetadata, RunSummary, StorageResult,
};

use crate::runner::SkipReason;

/// Lifecycle events recorded for every pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    PipelineStarted {
        workflow: String,
        trigger: String,
        steps: Vec<String>,
    },
    StepStarted {
        step: String,
        index: usize,
        command: Vec<String>,
    },
    StepSucceeded {
        step: String,
        index: usize,
        exit_code: i32,
        duration_ms: u64,
    },
    StepFailed {
        step: String,
        index: usize,
        exit_code: i32,
        duration_ms: u64,
        stderr_tail: String,
    },
    StepSkipped {
        step: String,
        index: usize,
        reason: SkipReason,
    },
    PipelineFinished {
        success: bool,
        duration_ms: u64,
    },
}

impl PipelineEvent {
    /// The `kind` string stored in the ledger.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineEvent::PipelineStarted { .. } => "pipeline_started",
            PipelineEvent::StepStarted { .. } => "step_started",
            PipelineEvent::StepSucceeded { .. } => "step_succeeded",
            PipelineEvent::StepFailed { .. } => "step_failed",
            PipelineEvent::StepSkipped { .. } => "step_skipped",
            PipelineEvent::PipelineFinished { .. } => "pipeline_finished",
        }
    }

    /// Decode a stored ledger event. Returns `None` for unknown kinds.
    pub fn from_run_event(event: &RunEvent) -> Option<Self> {
        serde_json::from_value(event.payload.clone()).ok()
    }
}

/// Records pipeline events into a [`RunLedger`] with monotonically
/// increasing sequence numbers.
///
/// Usage:
/// 1. [`RunRecorder::start`] creates the run.
/// 2. [`RunRecorder::record`] appends each event.
/// 3. [`RunRecorder::finish`] finalizes it as completed or failed.
pub struct RunRecorder {
    ledger: Arc<dyn RunLedger>,
    run_id: RunId,
    next_seq: u64,
}

impl RunRecorder {
    /// Start a new run in the ledger, returning a recorder bound to that run.
    pub async fn start(
        ledger: Arc<dyn RunLedger>,
        identity_digest: &ContentDigest,
        metadata: RunMetadata,
    ) -> StorageResult<Self> {
        let run_id = ledger.create_run(identity_digest, metadata.clone()).await?;
        crate::obs::emit_run_started(run_id.to_string().as_str(), &metadata.workflow_name);
        Ok(Self {
            ledger,
            run_id,
            next_seq: 1,
        })
    }

    /// Append one event to the run.
    pub async fn record(&mut self, event: &PipelineEvent) -> StorageResult<()> {
        let seq = self.next_seq;
        let run_event = RunEvent {
            seq,
            kind: event.kind().to_string(),
            payload: serde_json::to_value(event)?,
            timestamp: Utc::now(),
        };
        self.ledger.append_event(&self.run_id, run_event).await?;
        self.next_seq += 1;
        Ok(())
    }

    /// Number of events recorded so far.
    pub fn events_recorded(&self) -> u64 {
        self.next_seq - 1
    }

    /// Finalize the run as completed (`success`) or failed.
    pub async fn finish(self, success: bool, duration_ms: u64) -> StorageResult<()> {
        let summary = RunSummary {
            total_events: self.events_recorded(),
            duration_ms,
            success,
        };
        crate::obs::emit_run_finished(
            &self.run_id.to_string(),
            duration_ms,
            summary.total_events,
            success,
        );
        if success {
            self.ledger.complete_run(&self.run_id, summary).await
        } else {
            self.ledger.fail_run(&self.run_id, summary).await
        }
    }

    /// Return a reference to the run ID.
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }
}
