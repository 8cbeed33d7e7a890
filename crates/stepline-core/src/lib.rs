//! Stepline Core - sequential CI workflows
//!
//! Provides a pipeline orchestrator that:
//! - Loads workflows (triggers, env, ordered steps) from TOML
//! - Decides from a push / pull-request event whether the workflow runs
//! - Executes steps one after another, halting on the first failure
//! - Records every run into a `RunLedger` and re-evaluates it with a gate

pub mod error;
pub mod gate;
pub mod git;
pub mod identity;
pub mod obs;
pub mod pipeline;
pub mod recording;
pub mod report;
pub mod runner;
pub mod step;
pub mod telemetry;
pub mod trigger;
pub mod workflow;

// Re-export key types
pub use error::{PipelineError, WorkflowError};
pub use gate::{Gate, GateVerdict};
pub use identity::RunIdentity;
pub use pipeline::{Pipeline, PipelineOutcome, PipelineStatus};
pub use recording::{PipelineEvent, RunRecorder};
pub use runner::{ExecContext, ProcessExecutor, SkipReason, StepExecutor, StepResult, StepStatus};
pub use step::{StepConfig, StepKind};
pub use telemetry::init_tracing;
pub use trigger::{EventKind, TriggerEvent, Triggers};
pub use workflow::{Workflow, DEFAULT_BRANCH, DEFAULT_WORKFLOW_FILE};
