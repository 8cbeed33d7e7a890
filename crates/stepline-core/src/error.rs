//! Error taxonomy for workflow loading and pipeline execution.
//!
//! A failing step is not an error: it is reported through
//! [`StepStatus::Failed`](crate::runner::StepStatus). These types cover
//! everything that prevents the pipeline from running or being recorded.

use std::path::PathBuf;

use stepline_state::StorageError;

/// Errors produced while loading or validating a workflow.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("failed to read workflow {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse workflow: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize workflow: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("workflow has no steps")]
    NoSteps,

    #[error("step #{index} has an empty name")]
    EmptyStepName { index: usize },

    #[error("duplicate step name: {0}")]
    DuplicateStep(String),

    #[error("step '{0}' has an empty command")]
    EmptyCommand(String),

    #[error("step '{0}' has no tools or a blank tool name")]
    NoTools(String),

    #[error("workflow has no trigger branches")]
    NoTriggers,

    #[error("invalid env key: {0:?}")]
    InvalidEnvKey(String),

    #[error("unknown event kind: {0}")]
    UnknownEvent(String),
}

/// Errors that abort a pipeline run as a whole.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid workflow: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("ledger error: {0}")]
    Storage(#[from] StorageError),

    #[error("git error: {0}")]
    Git(String),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
