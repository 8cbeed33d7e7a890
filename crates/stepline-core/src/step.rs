//! Workflow step definitions and command resolution.

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::trigger::TriggerEvent;

/// Default per-step timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 3600;

/// What a step does.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
    /// Check out the triggering commit in the workspace.
    Checkout,

    /// cargo install --locked <tools>
    InstallTools { tools: Vec<String> },

    /// Arbitrary command (first element is the executable).
    Run { command: Vec<String> },
}

/// Configuration for a workflow step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepConfig {
    /// Human-readable step name, unique within the workflow.
    pub name: String,

    #[serde(flatten)]
    pub kind: StepKind,

    /// Timeout in seconds (0 disables the timeout).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Whether this step is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_enabled() -> bool {
    true
}

impl StepConfig {
    pub fn new(name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            name: name.into(),
            kind,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            enabled: true,
        }
    }

    pub fn checkout() -> Self {
        Self::new("checkout", StepKind::Checkout)
    }

    pub fn install_tools<I, S>(name: impl Into<String>, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            StepKind::InstallTools {
                tools: tools.into_iter().map(Into::into).collect(),
            },
        )
    }

    pub fn run<I, S>(name: impl Into<String>, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            StepKind::Run {
                command: command.into_iter().map(Into::into).collect(),
            },
        )
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Disable this step.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Resolve the argv executed for this step.
    pub fn resolve_command(&self, event: &TriggerEvent) -> Vec<String> {
        match &self.kind {
            // Without a pinned commit the branch stays checked out.
            StepKind::Checkout => match event.commit.as_deref() {
                Some(sha) => vec![
                    "git".to_string(),
                    "checkout".to_string(),
                    "--detach".to_string(),
                    sha.to_string(),
                ],
                None => vec![
                    "git".to_string(),
                    "checkout".to_string(),
                    "HEAD".to_string(),
                ],
            },
            StepKind::InstallTools { tools } => {
                let mut command = vec![
                    "cargo".to_string(),
                    "install".to_string(),
                    "--locked".to_string(),
                ];
                command.extend(tools.iter().cloned());
                command
            }
            StepKind::Run { command } => command.clone(),
        }
    }

    /// Check the step is well-formed.
    pub fn validate(&self, index: usize) -> Result<(), WorkflowError> {
        if self.name.trim().is_empty() {
            return Err(WorkflowError::EmptyStepName { index });
        }
        match &self.kind {
            StepKind::Checkout => Ok(()),
            StepKind::InstallTools { tools } => {
                if tools.is_empty() || tools.iter().any(|t| t.trim().is_empty()) {
                    Err(WorkflowError::NoTools(self.name.clone()))
                } else {
                    Ok(())
                }
            }
            StepKind::Run { command } => match command.first() {
                Some(exe) if !exe.trim().is_empty() => Ok(()),
                _ => Err(WorkflowError::EmptyCommand(self.name.clone())),
            },
        }
    }
}
