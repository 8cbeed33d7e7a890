//! Repository events and the trigger rules that decide whether a workflow runs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

/// Pattern that matches every branch.
pub const ANY_BRANCH: &str = "*";

/// Kind of repository event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Push,
    PullRequest,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Push => "push",
            EventKind::PullRequest => "pull_request",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "push" => Ok(EventKind::Push),
            "pull_request" | "pull-request" | "pr" => Ok(EventKind::PullRequest),
            other => Err(WorkflowError::UnknownEvent(other.to_string())),
        }
    }
}

/// A repository event that may trigger a workflow.
///
/// For pull requests `branch` is the base branch the request targets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriggerEvent {
    pub kind: EventKind,
    pub branch: String,
    pub commit: Option<String>,
}

impl TriggerEvent {
    pub fn new(kind: EventKind, branch: impl Into<String>) -> Self {
        Self {
            kind,
            branch: normalize_branch(&branch.into()),
            commit: None,
        }
    }

    pub fn push(branch: impl Into<String>) -> Self {
        Self::new(EventKind::Push, branch)
    }

    pub fn pull_request(base_branch: impl Into<String>) -> Self {
        Self::new(EventKind::PullRequest, base_branch)
    }

    /// Pin the event to a specific commit.
    pub fn with_commit(mut self, sha: impl Into<String>) -> Self {
        self.commit = Some(sha.into());
        self
    }

    /// Short form used in run metadata and logs, e.g. `push:main`.
    pub fn describe(&self) -> String {
        format!("{}:{}", self.kind, self.branch)
    }
}

/// Branches that trigger a workflow, per event kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Triggers {
    #[serde(default)]
    pub push: Vec<String>,

    #[serde(default)]
    pub pull_request: Vec<String>,
}

impl Triggers {
    /// Trigger on pushes and pull requests targeting `branch`.
    pub fn on_branch(branch: impl Into<String>) -> Self {
        let branch = branch.into();
        Self {
            push: vec![branch.clone()],
            pull_request: vec![branch],
        }
    }

    pub fn branches(&self, kind: EventKind) -> &[String] {
        match kind {
            EventKind::Push => &self.push,
            EventKind::PullRequest => &self.pull_request,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.push.is_empty() && self.pull_request.is_empty()
    }

    /// Whether `event` should run the workflow.
    pub fn matches(&self, event: &TriggerEvent) -> bool {
        let branch = normalize_branch(&event.branch);
        self.branches(event.kind)
            .iter()
            .any(|pattern| pattern == ANY_BRANCH || normalize_branch(pattern) == branch)
    }
}

fn normalize_branch(branch: &str) -> String {
    branch
        .trim()
        .trim_start_matches("refs/heads/")
        .to_string()
}
