//! Workflow definition: triggers, environment and the ordered step list.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::WorkflowError;
use crate::step::StepConfig;
use crate::trigger::{TriggerEvent, Triggers};

/// File name looked up in the workspace when no workflow path is given.
pub const DEFAULT_WORKFLOW_FILE: &str = "stepline.toml";

/// Branch the bundled workflow triggers on.
pub const DEFAULT_BRANCH: &str = "main";

/// External tools the bundled workflow installs before building.
pub const DEFAULT_TOOLS: [&str; 2] = ["cargo-nextest", "cargo-llvm-cov"];

/// A CI workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Workflow {
    pub name: String,

    /// Process environment applied to every step.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    pub on: Triggers,

    pub steps: Vec<StepConfig>,
}

impl Workflow {
    /// The bundled Rust workflow: checkout, install tools, build, test, coverage.
    pub fn rust_default(branch: impl Into<String>) -> Self {
        let mut env = BTreeMap::new();
        env.insert("CARGO_TERM_COLOR".to_string(), "always".to_string());

        Self {
            name: "rust".to_string(),
            env,
            on: Triggers::on_branch(branch),
            steps: vec![
                StepConfig::checkout().with_timeout(300),
                StepConfig::install_tools("install-tools", DEFAULT_TOOLS).with_timeout(1800),
                StepConfig::run("build", ["cargo", "build", "--verbose"]).with_timeout(1800),
                StepConfig::run("test", ["cargo", "nextest", "run"]).with_timeout(1800),
                StepConfig::run("coverage", ["cargo", "llvm-cov"]).with_timeout(1800),
            ],
        }
    }

    /// Parse and validate a workflow from TOML.
    pub fn from_toml_str(input: &str) -> Result<Self, WorkflowError> {
        let workflow: Workflow = toml::from_str(input)?;
        workflow.validate()?;
        Ok(workflow)
    }

    /// Read, parse and validate a workflow file.
    pub fn load(path: &Path) -> Result<Self, WorkflowError> {
        let input = std::fs::read_to_string(path).map_err(|source| WorkflowError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    pub fn to_toml_string(&self) -> Result<String, WorkflowError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check the workflow is runnable.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.steps.is_empty() {
            return Err(WorkflowError::NoSteps);
        }
        if self.on.is_empty() {
            return Err(WorkflowError::NoTriggers);
        }
        if let Some(key) = self
            .env
            .keys()
            .find(|k| k.is_empty() || k.contains('=') || k.contains('\0'))
        {
            return Err(WorkflowError::InvalidEnvKey(key.clone()));
        }

        let mut seen = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            step.validate(index)?;
            if !seen.insert(step.name.as_str()) {
                return Err(WorkflowError::DuplicateStep(step.name.clone()));
            }
        }
        Ok(())
    }

    /// Whether `event` triggers this workflow.
    pub fn is_triggered_by(&self, event: &TriggerEvent) -> bool {
        self.on.matches(event)
    }

    pub fn step_names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.name.clone()).collect()
    }

    /// Deterministic, order-sensitive digest of the step list.
    ///
    /// Covers step names and what they execute; timeouts and the enabled
    /// flag are excluded.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for step in &self.steps {
            hasher.update(step.name.as_bytes());
            hasher.update(b"\0");
            // serde_json keeps field order stable for the tagged kind.
            let kind = serde_json::to_vec(&step.kind).unwrap_or_default();
            hasher.update(&kind);
            hasher.update(b"\0");
        }
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepKind;

    const SAMPLE: &str = r#"
name = "ci"

[env]
CARGO_TERM_COLOR = "always"

[on]
push = ["main"]
pull_request = ["main"]

[[steps]]
name = "checkout"
kind = "checkout"

[[steps]]
name = "install-tools"
kind = "install_tools"
tools = ["cargo-nextest", "cargo-llvm-cov"]

[[steps]]
name = "build"
kind = "run"
command = ["cargo", "build", "--verbose"]

[[steps]]
name = "test"
kind = "run"
command = ["cargo", "nextest", "run"]
enabled = false
"#;

    #[test]
    fn default_has_five_steps_in_order() {
        let workflow = Workflow::rust_default("main");
        assert_eq!(
            workflow.step_names(),
            vec!["checkout", "install-tools", "build", "test", "coverage"]
        );
        assert!(matches!(workflow.steps[0].kind, StepKind::Checkout));
        assert!(matches!(
            &workflow.steps[1].kind,
            StepKind::InstallTools { tools } if tools.len() == 2
        ));
        assert_eq!(
            workflow.env.get("CARGO_TERM_COLOR").map(String::as_str),
            Some("always")
        );
        workflow.validate().unwrap();
    }

    #[test]
    fn default_triggers_only_on_named_branch() {
        let workflow = Workflow::rust_default("main");
        assert!(workflow.is_triggered_by(&TriggerEvent::push("main")));
        assert!(workflow.is_triggered_by(&TriggerEvent::pull_request("main")));
        assert!(!workflow.is_triggered_by(&TriggerEvent::push("dev")));
    }

    #[test]
    fn parses_sample_workflow() {
        let workflow = Workflow::from_toml_str(SAMPLE).unwrap();
        assert_eq!(workflow.name, "ci");
        assert_eq!(workflow.steps.len(), 4);
        assert!(!workflow.steps[3].enabled);
        assert_eq!(workflow.on.push, vec!["main"]);
    }

    #[test]
    fn toml_output_parses_back_to_same_workflow() {
        let workflow = Workflow::rust_default("trunk");
        let text = workflow.to_toml_string().unwrap();
        assert_eq!(Workflow::from_toml_str(&text).unwrap(), workflow);
    }

    #[test]
    fn rejects_empty_steps() {
        let err = Workflow::from_toml_str(
            r#"
            name = "x"
            steps = []
            [on]
            push = ["main"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::NoSteps));
    }

    #[test]
    fn rejects_duplicate_step_names() {
        let mut workflow = Workflow::rust_default("main");
        workflow.steps[4].name = "build".to_string();
        assert!(matches!(
            workflow.validate(),
            Err(WorkflowError::DuplicateStep(name)) if name == "build"
        ));
    }

    #[test]
    fn rejects_missing_triggers() {
        let mut workflow = Workflow::rust_default("main");
        workflow.on = Triggers::default();
        assert!(matches!(workflow.validate(), Err(WorkflowError::NoTriggers)));
    }

    #[test]
    fn rejects_bad_env_key() {
        let mut workflow = Workflow::rust_default("main");
        workflow.env.insert("A=B".to_string(), "x".to_string());
        assert!(matches!(
            workflow.validate(),
            Err(WorkflowError::InvalidEnvKey(_))
        ));
    }

    #[test]
    fn rejects_unknown_step_kind() {
        let err = Workflow::from_toml_str(
            r#"
            name = "x"
            [on]
            push = ["main"]
            [[steps]]
            name = "deploy"
            kind = "deploy"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::Parse(_)));
    }

    #[test]
    fn digest_deterministic_and_order_sensitive() {
        let a = Workflow::rust_default("main");
        let b = Workflow::rust_default("main");
        assert_eq!(a.digest(), b.digest());

        let mut swapped = Workflow::rust_default("main");
        swapped.steps.swap(2, 3);
        assert_ne!(a.digest(), swapped.digest());
    }

    #[test]
    fn digest_ignores_timeouts() {
        let a = Workflow::rust_default("main");
        let mut b = Workflow::rust_default("main");
        b.steps[2].timeout_secs = 1;
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Workflow::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, WorkflowError::Read { .. }));
    }

    #[test]
    fn repository_workflow_matches_default() {
        let workflow = Workflow::from_toml_str(include_str!("../../../stepline.toml")).unwrap();
        assert_eq!(workflow, Workflow::rust_default(DEFAULT_BRANCH));
    }
}
