//! Run identity.

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use stepline_state::{ContentDigest, RunMetadata};

use crate::trigger::TriggerEvent;
use crate::workflow::Workflow;

/// Identity of a pipeline run.
///
/// Two runs with the same identity executed the same steps against the same
/// commit with the same toolchain; the ledger groups runs by its digest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunIdentity {
    /// Workspace root path.
    pub workspace_path: PathBuf,

    /// Name of the workflow.
    pub workflow_name: String,

    /// SHA-256 digest of the ordered step list.
    pub workflow_digest: String,

    /// Git commit SHA where execution occurred.
    pub git_sha: String,

    /// Active toolchain description (`rustup show active-toolchain`).
    pub toolchain: String,
}

impl RunIdentity {
    pub fn new(
        workspace_path: PathBuf,
        workflow: &Workflow,
        git_sha: String,
        toolchain: String,
    ) -> Self {
        Self {
            workspace_path,
            workflow_name: workflow.name.clone(),
            workflow_digest: workflow.digest(),
            git_sha,
            toolchain,
        }
    }

    /// Digest the ledger indexes runs by.
    pub fn digest(&self) -> ContentDigest {
        let mut hasher = Sha256::new();
        for part in [
            self.workflow_digest.as_str(),
            self.git_sha.as_str(),
            self.toolchain.as_str(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update(b"\0");
        }
        ContentDigest::from_bytes(hex::encode(hasher.finalize()).as_bytes())
    }

    /// Metadata recorded with the run.
    pub fn metadata(&self, workflow: &Workflow, event: &TriggerEvent) -> RunMetadata {
        RunMetadata {
            git_sha: Some(self.git_sha.clone()),
            workflow_name: self.workflow_name.clone(),
            trigger: event.describe(),
            tags: json!({
                "steps": workflow.step_names(),
                "workspace": self.workspace_path.to_string_lossy(),
                "toolchain": &self.toolchain,
                "workflow_digest": &self.workflow_digest,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(sha: &str) -> RunIdentity {
        RunIdentity::new(
            PathBuf::from("."),
            &Workflow::rust_default("main"),
            sha.to_string(),
            "stable-x86_64-unknown-linux-gnu".to_string(),
        )
    }

    #[test]
    fn test_identity_new() {
        let id = identity("abc123");
        assert_eq!(id.workspace_path, PathBuf::from("."));
        assert_eq!(id.workflow_name, "rust");
        assert_eq!(id.git_sha, "abc123");
        assert_eq!(id.workflow_digest, Workflow::rust_default("main").digest());
    }

    #[test]
    fn test_digest_deterministic() {
        assert_eq!(identity("abc").digest(), identity("abc").digest());
    }

    #[test]
    fn test_digest_depends_on_commit() {
        assert_ne!(identity("abc").digest(), identity("def").digest());
    }

    #[test]
    fn test_metadata_lists_steps() {
        let workflow = Workflow::rust_default("main");
        let id = identity("abc");
        let meta = id.metadata(&workflow, &TriggerEvent::push("main"));
        assert_eq!(meta.trigger, "push:main");
        assert_eq!(meta.git_sha.as_deref(), Some("abc"));
        assert_eq!(meta.tags["steps"].as_array().map(|s| s.len()), Some(5));
        assert_eq!(meta.tags["steps"][0], "checkout");
    }
}
