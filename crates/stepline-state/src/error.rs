//! Error types for stepline-state

use thiserror::Error;

/// Errors that can occur in the run ledger
#[derive(Error, Debug)]
pub enum StorageError {
    /// No run with this ID exists
    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    /// Operation not allowed in the run's current status
    #[error("Run {run_id} is {status}, expected {expected}")]
    InvalidRunState {
        run_id: String,
        status: String,
        expected: String,
    },

    /// Run ID cannot name a run directory
    #[error("Invalid run ID: {run_id:?}")]
    InvalidRunId { run_id: String },

    /// Digest string is not 64 hex characters
    #[error("Invalid digest: {digest}")]
    InvalidDigest { digest: String },

    /// Filesystem error
    #[error("Ledger I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
