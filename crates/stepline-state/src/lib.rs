//! Stepline-State: run ledger persistence for Stepline
//!
//! This crate owns everything a pipeline run leaves behind: the run record,
//! its ordered event log and the final summary.
//!
//! ## Key Components
//!
//! - `RunLedger`: backend-agnostic async trait for run persistence
//! - `FsRunLedger`: JSON files on disk, one directory per run
//! - `fakes::MemoryRunLedger`: in-memory ledger for tests

mod error;
pub mod fakes;
mod fs_ledger;
pub mod storage_traits;

pub use error::StorageError;
pub use fs_ledger::FsRunLedger;
pub use storage_traits::{
    ContentDigest, RunEvent, RunId, RunLedger, RunMetadata, RunRecord, RunStatus, RunSummary,
    StorageResult,
};
