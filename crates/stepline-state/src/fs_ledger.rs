use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::StorageError;
use crate::storage_traits::*;

const RECORD_FILE: &str = "run.json";
const EVENTS_FILE: &str = "events.jsonl";

/// Filesystem-backed run ledger.
///
/// Layout: `<root>/<run_id>/run.json` holds the [`RunRecord`] and
/// `<root>/<run_id>/events.jsonl` holds one [`RunEvent`] per line.
#[derive(Debug)]
pub struct FsRunLedger {
    root: PathBuf,
    // Serializes read-modify-write of run records within this process.
    write_lock: Mutex<()>,
}

impl FsRunLedger {
    /// Open a ledger rooted at `root`, creating the directory if needed.
    pub fn open(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Directory this ledger stores runs in.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of one run. The id must be a single plain path component.
    fn run_dir(&self, run_id: &RunId) -> StorageResult<PathBuf> {
        let mut components = Path::new(&run_id.0).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.root.join(&run_id.0)),
            _ => Err(StorageError::InvalidRunId {
                run_id: run_id.0.clone(),
            }),
        }
    }

    fn read_record(&self, run_id: &RunId) -> StorageResult<RunRecord> {
        let path = self.run_dir(run_id)?.join(RECORD_FILE);
        let bytes = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::RunNotFound {
                    run_id: run_id.0.clone(),
                }
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write_record(&self, record: &RunRecord) -> StorageResult<()> {
        let dir = self.run_dir(&record.run_id)?;
        fs::create_dir_all(&dir)?;

        // Atomic write: temp file in the same directory, then rename.
        let mut tmp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, record)?;
        tmp.flush()?;
        tmp.persist(dir.join(RECORD_FILE)).map_err(|e| e.error)?;
        Ok(())
    }

    fn finish(&self, run_id: &RunId, status: RunStatus, summary: RunSummary) -> StorageResult<()> {
        let _guard = self.write_lock.lock().unwrap();
        let mut record = self.read_record(run_id)?;
        record.finish(status, summary)?;
        self.write_record(&record)?;
        debug!(run_id = %run_id, status = ?record.status, "run finalized");
        Ok(())
    }
}

#[async_trait]
impl RunLedger for FsRunLedger {
    async fn create_run(
        &self,
        identity_digest: &ContentDigest,
        metadata: RunMetadata,
    ) -> StorageResult<RunId> {
        let _guard = self.write_lock.lock().unwrap();
        let run_id = RunId::new();
        let record = RunRecord::running(run_id.clone(), identity_digest, metadata);
        self.write_record(&record)?;
        fs::File::create(self.run_dir(&run_id)?.join(EVENTS_FILE))?;
        Ok(run_id)
    }

    async fn append_event(&self, run_id: &RunId, event: RunEvent) -> StorageResult<()> {
        let _guard = self.write_lock.lock().unwrap();
        self.read_record(run_id)?.ensure_running()?;

        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(self.run_dir(run_id)?.join(EVENTS_FILE))?;
        file.write_all(&line)?;
        Ok(())
    }

    async fn complete_run(&self, run_id: &RunId, summary: RunSummary) -> StorageResult<()> {
        self.finish(run_id, RunStatus::Completed, summary)
    }

    async fn fail_run(&self, run_id: &RunId, summary: RunSummary) -> StorageResult<()> {
        self.finish(run_id, RunStatus::Failed, summary)
    }

    async fn cancel_run(&self, run_id: &RunId, summary: RunSummary) -> StorageResult<()> {
        self.finish(run_id, RunStatus::Cancelled, summary)
    }

    async fn get_run(&self, run_id: &RunId) -> StorageResult<RunRecord> {
        self.read_record(run_id)
    }

    async fn get_events(&self, run_id: &RunId) -> StorageResult<Vec<RunEvent>> {
        // Existence check gives RunNotFound rather than a bare I/O error.
        self.read_record(run_id)?;

        let path = self.run_dir(run_id)?.join(EVENTS_FILE);
        let file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut events = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str::<RunEvent>(&line)?);
        }
        events.sort_by_key(|e| e.seq);
        Ok(events)
    }

    async fn list_runs(
        &self,
        identity_digest: Option<&ContentDigest>,
    ) -> StorageResult<Vec<RunRecord>> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let run_id = RunId(entry.file_name().to_string_lossy().into_owned());
            let record = match self.read_record(&run_id) {
                Ok(r) => r,
                Err(StorageError::RunNotFound { .. }) => continue,
                Err(e) => return Err(e),
            };
            if identity_digest.map(|d| record.identity_digest == *d).unwrap_or(true) {
                records.push(record);
            }
        }
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }
}
