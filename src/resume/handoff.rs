//! Local hand-off file
//!
//! Outside the function host there is nobody to start the next invocation, so
//! local runs write the continuation payload to a file instead and the next
//! local `run` claims it. A claimed payload is only dropped once that run
//! succeeds. Writes are atomic (temp file + rename) and guarded by an fd-lock
//! on a sibling `.lock` file.

use super::payload::MAX_PAYLOAD_BYTES;
use super::{Reinvoker, ResumeError};
use async_trait::async_trait;
use fd_lock::RwLock;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File name of the pending continuation inside the hand-off directory
pub const HANDOFF_FILE_NAME: &str = "continuation.json";

/// File name of a continuation claimed by a run that has not completed yet
pub const CLAIMED_FILE_NAME: &str = "continuation.claimed.json";

/// Reinvoker that parks the payload in a hand-off directory
#[derive(Debug, Clone)]
pub struct HandoffFileReinvoker {
    dir: PathBuf,
}

impl HandoffFileReinvoker {
    /// Use `dir` as the hand-off directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the pending continuation file
    pub fn path(&self) -> PathBuf {
        self.dir.join(HANDOFF_FILE_NAME)
    }

    /// Whether a continuation is waiting to be picked up
    pub fn has_pending(&self) -> bool {
        self.path().exists()
    }

    /// Atomically write `payload` as the pending continuation
    pub fn save(&self, payload: &[u8]) -> Result<(), ResumeError> {
        let path = self.path();
        debug!(path = %path.display(), bytes = payload.len(), "Saving hand-off file");

        std::fs::create_dir_all(&self.dir).map_err(|e| ResumeError::IoError(e.to_string()))?;

        let mut lock = RwLock::new(open_lock_file(&path)?);
        let _guard = lock
            .write()
            .map_err(|e| ResumeError::LockError(format!("Failed to acquire write lock: {e}")))?;

        let mut temp_file = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| ResumeError::IoError(format!("Failed to create temp file: {e}")))?;
        temp_file
            .write_all(payload)
            .map_err(|e| ResumeError::IoError(format!("Failed to write to temp file: {e}")))?;
        temp_file
            .flush()
            .map_err(|e| ResumeError::IoError(format!("Failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| ResumeError::IoError(format!("Failed to sync temp file: {e}")))?;
        temp_file
            .persist(&path)
            .map_err(|e| ResumeError::IoError(format!("Failed to persist temp file: {e}")))?;

        if let Ok(dir) = File::open(&self.dir) {
            let _ = dir.sync_all();
        }

        info!(path = %path.display(), "Continuation parked in hand-off file");
        Ok(())
    }

    /// Path a claimed continuation is kept at until its run completes
    pub fn claimed_path(&self) -> PathBuf {
        self.dir.join(CLAIMED_FILE_NAME)
    }

    /// Claim the continuation for the next run
    ///
    /// A pending continuation moves to [`claimed_path`](Self::claimed_path)
    /// and stays there until [`complete`](Self::complete). With nothing
    /// pending, a claim left by a run that never completed is returned again.
    pub fn claim(&self) -> Result<Option<Vec<u8>>, ResumeError> {
        let pending = self.path();
        let claimed = self.claimed_path();
        if !pending.exists() && !claimed.exists() {
            debug!(path = %pending.display(), "No hand-off file found");
            return Ok(None);
        }

        let mut lock = RwLock::new(open_lock_file(&pending)?);
        let _guard = lock
            .write()
            .map_err(|e| ResumeError::LockError(format!("Failed to acquire write lock: {e}")))?;

        if pending.exists() {
            std::fs::rename(&pending, &claimed)
                .map_err(|e| ResumeError::IoError(format!("Failed to claim hand-off file: {e}")))?;
        } else {
            warn!(
                path = %claimed.display(),
                "Resuming a continuation claimed by a run that did not complete"
            );
        }

        let metadata =
            std::fs::metadata(&claimed).map_err(|e| ResumeError::IoError(e.to_string()))?;
        if metadata.len() > MAX_PAYLOAD_BYTES as u64 {
            return Err(ResumeError::PayloadTooLarge {
                size: metadata.len() as usize,
                max: MAX_PAYLOAD_BYTES,
            });
        }

        let bytes = std::fs::read(&claimed).map_err(|e| ResumeError::IoError(e.to_string()))?;
        info!(path = %claimed.display(), bytes = bytes.len(), "Claimed hand-off file");
        Ok(Some(bytes))
    }

    /// Drop the claimed continuation once its run has succeeded
    pub fn complete(&self) -> Result<(), ResumeError> {
        let claimed = self.claimed_path();
        let mut lock = RwLock::new(open_lock_file(&self.path())?);
        let _guard = lock
            .write()
            .map_err(|e| ResumeError::LockError(format!("Failed to acquire write lock: {e}")))?;

        match std::fs::remove_file(&claimed) {
            Ok(()) => {
                debug!(path = %claimed.display(), "Released claimed hand-off file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ResumeError::IoError(e.to_string())),
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File, ResumeError> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path.with_extension("lock"))
        .map_err(|e| ResumeError::LockError(format!("Failed to create lock file: {e}")))
}

#[async_trait]
impl Reinvoker for HandoffFileReinvoker {
    async fn invoke_async(&self, payload: Vec<u8>) -> Result<(), ResumeError> {
        self.save(&payload)
    }
}
