//! Storage Layer (C1): atomic read/write of the state document and
//! advisory file locking, grounded in the teacher's lock-guard pattern
//! (acquire-then-defer-release) but using `fs2::FileExt` polled with a
//! backoff loop, since neither `fs2` nor `fslock` expose a native
//! blocking-with-timeout API.

use crate::errors::{IoError, StateError, TaskerError};
use crate::rollback;
use crate::state::StateDocument;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::{Duration, Instant};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct Store {
    state_path: PathBuf,
    lock_path: PathBuf,
    lock_timeout: Duration,
}

/// A held advisory lock on the state file. Released on drop.
#[must_use = "the lock is released when LockGuard is dropped"]
pub struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl Store {
    pub fn new(working_dir: impl AsRef<Path>) -> Self {
        let working_dir = working_dir.as_ref();
        Self {
            state_path: working_dir.join("state.json"),
            lock_path: working_dir.join("state.json.lock"),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    fn acquire_lock(&self) -> Result<LockGuard, TaskerError> {
        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| IoError::WriteFail {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| IoError::WriteFail {
                path: self.lock_path.clone(),
                source: e,
            })?;

        let deadline = Instant::now() + self.lock_timeout;
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    tracing::debug!(path = %self.lock_path.display(), "acquired state lock");
                    return Ok(LockGuard { file });
                }
                Err(_) if Instant::now() < deadline => sleep(POLL_INTERVAL),
                Err(_) => {
                    return Err(StateError::LockTimeout {
                        path: self.state_path.clone(),
                        timeout_secs: self.lock_timeout.as_secs(),
                    }
                    .into());
                }
            }
        }
    }

    /// Read and deserialize the state document, without locking.
    /// Side-effect-free callers may use this directly (§4.2); mutating
    /// callers must go through [`Store::with_lock`].
    pub fn load(&self) -> Result<StateDocument, TaskerError> {
        if !self.state_path.exists() {
            return Err(StateError::NotFound(self.state_path.clone()).into());
        }
        let raw = std::fs::read_to_string(&self.state_path).map_err(|e| IoError::ReadFail {
            path: self.state_path.clone(),
            source: e,
        })?;
        match serde_json::from_str::<StateDocument>(&raw) {
            Ok(doc) => {
                if doc.schema_version != crate::state::SCHEMA_VERSION {
                    return Err(StateError::SchemaVersionMismatch {
                        found: doc.schema_version,
                        expected: crate::state::SCHEMA_VERSION.to_string(),
                    }
                    .into());
                }
                Ok(doc)
            }
            Err(parse_err) => {
                tracing::warn!(error = %parse_err, path = %self.state_path.display(), "state document unparseable, recovering");
                let (doc, _report) = rollback::recover_corrupt_state(&self.state_path, parse_err.to_string())?;
                Ok(doc)
            }
        }
    }

    /// Serialize `doc` to a sibling temp file, then atomically rename
    /// over the state document (§4.1 step 4).
    pub fn save(&self, doc: &StateDocument) -> Result<(), TaskerError> {
        let pretty = serde_json::to_string_pretty(doc)
            .map_err(|e| TaskerError::Other(anyhow::anyhow!(e)))?;
        let tmp_path = self.state_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, pretty).map_err(|e| IoError::WriteFail {
            path: tmp_path.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp_path, &self.state_path).map_err(|e| IoError::WriteFail {
            path: self.state_path.clone(),
            source: e,
        })?;
        tracing::trace!(path = %self.state_path.display(), "wrote state document");
        Ok(())
    }

    /// Acquire the lock, load, invoke `f`, and save the result — all
    /// while holding the lock. `f` returning an error skips the write.
    pub fn with_lock<F>(&self, f: F) -> Result<(), TaskerError>
    where
        F: FnOnce(&mut StateDocument) -> Result<(), TaskerError>,
    {
        let _guard = self.acquire_lock()?;
        let mut doc = self.load()?;
        f(&mut doc)?;
        self.save(&doc)
    }

    /// Initialize a fresh working directory: write a new state document
    /// if one does not already exist.
    pub fn init(&self, target_dir: PathBuf) -> Result<(), TaskerError> {
        if self.state_path.exists() {
            return Err(TaskerError::Other(anyhow::anyhow!(
                "state document already exists at {}",
                self.state_path.display()
            )));
        }
        if let Some(parent) = self.state_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| IoError::WriteFail {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        self.save(&StateDocument::new(target_dir))
    }
}
