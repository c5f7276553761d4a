//! Append-only log of dispatch outcomes.
//!
//! Each outcome is written as one JSON object per line. Appends are
//! serialized through a mutex and written with a single `write_all`, so
//! concurrent dispatchers never interleave partial records.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

use crate::domain::DispatchOutcome;

/// Errors from the outcome log.
#[derive(Debug, Error)]
pub enum OutcomeLogError {
    /// Filesystem failure.
    #[error("outcome log I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The outcome could not be encoded.
    #[error("failed to encode outcome: {0}")]
    Encode(#[from] serde_json::Error),

    /// A previous writer panicked while holding the lock.
    #[error("outcome log writer is poisoned")]
    Poisoned,
}

/// Append-only sink for [`DispatchOutcome`] records.
pub struct OutcomeLog {
    writer: Mutex<Box<dyn Write + Send>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for OutcomeLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutcomeLog")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl OutcomeLog {
    /// Opens (or creates) a log that appends to the given file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OutcomeLogError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        Ok(Self {
            writer: Mutex::new(Box::new(file)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Creates a log over an arbitrary writer (for testing).
    pub fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
            path: None,
        }
    }

    /// Returns the backing file, if the log is file based.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Appends one outcome record.
    ///
    /// Blocks on file I/O; async callers run it on the blocking pool.
    pub fn append(&self, outcome: &DispatchOutcome) -> Result<(), OutcomeLogError> {
        let mut line = serde_json::to_vec(outcome)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().map_err(|_| OutcomeLogError::Poisoned)?;
        writer.write_all(&line)?;
        writer.flush()?;

        tracing::trace!(outcome_id = %outcome.id, status = %outcome.status(), "outcome appended");
        Ok(())
    }

    /// Reads the last `limit` records from a log file, oldest first.
    ///
    /// Lines that cannot be decoded are skipped with a warning. A missing
    /// file yields an empty list.
    pub fn read_recent(
        path: impl AsRef<Path>,
        limit: usize,
    ) -> Result<Vec<DispatchOutcome>, OutcomeLogError> {
        let path = path.as_ref();
        let file = match std::fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut outcomes = std::collections::VecDeque::with_capacity(limit.min(1024));
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<DispatchOutcome>(&line) {
                Ok(outcome) => {
                    if outcomes.len() == limit {
                        outcomes.pop_front();
                    }
                    if limit > 0 {
                        outcomes.push_back(outcome);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        line = index + 1,
                        error = %e,
                        "skipping undecodable outcome record"
                    );
                }
            }
        }

        Ok(outcomes.into())
    }
}
