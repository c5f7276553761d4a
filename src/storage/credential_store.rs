//! Durable persistence of the single credential record.
//!
//! [`FileCredentialStore`] keeps the record as a JSON file. Writes go to a
//! uniquely named sibling file which is then renamed over the target, so a
//! concurrent reader sees either the old record or the new one, never a
//! partial write.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Credential;

/// Errors that can occur while reading or writing the credential record.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("credential store I/O error at {path}: {source}")]
    Io {
        /// Location of the record.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The stored record exists but cannot be decoded.
    #[error("credential record is malformed: {0}")]
    Malformed(String),

    /// The record could not be encoded for storage.
    #[error("failed to encode credential record: {0}")]
    Encode(String),

    /// OS keychain failure.
    #[error("keychain error: {0}")]
    Keychain(#[from] keyring::Error),

    /// The blocking worker running the operation panicked or was cancelled.
    #[error("credential store task failed: {0}")]
    TaskFailed(String),
}

/// Result type for credential store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Persistence of one OAuth credential record.
///
/// `load` returns `Ok(None)` when nothing has been stored yet; that is the
/// normal state before the first authorization, not an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Loads the stored record, if any.
    async fn load(&self) -> Result<Option<Credential>>;

    /// Replaces the stored record atomically.
    async fn save(&self, credential: &Credential) -> Result<()>;

    /// Returns whether a record is present, without decoding it.
    async fn exists(&self) -> Result<bool>;

    /// Human-readable location of the record, for diagnostics.
    fn location(&self) -> String;
}

/// Stores the credential record as a JSON file.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Creates a store backed by the file at `path`.
    ///
    /// The file does not need to exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the path of the record.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_record(path: &Path) -> Result<Option<Credential>> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(path, e)),
        };

        if contents.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| StoreError::Malformed(e.to_string()))
    }

    fn write_record(path: &Path, payload: &[u8]) -> Result<()> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(|e| io_error(&parent, e))?;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "credential".to_string());
        let temp_path = parent.join(format!(
            ".{file_name}.{}.tmp",
            uuid::Uuid::new_v4().simple()
        ));

        let result = (|| {
            let mut file = std::fs::File::create(&temp_path).map_err(|e| io_error(&temp_path, e))?;
            restrict_permissions(&temp_path)?;
            file.write_all(payload)
                .map_err(|e| io_error(&temp_path, e))?;
            file.sync_all().map_err(|e| io_error(&temp_path, e))?;
            std::fs::rename(&temp_path, path).map_err(|e| io_error(path, e))
        })();

        if result.is_err() {
            let _ = std::fs::remove_file(&temp_path);
        }
        result
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<Credential>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::read_record(&path))
            .await
            .map_err(|e| StoreError::TaskFailed(e.to_string()))?
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        let payload = serde_json::to_vec_pretty(credential)
            .map_err(|e| StoreError::Encode(e.to_string()))?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || Self::write_record(&path, &payload))
            .await
            .map_err(|e| StoreError::TaskFailed(e.to_string()))??;

        tracing::debug!(path = %self.path.display(), "credential record saved");
        Ok(())
    }

    async fn exists(&self) -> Result<bool> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || match std::fs::metadata(&path) {
            Ok(metadata) => Ok(metadata.is_file() && metadata.len() > 0),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&path, e)),
        })
        .await
        .map_err(|e| StoreError::TaskFailed(e.to_string()))?
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_error(path, e))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
