//! Credential storage backends.
//!
//! [`JsonFileBackend`] reads and writes the whole record list as a JSON array
//! with secure file permissions (0o600). [`MemoryBackend`] keeps the list in
//! process memory and is used by tests and ephemeral deployments.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::NamedTempFile;

use crate::errors::AuthError;
use crate::types::CredentialRecord;

/// Default storage file name.
pub const STORAGE_FILE_NAME: &str = "storage.json";

/// Persistent key-value backend behind a [`CredentialStore`](crate::CredentialStore).
pub trait CredentialBackend: Send + Sync {
    /// Read every persisted record.
    ///
    /// Returns `Ok(None)` when nothing has been persisted yet. An existing
    /// but unreadable or corrupt store is an error.
    fn load(&self) -> Result<Option<Vec<CredentialRecord>>, AuthError>;

    /// Replace the persisted set with `records`.
    fn save(&self, records: &[CredentialRecord]) -> Result<(), AuthError>;
}

impl<T: CredentialBackend + ?Sized> CredentialBackend for Arc<T> {
    fn load(&self) -> Result<Option<Vec<CredentialRecord>>, AuthError> {
        (**self).load()
    }

    fn save(&self, records: &[CredentialRecord]) -> Result<(), AuthError> {
        (**self).save(records)
    }
}

/// Whole-file JSON backend.
#[derive(Clone, Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    /// Create a backend for the given file path. Nothing is touched on disk
    /// until [`load`](CredentialBackend::load) or
    /// [`save`](CredentialBackend::save) is called.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialBackend for JsonFileBackend {
    fn load(&self) -> Result<Option<Vec<CredentialRecord>>, AuthError> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AuthError::Io(e)),
        };

        // A literal `null` document is treated as an empty list.
        let records: Option<Vec<CredentialRecord>> = serde_json::from_str(&data)?;
        Ok(Some(records.unwrap_or_default()))
    }

    /// Replaces the file in one step: the new contents go to a temporary
    /// file in the same directory, which is then renamed over the old one.
    /// A failed save leaves the previous file untouched.
    fn save(&self, records: &[CredentialRecord]) -> Result<(), AuthError> {
        let json = serde_json::to_string_pretty(records)?;
        replace_file(&self.path, |file| file.write_all(json.as_bytes()))?;
        Ok(())
    }
}

/// Atomically replace `path` with whatever `write` puts into a fresh file.
///
/// The temporary file is created with 0o600 permissions next to `path`
/// (creating parent directories as needed) and is removed if `write` or the
/// final rename fails.
fn replace_file<F>(path: &Path, write: F) -> std::io::Result<()>
where
    F: FnOnce(&mut File) -> std::io::Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    write(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    let _ = tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// In-memory backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<Option<Vec<CredentialRecord>>>,
}

impl MemoryBackend {
    /// Create an empty backend (nothing persisted yet).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend pre-seeded with records.
    pub fn with_records(records: Vec<CredentialRecord>) -> Self {
        Self {
            records: Mutex::new(Some(records)),
        }
    }

    /// Snapshot of what has been persisted, if anything.
    pub fn snapshot(&self) -> Option<Vec<CredentialRecord>> {
        self.records.lock().clone()
    }
}

impl CredentialBackend for MemoryBackend {
    fn load(&self) -> Result<Option<Vec<CredentialRecord>>, AuthError> {
        Ok(self.records.lock().clone())
    }

    fn save(&self, records: &[CredentialRecord]) -> Result<(), AuthError> {
        *self.records.lock() = Some(records.to_vec());
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
