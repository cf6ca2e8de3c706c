//! JSON file shell id store.

use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use remote_shell_core::ShellId;
use tokio::sync::Mutex;

use super::{ShellIdStore, StoreError};

const APP_DIR: &str = "remote-shell";
const FILE_NAME: &str = "sessions.json";

/// Shell ids kept in one JSON object, `{ "<surface>": "<shell id>" }`.
///
/// Writes go to a temporary file that is renamed over the original.
#[derive(Debug)]
pub struct FileShellIdStore {
    path: PathBuf,
    // Serialises read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileShellIdStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store under the platform's local data directory.
    ///
    /// # Errors
    /// Returns an error if the platform has no data directory.
    pub fn in_data_dir() -> Result<Self, StoreError> {
        Self::default_path()
            .map(Self::new)
            .ok_or_else(|| StoreError::Internal("No local data directory on this platform".into()))
    }

    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join(APP_DIR).join(FILE_NAME))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    async fn read_all(&self) -> Result<BTreeMap<String, ShellId>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(self.io_error(err)),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(BTreeMap::new());
        }
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
            path: self.path.display().to_string(),
            source,
        })
    }

    async fn write_all(&self, ids: &BTreeMap<String, ShellId>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        let json = serde_json::to_vec_pretty(ids)
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))
    }
}

#[async_trait]
impl ShellIdStore for FileShellIdStore {
    async fn load(&self, surface: &str) -> Result<Option<ShellId>, StoreError> {
        Ok(self.read_all().await?.remove(surface))
    }

    async fn save(&self, surface: &str, shell_id: &ShellId) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut ids = self.read_all().await?;
        ids.insert(surface.to_owned(), shell_id.clone());
        self.write_all(&ids).await?;
        tracing::debug!(surface, shell_id = %shell_id, path = %self.path.display(), "Saved shell id");
        Ok(())
    }

    async fn clear(&self, surface: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut ids = self.read_all().await?;
        if ids.remove(surface).is_some() {
            self.write_all(&ids).await?;
        }
        Ok(())
    }
}
