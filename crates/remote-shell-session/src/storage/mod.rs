//! Shell id persistence, so a restarted client can reattach to its shell.

use async_trait::async_trait;
use remote_shell_core::ShellId;
use thiserror::Error;

pub mod memory;

#[cfg(feature = "file-store")]
pub mod file;

pub use memory::MemoryShellIdStore;

#[cfg(feature = "file-store")]
pub use file::FileShellIdStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access shell id store at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Corrupt shell id store at {path}: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Store error: {0}")]
    Internal(String),
}

/// Remembers the last shell id per surface (a named client view).
#[async_trait]
pub trait ShellIdStore: Send + Sync {
    /// The shell id last saved for `surface`, if any.
    async fn load(&self, surface: &str) -> Result<Option<ShellId>, StoreError>;

    /// Remember `shell_id` for `surface`, replacing any previous id.
    async fn save(&self, surface: &str, shell_id: &ShellId) -> Result<(), StoreError>;

    /// Forget the shell id for `surface`. Not an error if none was saved.
    async fn clear(&self, surface: &str) -> Result<(), StoreError>;
}
