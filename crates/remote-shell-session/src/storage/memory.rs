//! In-memory shell id store.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use remote_shell_core::ShellId;

use super::{ShellIdStore, StoreError};

/// In-memory store.
///
/// Useful for tests and for hosts that only reattach within one process.
#[derive(Debug, Default)]
pub struct MemoryShellIdStore {
    ids: RwLock<HashMap<String, ShellId>>,
}

impl MemoryShellIdStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ShellIdStore for MemoryShellIdStore {
    async fn load(&self, surface: &str) -> Result<Option<ShellId>, StoreError> {
        Ok(self
            .ids
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .get(surface)
            .cloned())
    }

    async fn save(&self, surface: &str, shell_id: &ShellId) -> Result<(), StoreError> {
        self.ids
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .insert(surface.to_owned(), shell_id.clone());
        Ok(())
    }

    async fn clear(&self, surface: &str) -> Result<(), StoreError> {
        self.ids
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .remove(surface);
        Ok(())
    }
}
