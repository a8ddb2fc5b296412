//! In-memory storage backend.

use crate::{SecureStorage, StorageResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Process-local storage. Contents are lost when dropped.
#[derive(Default)]
pub struct MemoryStorage {
    data: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecureStorage for MemoryStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.data.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        Ok(self.data.lock().remove(key).is_some())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.data.lock().keys().cloned().collect())
    }
}
