//! Storage trait definitions.

use crate::{StorageKeys, StorageResult};

/// Key-value backend for auth material.
pub trait SecureStorage: Send + Sync {
    /// Store a value
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Retrieve a value
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Delete a value, returning whether it existed
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Check if a key exists
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// All stored keys, sorted.
    ///
    /// Keychains cannot be enumerated without a user prompt, so the default
    /// checks each key of the fixed vault key set.
    fn keys(&self) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        for key in StorageKeys::ALL {
            if self.has(key)? {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}
