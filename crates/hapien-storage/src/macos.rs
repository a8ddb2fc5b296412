//! macOS Keychain backend.

use crate::{SecureStorage, StorageError, StorageResult};
use security_framework::base::Error as SecurityError;
use security_framework::passwords::{
    delete_generic_password, get_generic_password, set_generic_password,
};
use tracing::debug;

/// `errSecItemNotFound`
const ITEM_NOT_FOUND: i32 = -25300;

/// Generic-password items keyed by service name and account (the storage key).
pub struct KeychainStorage {
    service_name: String,
}

impl KeychainStorage {
    pub fn new(service_name: &str) -> StorageResult<Self> {
        Ok(Self {
            service_name: service_name.to_string(),
        })
    }
}

fn is_not_found(err: &SecurityError) -> bool {
    err.code() == ITEM_NOT_FOUND
}

impl SecureStorage for KeychainStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        debug!(service = %self.service_name, key = %key, "Writing keychain item");

        set_generic_password(&self.service_name, key, value.as_bytes()).map_err(|e| {
            StorageError::Platform(format!("Failed to write keychain item: {}", e))
        })
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        match get_generic_password(&self.service_name, key) {
            Ok(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| StorageError::Encoding(e.to_string())),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(StorageError::Platform(format!(
                "Failed to read keychain item: {}",
                e
            ))),
        }
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        debug!(service = %self.service_name, key = %key, "Deleting keychain item");

        match delete_generic_password(&self.service_name, key) {
            Ok(()) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(StorageError::Platform(format!(
                "Failed to delete keychain item: {}",
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageKeys;

    const TEST_SERVICE: &str = "app.hapien.cli.test";

    #[test]
    #[ignore] // Requires macOS Keychain access
    fn test_keychain_session_keys() {
        let storage = KeychainStorage::new(TEST_SERVICE).unwrap();
        let _ = storage.delete(StorageKeys::REFRESH_TOKEN);

        storage.set(StorageKeys::REFRESH_TOKEN, "first").unwrap();
        storage.set(StorageKeys::REFRESH_TOKEN, "second").unwrap();
        assert_eq!(
            storage.get(StorageKeys::REFRESH_TOKEN).unwrap(),
            Some("second".to_string())
        );

        assert!(storage.delete(StorageKeys::REFRESH_TOKEN).unwrap());
        assert!(!storage.delete(StorageKeys::REFRESH_TOKEN).unwrap());
        assert_eq!(storage.get(StorageKeys::REFRESH_TOKEN).unwrap(), None);
    }
}
