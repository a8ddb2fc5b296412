//! Secret Service backend (GNOME Keyring, KWallet).

use crate::{SecureStorage, StorageError, StorageResult};
use secret_service::blocking::{Collection, SecretService};
use secret_service::EncryptionType;
use std::collections::HashMap;
use tracing::debug;

/// Session material stored as Secret Service items tagged with
/// `service` and `key` attributes.
pub struct SecretServiceStorage {
    service_name: String,
}

impl SecretServiceStorage {
    /// Fails when no Secret Service is reachable on the session bus.
    pub fn new(service_name: &str) -> StorageResult<Self> {
        SecretService::connect(EncryptionType::Dh).map_err(|e| {
            StorageError::Platform(format!("Secret Service unavailable: {}", e))
        })?;

        Ok(Self {
            service_name: service_name.to_string(),
        })
    }

    fn with_collection<T>(
        &self,
        f: impl FnOnce(&Collection<'_>) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let service = SecretService::connect(EncryptionType::Dh).map_err(platform)?;
        let collection = service.get_default_collection().map_err(platform)?;

        if collection.is_locked().unwrap_or(false) {
            collection.unlock().map_err(|e| {
                StorageError::Platform(format!("Failed to unlock keyring: {}", e))
            })?;
        }

        f(&collection)
    }

    fn attributes<'a>(&'a self, key: &'a str) -> HashMap<&'a str, &'a str> {
        HashMap::from([("service", self.service_name.as_str()), ("key", key)])
    }
}

fn platform(err: secret_service::Error) -> StorageError {
    StorageError::Platform(err.to_string())
}

impl SecureStorage for SecretServiceStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        debug!(service = %self.service_name, key = %key, "Writing keyring item");

        self.with_collection(|collection| {
            let label = format!("{} {}", self.service_name, key);
            collection
                .create_item(&label, self.attributes(key), value.as_bytes(), true, "text/plain")
                .map_err(platform)?;
            Ok(())
        })
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.with_collection(|collection| {
            let items = collection.search_items(self.attributes(key)).map_err(platform)?;
            let Some(item) = items.first() else {
                return Ok(None);
            };

            let secret = item.get_secret().map_err(platform)?;
            String::from_utf8(secret)
                .map(Some)
                .map_err(|e| StorageError::Encoding(e.to_string()))
        })
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        debug!(service = %self.service_name, key = %key, "Deleting keyring item");

        self.with_collection(|collection| {
            let items = collection.search_items(self.attributes(key)).map_err(platform)?;
            for item in &items {
                item.delete().map_err(platform)?;
            }
            Ok(!items.is_empty())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageKeys;

    const TEST_SERVICE: &str = "app.hapien.cli.test";

    #[test]
    #[ignore] // Requires a running Secret Service on D-Bus
    fn test_secret_service_session_keys() {
        let storage = SecretServiceStorage::new(TEST_SERVICE).unwrap();
        let _ = storage.delete(StorageKeys::ACCESS_TOKEN);

        storage.set(StorageKeys::ACCESS_TOKEN, "first").unwrap();
        storage.set(StorageKeys::ACCESS_TOKEN, "second").unwrap();
        assert_eq!(
            storage.get(StorageKeys::ACCESS_TOKEN).unwrap(),
            Some("second".to_string())
        );
        assert_eq!(storage.keys().unwrap(), vec![StorageKeys::ACCESS_TOKEN.to_string()]);

        assert!(storage.delete(StorageKeys::ACCESS_TOKEN).unwrap());
        assert!(!storage.delete(StorageKeys::ACCESS_TOKEN).unwrap());
    }
}
