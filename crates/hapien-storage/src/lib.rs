//! Local persistence for Hapien auth state.
//!
//! Backends implement [`SecureStorage`]:
//! - **macOS**: Keychain via `security-framework`
//! - **Linux**: Secret Service (GNOME Keyring / KWallet) via `secret-service`
//! - [`FileStorage`]: owner-only JSON at `~/.hapien/session.json`, used when
//!   configured or when no keychain is reachable
//! - [`MemoryStorage`]: process-local, used by tests
//!
//! [`SessionVault`] is the typed layer on top: session tokens, session
//! metadata and the PKCE verifier of a pending magic link.

mod file;
mod keys;
mod memory;
mod traits;
mod vault;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "linux")]
mod linux;

pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use traits::SecureStorage;
pub use vault::{SessionMeta, SessionVault, StoredSession};

use hapien_config_and_utils::{Paths, SessionStorageKind};
use thiserror::Error;
use tracing::{info, warn};

/// Keychain service name for every stored item.
pub const SERVICE_NAME: &str = "app.hapien.cli";

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Platform keychain failure
    #[error("Platform storage error: {0}")]
    Platform(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Encoding(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create the storage backend selected by `kind`.
///
/// `Keychain` falls back to the session file when the platform keychain is
/// missing or unreachable.
pub fn create_storage(
    paths: &Paths,
    kind: SessionStorageKind,
) -> StorageResult<Box<dyn SecureStorage>> {
    if kind == SessionStorageKind::Keychain {
        match create_keychain_storage() {
            Ok(storage) => {
                info!("Using OS keychain for session storage");
                return Ok(storage);
            }
            Err(e) => warn!(error = %e, "Keychain unavailable, using session file"),
        }
    }

    let path = paths.session_file();
    info!(path = %path.display(), "Using file session storage");
    Ok(Box::new(FileStorage::open(path)?))
}

fn create_keychain_storage() -> StorageResult<Box<dyn SecureStorage>> {
    #[cfg(target_os = "macos")]
    {
        Ok(Box::new(macos::KeychainStorage::new(SERVICE_NAME)?))
    }

    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(linux::SecretServiceStorage::new(SERVICE_NAME)?))
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        Err(StorageError::Platform(
            "No keychain integration for this platform".to_string(),
        ))
    }
}

/// Create a SessionVault on the selected storage backend.
pub fn create_session_vault(paths: &Paths, kind: SessionStorageKind) -> StorageResult<SessionVault> {
    Ok(SessionVault::new(create_storage(paths, kind)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_storage_keys_unique() {
        let unique: std::collections::HashSet<_> = StorageKeys::ALL.iter().collect();
        assert_eq!(unique.len(), StorageKeys::ALL.len(), "Storage keys must be unique");
    }

    struct KeychainLikeStorage(MemoryStorage);

    impl SecureStorage for KeychainLikeStorage {
        fn set(&self, key: &str, value: &str) -> StorageResult<()> {
            self.0.set(key, value)
        }

        fn get(&self, key: &str) -> StorageResult<Option<String>> {
            self.0.get(key)
        }

        fn delete(&self, key: &str) -> StorageResult<bool> {
            self.0.delete(key)
        }
    }

    #[test]
    fn test_default_keys_cover_vault_key_set() {
        let storage = KeychainLikeStorage(MemoryStorage::new());
        storage.set(StorageKeys::SESSION_META, "{}").unwrap();
        storage.set(StorageKeys::ACCESS_TOKEN, "token").unwrap();
        storage.set("unrelated", "x").unwrap();

        assert_eq!(
            storage.keys().unwrap(),
            vec![
                StorageKeys::ACCESS_TOKEN.to_string(),
                StorageKeys::SESSION_META.to_string()
            ]
        );
    }

    #[test]
    fn test_create_session_vault_uses_session_file() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let vault = create_session_vault(&paths, SessionStorageKind::File).unwrap();
        vault.set_code_verifier("verifier").unwrap();

        assert!(paths.session_file().exists());
    }
}
