//! JSON file storage backend.
//!
//! Used when no OS keychain is reachable. The whole map is rewritten on
//! every mutation through a temporary file and a rename, so a crash never
//! leaves a half-written document. On unix the file is owner-only (0600).

use crate::{SecureStorage, StorageResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Permission bits for the session file.
#[cfg(unix)]
const SESSION_FILE_MODE: u32 = 0o600;

/// Storage persisted as a flat JSON object.
pub struct FileStorage {
    path: PathBuf,
    data: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open (or lazily create) the document at `path`.
    pub fn open(path: PathBuf) -> StorageResult<Self> {
        let data = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    fn persist(&self, data: &BTreeMap<String, String>) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(data)?;
        let tmp = self.path.with_extension("json.tmp");
        if let Err(err) = write_private(&tmp, content.as_bytes()) {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Write `content` to a fresh file readable only by its owner.
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(SESSION_FILE_MODE);
    }

    let mut file = options.open(path)?;
    file.write_all(content)?;
    file.sync_all()?;

    // A stale temp file keeps its old mode through open(); reset it.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(SESSION_FILE_MODE))?;
    }
    Ok(())
}

impl SecureStorage for FileStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut data = self.data.lock();
        data.insert(key.to_string(), value.to_string());
        self.persist(&data)
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let mut data = self.data.lock();
        let existed = data.remove(key).is_some();
        if existed {
            self.persist(&data)?;
        }
        Ok(existed)
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.data.lock().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");

        let storage = FileStorage::open(path.clone()).unwrap();
        storage.set("token", "abc").unwrap();
        drop(storage);

        let reopened = FileStorage::open(path).unwrap();
        assert_eq!(reopened.get("token").unwrap(), Some("abc".to_string()));
    }

    #[test]
    fn test_delete_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");

        let storage = FileStorage::open(path.clone()).unwrap();
        storage.set("token", "abc").unwrap();
        assert!(storage.delete("token").unwrap());

        let reopened = FileStorage::open(path).unwrap();
        assert!(reopened.get("token").unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_session_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let storage = FileStorage::open(path.clone()).unwrap();
        storage.set("access_token", "secret").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "session file mode was {:o}", mode);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_stale_temp_file_mode_is_reset() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, "stale").unwrap();
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o666)).unwrap();

        let storage = FileStorage::open(path.clone()).unwrap();
        storage.set("refresh_token", "secret").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn test_empty_file_is_empty_map() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "").unwrap();

        let storage = FileStorage::open(path).unwrap();
        assert!(storage.keys().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_encoding_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            FileStorage::open(path),
            Err(crate::StorageError::Encoding(_))
        ));
    }
}
