//! Typed access to persisted auth material.

use crate::{SecureStorage, StorageError, StorageKeys, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session metadata stored alongside the tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMeta {
    /// User ID from the identity provider
    pub user_id: String,
    /// User email, when the provider reports one
    #[serde(default)]
    pub email: Option<String>,
    /// When the access token expires (RFC 3339)
    pub expires_at: String,
}

impl SessionMeta {
    /// Parsed expiry. Unparseable timestamps count as already expired.
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(&self.expires_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// A complete persisted session.
#[derive(Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub access_token: String,
    pub refresh_token: String,
    pub meta: SessionMeta,
}

impl std::fmt::Debug for StoredSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredSession")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("meta", &self.meta)
            .finish()
    }
}

/// High-level API over a [`SecureStorage`] backend.
pub struct SessionVault {
    storage: Box<dyn SecureStorage>,
}

impl SessionVault {
    /// Create a vault over the given backend.
    pub fn new(storage: Box<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    // ==========================================
    // Session
    // ==========================================

    /// Persist all three parts of a session.
    pub fn store_session(&self, session: &StoredSession) -> StorageResult<()> {
        self.storage
            .set(StorageKeys::ACCESS_TOKEN, &session.access_token)?;
        self.storage
            .set(StorageKeys::REFRESH_TOKEN, &session.refresh_token)?;
        self.storage.set(
            StorageKeys::SESSION_META,
            &serde_json::to_string(&session.meta)?,
        )?;
        tracing::debug!(user_id = %session.meta.user_id, "Stored auth session");
        Ok(())
    }

    /// Load the session. A partially stored session (any part missing) is
    /// reported as no session.
    pub fn load_session(&self) -> StorageResult<Option<StoredSession>> {
        let access_token = self.storage.get(StorageKeys::ACCESS_TOKEN)?;
        let refresh_token = self.storage.get(StorageKeys::REFRESH_TOKEN)?;
        let meta = self.load_session_meta()?;

        match (access_token, refresh_token, meta) {
            (Some(access_token), Some(refresh_token), Some(meta)) => Ok(Some(StoredSession {
                access_token,
                refresh_token,
                meta,
            })),
            (None, None, None) => Ok(None),
            _ => {
                tracing::warn!("Stored session is incomplete, ignoring it");
                Ok(None)
            }
        }
    }

    /// Load only the session metadata.
    pub fn load_session_meta(&self) -> StorageResult<Option<SessionMeta>> {
        match self.storage.get(StorageKeys::SESSION_META)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StorageError::Encoding(e.to_string())),
            None => Ok(None),
        }
    }

    /// Whether a complete session is stored.
    pub fn has_session(&self) -> StorageResult<bool> {
        Ok(self.load_session()?.is_some())
    }

    /// Remove the session tokens and metadata.
    pub fn clear_session(&self) -> StorageResult<()> {
        self.storage.delete(StorageKeys::ACCESS_TOKEN)?;
        self.storage.delete(StorageKeys::REFRESH_TOKEN)?;
        self.storage.delete(StorageKeys::SESSION_META)?;
        tracing::debug!("Cleared auth session");
        Ok(())
    }

    // ==========================================
    // PKCE
    // ==========================================

    /// Remember the verifier for a magic link that is in flight.
    pub fn set_code_verifier(&self, verifier: &str) -> StorageResult<()> {
        self.storage.set(StorageKeys::CODE_VERIFIER, verifier)
    }

    /// Verifier for the pending magic link, if any.
    pub fn code_verifier(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::CODE_VERIFIER)
    }

    /// Forget the pending verifier.
    pub fn clear_code_verifier(&self) -> StorageResult<bool> {
        self.storage.delete(StorageKeys::CODE_VERIFIER)
    }

    // ==========================================
    // Diagnostics
    // ==========================================

    /// Keys currently present in the backend.
    pub fn stored_keys(&self) -> StorageResult<Vec<String>> {
        self.storage.keys()
    }
}
