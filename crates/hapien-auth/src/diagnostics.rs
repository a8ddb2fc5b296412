//! Point-in-time session report for troubleshooting sign-in problems.
//!
//! Compares what the provider reports with what is persisted locally.
//! Collection never fails; each check records its own error.

use crate::session::SessionProvider;
use chrono::{DateTime, Utc};
use hapien_storage::SessionVault;
use serde::Serialize;

/// What the identity provider reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProviderCheck {
    pub has_session: bool,
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// What is persisted locally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StorageCheck {
    pub has_backup: bool,
    pub user_id: Option<String>,
    pub expires_at: Option<String>,
    pub pending_magic_link: bool,
    pub keys: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionDiagnostics {
    pub timestamp: DateTime<Utc>,
    pub provider: ProviderCheck,
    pub storage: StorageCheck,
}

impl SessionDiagnostics {
    pub async fn collect(provider: &dyn SessionProvider, vault: &SessionVault) -> Self {
        let provider = match provider.get_session().await {
            Ok(Some(session)) => ProviderCheck {
                has_session: true,
                user_id: Some(session.user.id.clone()),
                email: session.user.email.clone(),
                expires_at: Some(session.expires_at),
                error: None,
            },
            Ok(None) => ProviderCheck::default(),
            Err(e) => ProviderCheck {
                error: Some(e.to_string()),
                ..ProviderCheck::default()
            },
        };

        Self {
            timestamp: Utc::now(),
            provider,
            storage: Self::check_storage(vault),
        }
    }

    fn check_storage(vault: &SessionVault) -> StorageCheck {
        let mut check = StorageCheck::default();
        let mut errors = Vec::new();

        match vault.load_session_meta() {
            Ok(Some(meta)) => {
                check.user_id = Some(meta.user_id);
                check.expires_at = Some(meta.expires_at);
            }
            Ok(None) => {}
            Err(e) => errors.push(e.to_string()),
        }
        match vault.has_session() {
            Ok(has) => check.has_backup = has,
            Err(e) => errors.push(e.to_string()),
        }
        match vault.code_verifier() {
            Ok(verifier) => check.pending_magic_link = verifier.is_some(),
            Err(e) => errors.push(e.to_string()),
        }
        match vault.stored_keys() {
            Ok(keys) => check.keys = keys,
            Err(e) => errors.push(e.to_string()),
        }

        if !errors.is_empty() {
            check.error = Some(errors.join("; "));
        }
        check
    }

    /// True when the provider and local storage disagree about the session.
    pub fn is_inconsistent(&self) -> bool {
        self.provider.has_session != self.storage.has_backup
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::{session_for, Reply, ScriptedProvider};
    use crate::session::Session;
    use hapien_storage::{MemoryStorage, StoredSession};

    fn vault() -> SessionVault {
        SessionVault::new(Box::new(MemoryStorage::new()))
    }

    #[tokio::test]
    async fn test_consistent_signed_in() {
        let session: Session = session_for("user-1", "asha@example.com");
        let vault = vault();
        vault.store_session(&StoredSession::from(&session)).unwrap();
        let provider = ScriptedProvider::with_session(session);

        let report = SessionDiagnostics::collect(&provider, &vault).await;

        assert!(report.provider.has_session);
        assert_eq!(report.provider.email.as_deref(), Some("asha@example.com"));
        assert!(report.storage.has_backup);
        assert_eq!(report.storage.user_id.as_deref(), Some("user-1"));
        assert_eq!(report.storage.keys.len(), 3);
        assert!(!report.is_inconsistent());
    }

    #[tokio::test]
    async fn test_missing_local_backup_is_visible() {
        let vault = vault();
        vault.set_code_verifier("v").unwrap();
        let provider = ScriptedProvider::with_session(session_for("user-1", "a@example.com"));

        let report = SessionDiagnostics::collect(&provider, &vault).await;

        assert!(report.is_inconsistent());
        assert!(!report.storage.has_backup);
        assert!(report.storage.pending_magic_link);
    }

    #[tokio::test]
    async fn test_provider_error_is_captured() {
        let provider = ScriptedProvider::new(vec![Reply::Error("JWT expired".to_string())]);

        let report = SessionDiagnostics::collect(&provider, &vault()).await;

        assert!(!report.provider.has_session);
        assert!(report.provider.error.unwrap().contains("JWT expired"));
        assert!(report.storage.error.is_none());
    }

    #[tokio::test]
    async fn test_report_serializes() {
        let report = SessionDiagnostics::collect(&ScriptedProvider::signed_out(), &vault()).await;
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["provider"]["has_session"], false);
        assert!(json["storage"]["keys"].as_array().unwrap().is_empty());
    }
}
