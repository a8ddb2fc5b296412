//! Application profile records and the store that holds them.

use crate::session::Identity;
use crate::AuthResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Application-level user record, keyed by the identity id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Profile {
    /// True only for a name with at least one non-whitespace character.
    pub fn has_display_name(&self) -> bool {
        self.display_name().is_some()
    }

    /// Trimmed display name, if set.
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

/// Insert payload for a brand-new profile. Carries no display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewProfile {
    pub id: String,
    pub email: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl NewProfile {
    /// Minimal record for `identity`, both timestamps set to now.
    pub fn for_identity(identity: &Identity) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: identity.id.clone(),
            email: identity.email.clone(),
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Result of looking up a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileLookup {
    Found(Profile),
    NotFound,
    /// The store could not answer (transport, status or decode failure).
    FetchFailed(String),
}

impl ProfileLookup {
    /// Collapse to an optional profile; a failed fetch counts as absent.
    pub fn into_option(self) -> Option<Profile> {
        match self {
            ProfileLookup::Found(profile) => Some(profile),
            ProfileLookup::NotFound | ProfileLookup::FetchFailed(_) => None,
        }
    }
}

/// Persistent profile records.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Look up the profile for `user_id`.
    async fn fetch_profile(&self, user_id: &str, access_token: &str) -> ProfileLookup;

    /// Insert `profile` unless a record with that id already exists.
    /// An existing record is never modified.
    async fn upsert_profile(&self, profile: &NewProfile, access_token: &str) -> AuthResult<()>;
}

/// Tolerant profile reader for display purposes.
#[derive(Clone)]
pub struct ProfileFetcher {
    store: Arc<dyn ProfileStore>,
}

impl ProfileFetcher {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    /// Profile for `user_id`, or `None` when absent or unreadable.
    pub async fn fetch(&self, user_id: &str, access_token: &str) -> Option<Profile> {
        let lookup = self.store.fetch_profile(user_id, access_token).await;
        if let ProfileLookup::FetchFailed(reason) = &lookup {
            warn!(user_id = %user_id, reason = %reason, "Profile fetch failed");
        }
        lookup.into_option()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::AuthError;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub fn profile(id: &str, name: Option<&str>) -> Profile {
        Profile {
            id: id.to_string(),
            email: Some(format!("{}@example.com", id)),
            name: name.map(str::to_string),
            avatar_url: None,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    /// How the next upsert should fail, if at all.
    pub enum UpsertFailure {
        Rejected(String),
        Unreachable,
        Misconfigured(String),
    }

    /// In-memory store with insert-if-absent semantics.
    #[derive(Default)]
    pub struct MemoryProfileStore {
        rows: Mutex<BTreeMap<String, Profile>>,
        fetch_failures: Mutex<VecDeque<String>>,
        upsert_failure: Mutex<Option<UpsertFailure>>,
        hang_fetch: bool,
        fetches: AtomicUsize,
        upserts: AtomicUsize,
    }

    impl MemoryProfileStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_profile(profile: Profile) -> Self {
            let store = Self::new();
            store.insert(profile);
            store
        }

        /// Store whose fetches never complete.
        pub fn hanging() -> Self {
            Self {
                hang_fetch: true,
                ..Self::default()
            }
        }

        pub fn insert(&self, profile: Profile) {
            self.rows.lock().unwrap().insert(profile.id.clone(), profile);
        }

        pub fn fail_next_fetch(&self, reason: &str) {
            self.fetch_failures
                .lock()
                .unwrap()
                .push_back(reason.to_string());
        }

        pub fn fail_next_upsert(&self, failure: UpsertFailure) {
            *self.upsert_failure.lock().unwrap() = Some(failure);
        }

        pub fn get(&self, id: &str) -> Option<Profile> {
            self.rows.lock().unwrap().get(id).cloned()
        }

        pub fn len(&self) -> usize {
            self.rows.lock().unwrap().len()
        }

        pub fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }

        pub fn upserts(&self) -> usize {
            self.upserts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProfileStore for MemoryProfileStore {
        async fn fetch_profile(&self, user_id: &str, _access_token: &str) -> ProfileLookup {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.hang_fetch {
                std::future::pending::<()>().await;
            }
            if let Some(reason) = self.fetch_failures.lock().unwrap().pop_front() {
                return ProfileLookup::FetchFailed(reason);
            }
            match self.get(user_id) {
                Some(profile) => ProfileLookup::Found(profile),
                None => ProfileLookup::NotFound,
            }
        }

        async fn upsert_profile(&self, profile: &NewProfile, _access_token: &str) -> AuthResult<()> {
            self.upserts.fetch_add(1, Ordering::SeqCst);
            match self.upsert_failure.lock().unwrap().take() {
                Some(UpsertFailure::Rejected(message)) => return Err(AuthError::Rejected(message)),
                Some(UpsertFailure::Unreachable) => return Err(AuthError::NetworkUnavailable),
                Some(UpsertFailure::Misconfigured(message)) => return Err(AuthError::Config(message)),
                None => {}
            }
            self.rows
                .lock()
                .unwrap()
                .entry(profile.id.clone())
                .or_insert_with(|| Profile {
                    id: profile.id.clone(),
                    email: profile.email.clone(),
                    name: None,
                    avatar_url: None,
                    created_at: profile.created_at.clone(),
                    updated_at: profile.updated_at.clone(),
                });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{profile, MemoryProfileStore};
    use super::*;

    #[test]
    fn test_display_name_rules() {
        assert!(profile("u1", Some("Asha")).has_display_name());
        assert_eq!(profile("u1", Some("  Asha ")).display_name(), Some("Asha"));
        assert!(!profile("u1", Some("")).has_display_name());
        assert!(!profile("u1", Some("   ")).has_display_name());
        assert!(!profile("u1", None).has_display_name());
    }

    #[test]
    fn test_new_profile_for_identity() {
        let identity = Identity {
            id: "user-7".to_string(),
            email: Some("new@example.com".to_string()),
        };
        let new_profile = NewProfile::for_identity(&identity);

        assert_eq!(new_profile.id, "user-7");
        assert_eq!(new_profile.email.as_deref(), Some("new@example.com"));
        assert_eq!(new_profile.created_at, new_profile.updated_at);

        let json = serde_json::to_value(&new_profile).unwrap();
        assert!(json.get("name").is_none());
    }

    #[test]
    fn test_profile_deserializes_with_missing_optionals() {
        let json = r#"{"id":"u1","created_at":"t","updated_at":"t"}"#;
        let parsed: Profile = serde_json::from_str(json).unwrap();
        assert!(parsed.name.is_none());
        assert!(parsed.email.is_none());
    }

    #[test]
    fn test_lookup_into_option() {
        let found = ProfileLookup::Found(profile("u1", None));
        assert!(found.into_option().is_some());
        assert!(ProfileLookup::NotFound.into_option().is_none());
        assert!(ProfileLookup::FetchFailed("boom".to_string())
            .into_option()
            .is_none());
    }

    #[tokio::test]
    async fn test_upsert_does_not_overwrite_existing() {
        let store = MemoryProfileStore::with_profile(profile("u1", Some("Asha")));
        let identity = Identity {
            id: "u1".to_string(),
            email: None,
        };

        store
            .upsert_profile(&NewProfile::for_identity(&identity), "token")
            .await
            .unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("u1").unwrap().name.as_deref(), Some("Asha"));
    }

    #[tokio::test]
    async fn test_fetcher_tolerates_failures() {
        let store = Arc::new(MemoryProfileStore::with_profile(profile("u1", Some("Asha"))));
        store.fail_next_fetch("HTTP 503");
        let fetcher = ProfileFetcher::new(store.clone());

        assert!(fetcher.fetch("u1", "token").await.is_none());
        assert!(fetcher.fetch("u1", "token").await.is_some());
        assert!(fetcher.fetch("missing", "token").await.is_none());
        assert_eq!(store.fetches(), 3);
    }
}
