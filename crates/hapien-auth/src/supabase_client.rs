//! Supabase REST (PostgREST) client for the `users` profile table.

use crate::profile::{NewProfile, Profile, ProfileLookup, ProfileStore};
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use hapien_config_and_utils::ServiceCredentials;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use url::Url;

/// Length and digest of a response body, safe to log.
pub(crate) fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// Profile table client.
///
/// Without credentials the store is inert: lookups report `NotFound` and
/// writes fail with [`AuthError::Config`].
#[derive(Clone)]
pub struct SupabaseProfileStore {
    http_client: reqwest::Client,
    credentials: Option<ServiceCredentials>,
}

impl SupabaseProfileStore {
    pub fn new(credentials: Option<ServiceCredentials>) -> Self {
        if credentials.is_none() {
            tracing::warn!("Supabase credentials missing, profile store is disabled");
        }
        Self {
            http_client: reqwest::Client::new(),
            credentials,
        }
    }

    /// Build the REST API URL for a table.
    fn rest_url(credentials: &ServiceCredentials, table: &str) -> String {
        format!("{}/rest/v1/{}", credentials.url, table)
    }

    /// Point query for one profile row. The id is form-encoded.
    fn profile_query_url(credentials: &ServiceCredentials, user_id: &str) -> AuthResult<Url> {
        let id_filter = format!("eq.{}", user_id);
        Ok(Url::parse_with_params(
            &Self::rest_url(credentials, "users"),
            &[("id", id_filter.as_str()), ("select", "*"), ("limit", "1")],
        )?)
    }

    async fn try_fetch(
        &self,
        credentials: &ServiceCredentials,
        user_id: &str,
        access_token: &str,
    ) -> AuthResult<Option<Profile>> {
        let url = Self::profile_query_url(credentials, user_id)?;

        tracing::debug!(user_id = %user_id, "Fetching profile");

        let response = self
            .http_client
            .get(url)
            .header("apikey", &credentials.publishable_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected(format!(
                "Failed to fetch profile: {} ({})",
                status,
                summarize_response_body(&body)
            )));
        }

        let rows: Vec<Profile> = response.json().await?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl ProfileStore for SupabaseProfileStore {
    async fn fetch_profile(&self, user_id: &str, access_token: &str) -> ProfileLookup {
        let Some(credentials) = &self.credentials else {
            return ProfileLookup::NotFound;
        };

        match self.try_fetch(credentials, user_id, access_token).await {
            Ok(Some(profile)) => ProfileLookup::Found(profile),
            Ok(None) => ProfileLookup::NotFound,
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "Profile fetch failed");
                ProfileLookup::FetchFailed(e.to_string())
            }
        }
    }

    async fn upsert_profile(&self, profile: &NewProfile, access_token: &str) -> AuthResult<()> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or_else(|| AuthError::Config("Supabase credentials are not configured".into()))?;

        let url = Url::parse_with_params(
            &Self::rest_url(credentials, "users"),
            &[("on_conflict", "id")],
        )?;

        let response = self
            .http_client
            .post(url)
            .header("apikey", &credentials.publishable_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Content-Type", "application/json")
            // Existing rows are left untouched.
            .header("Prefer", "resolution=ignore-duplicates,return=minimal")
            .json(&[profile])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let body_summary = summarize_response_body(&body);
            tracing::error!(status = %status, body_summary = %body_summary, "Failed to create profile");
            return Err(AuthError::Rejected(format!(
                "Failed to create profile: {} ({})",
                status, body_summary
            )));
        }

        tracing::info!(user_id = %profile.id, "Profile ensured");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Identity;

    fn credentials() -> ServiceCredentials {
        ServiceCredentials {
            url: "https://test.supabase.co".to_string(),
            publishable_key: "test-key".to_string(),
        }
    }

    #[test]
    fn test_rest_url() {
        assert_eq!(
            SupabaseProfileStore::rest_url(&credentials(), "users"),
            "https://test.supabase.co/rest/v1/users"
        );
    }

    #[test]
    fn test_profile_query_url() {
        let url = SupabaseProfileStore::profile_query_url(&credentials(), "user-1").unwrap();
        assert_eq!(
            url.as_str(),
            "https://test.supabase.co/rest/v1/users?id=eq.user-1&select=*&limit=1"
        );
    }

    #[test]
    fn test_profile_query_url_escapes_user_id() {
        let url =
            SupabaseProfileStore::profile_query_url(&credentials(), "x&select=email&id=neq.0")
                .unwrap();

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("id".to_string(), "eq.x&select=email&id=neq.0".to_string()),
                ("select".to_string(), "*".to_string()),
                ("limit".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_summarize_response_body_hides_content() {
        let summary = summarize_response_body("secret payload");
        assert!(summary.starts_with("len=14,digest="));
        assert!(!summary.contains("secret"));
        assert_eq!(summary, summarize_response_body("secret payload"));
    }

    #[tokio::test]
    async fn test_without_credentials_fetch_is_not_found() {
        let store = SupabaseProfileStore::new(None);
        assert_eq!(
            store.fetch_profile("user-1", "token").await,
            ProfileLookup::NotFound
        );
    }

    #[tokio::test]
    async fn test_without_credentials_upsert_is_config_error() {
        let store = SupabaseProfileStore::new(None);
        let identity = Identity {
            id: "user-1".to_string(),
            email: None,
        };
        let result = store
            .upsert_profile(&NewProfile::for_identity(&identity), "token")
            .await;
        assert!(matches!(result, Err(AuthError::Config(_))));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_fetch_failed() {
        let store = SupabaseProfileStore::new(Some(ServiceCredentials {
            url: "http://127.0.0.1:9".to_string(),
            publishable_key: "k".to_string(),
        }));
        let lookup = store.fetch_profile("user-1", "token").await;
        assert!(matches!(lookup, ProfileLookup::FetchFailed(_)));
    }
}
