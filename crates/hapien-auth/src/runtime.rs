//! Process-wide auth wiring.
//!
//! One [`AuthRuntime`] is built at startup from [`Config`] and [`Paths`];
//! every flow borrows its clients from here instead of constructing its own.

use crate::auth_state::AuthStateTracker;
use crate::callback::CallbackReconciler;
use crate::clock::{Clock, TokioClock};
use crate::diagnostics::SessionDiagnostics;
use crate::navigation::Navigator;
use crate::platform::DisplayContext;
use crate::profile::ProfileStore;
use crate::session::SessionProvider;
use crate::supabase_auth::SupabaseAuth;
use crate::supabase_client::SupabaseProfileStore;
use crate::{AuthError, AuthResult};
use hapien_config_and_utils::{Config, Paths};
use hapien_storage::SessionVault;
use std::sync::Arc;
use tracing::info;
use url::Url;

/// Path the magic link redirects to.
pub const CALLBACK_PATH: &str = "/auth/callback";

/// Shared auth runtime.
#[derive(Clone)]
pub struct AuthRuntime {
    auth: Arc<SupabaseAuth>,
    profiles: Arc<SupabaseProfileStore>,
    clock: Arc<dyn Clock>,
    app_url: Url,
}

impl AuthRuntime {
    /// Build the runtime. Fails if the identity provider is not configured;
    /// a missing profile store only degrades lookups.
    pub fn from_config(config: &Config, paths: &Paths) -> AuthResult<Self> {
        let credentials = config.credentials().ok_or_else(|| {
            AuthError::Config(
                "Supabase URL and publishable key are required (HAPIEN_SUPABASE_URL, HAPIEN_SUPABASE_PUBLISHABLE_KEY)"
                    .to_string(),
            )
        })?;
        let app_url = config
            .app_url()
            .map_err(|e| AuthError::Config(e.to_string()))?;

        let vault = hapien_storage::create_session_vault(paths, config.session_storage)?;
        Ok(Self::new(
            SupabaseAuth::new(&credentials, vault),
            SupabaseProfileStore::new(Some(credentials)),
            app_url,
        ))
    }

    pub fn new(auth: SupabaseAuth, profiles: SupabaseProfileStore, app_url: Url) -> Self {
        info!(app_url = %app_url, "Auth runtime initialized");
        Self {
            auth: Arc::new(auth),
            profiles: Arc::new(profiles),
            clock: Arc::new(TokioClock),
            app_url,
        }
    }

    pub fn auth(&self) -> &SupabaseAuth {
        &self.auth
    }

    pub fn provider(&self) -> Arc<dyn SessionProvider> {
        self.auth.clone()
    }

    pub fn profiles(&self) -> Arc<dyn ProfileStore> {
        self.profiles.clone()
    }

    pub fn vault(&self) -> &SessionVault {
        self.auth.vault()
    }

    /// Absolute URL for an app path.
    pub fn app_link(&self, path: &str) -> AuthResult<Url> {
        Ok(self.app_url.join(path)?)
    }

    /// Where magic links land.
    pub fn callback_url(&self) -> AuthResult<Url> {
        self.app_link(CALLBACK_PATH)
    }

    /// A reconciler for one callback.
    pub fn reconciler(
        &self,
        navigator: Arc<dyn Navigator>,
        display: DisplayContext,
    ) -> CallbackReconciler {
        CallbackReconciler::new(
            self.provider(),
            self.profiles(),
            navigator,
            self.clock.clone(),
            display,
        )
    }

    /// Start an auth state tracker.
    pub fn track(&self) -> AuthStateTracker {
        AuthStateTracker::activate(self.provider(), self.profiles(), self.clock.clone())
    }

    pub async fn diagnostics(&self) -> SessionDiagnostics {
        SessionDiagnostics::collect(self.auth.as_ref(), self.vault()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hapien_config_and_utils::SessionStorageKind;
    use tempfile::tempdir;

    fn config() -> Config {
        let mut config = Config::default();
        config.supabase_url = Some("https://test.supabase.co/".to_string());
        config.supabase_publishable_key = Some("pk".to_string());
        config.app_url = "https://hapien.test".to_string();
        config.session_storage = SessionStorageKind::File;
        config
    }

    #[test]
    fn test_requires_credentials() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let result = AuthRuntime::from_config(&Config::default(), &paths);
        assert!(matches!(result, Err(AuthError::Config(_))));
    }

    #[test]
    fn test_links() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        let runtime = AuthRuntime::from_config(&config(), &paths).unwrap();

        assert_eq!(
            runtime.callback_url().unwrap().as_str(),
            "https://hapien.test/auth/callback"
        );
        assert_eq!(
            runtime.app_link("/feed").unwrap().as_str(),
            "https://hapien.test/feed"
        );
    }

    #[tokio::test]
    async fn test_diagnostics_on_fresh_install() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        let runtime = AuthRuntime::from_config(&config(), &paths).unwrap();

        let report = runtime.diagnostics().await;
        assert!(!report.provider.has_session);
        assert!(!report.storage.has_backup);
    }
}
