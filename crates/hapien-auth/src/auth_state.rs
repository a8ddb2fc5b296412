//! Reactive view of the signed-in identity and its profile.
//!
//! [`AuthStateTracker::activate`] spawns a task that subscribes to session
//! changes, loads the current session and profile, and publishes an
//! [`AuthView`] on a watch channel. Session changes are applied even while
//! the initial load is still pending, and a [`SAFETY_TIMEOUT`] keeps
//! `loading` from staying true indefinitely.

use crate::clock::Clock;
use crate::profile::{Profile, ProfileFetcher, ProfileStore};
use crate::session::{AuthChange, AuthEvent, Identity, Session, SessionProvider};
use crate::AuthResult;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Upper bound on the initial loading state.
pub const SAFETY_TIMEOUT: Duration = Duration::from_secs(5);

/// Snapshot of the auth state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthView {
    pub identity: Option<Identity>,
    pub profile: Option<Profile>,
    /// Still determining the state.
    pub loading: bool,
}

impl AuthView {
    fn initial() -> Self {
        Self {
            identity: None,
            profile: None,
            loading: true,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    pub fn has_profile(&self) -> bool {
        self.profile.is_some()
    }
}

struct Inner {
    provider: Arc<dyn SessionProvider>,
    fetcher: ProfileFetcher,
    view: watch::Sender<AuthView>,
    cancel: CancellationToken,
}

impl Inner {
    /// Apply `update` unless the tracker was deactivated.
    fn publish(&self, update: impl FnOnce(&mut AuthView)) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.view.send_modify(update);
    }

    async fn fetch_profile(&self, session: &Session) -> Option<Profile> {
        self.fetcher
            .fetch(&session.user.id, &session.access_token)
            .await
    }

    /// Publish `session` and its profile.
    async fn load(&self, session: Option<Session>) {
        let Some(session) = session else {
            self.publish(|view| {
                view.identity = None;
                view.profile = None;
                view.loading = false;
            });
            return;
        };

        let identity = session.user.clone();
        self.publish(|view| view.identity = Some(identity));

        let profile = self.fetch_profile(&session).await;
        self.publish(|view| {
            view.profile = profile;
            view.loading = false;
        });
    }

    async fn initial_load(&self) {
        match self.provider.get_session().await {
            Ok(session) => self.load(session).await,
            Err(e) => {
                warn!(error = %e, "Failed to read current session");
                self.load(None).await;
            }
        }
    }

    async fn apply_change(&self, change: AuthChange) {
        debug!(event = ?change.event, "Session change");
        match change.event {
            AuthEvent::SignedOut => self.load(None).await,
            _ => self.load(change.session).await,
        }
    }

    /// Force `loading` off once [`SAFETY_TIMEOUT`] elapses, whatever the
    /// pending load is stuck on.
    async fn enforce_safety_timeout(self: Arc<Self>, clock: Arc<dyn Clock>) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = clock.sleep(SAFETY_TIMEOUT) => {
                if self.view.borrow().loading {
                    warn!(timeout_ms = SAFETY_TIMEOUT.as_millis() as u64, "Auth state still loading, forcing loading off");
                    self.publish(|view| view.loading = false);
                }
            }
        }
    }

    async fn run(self: Arc<Self>, clock: Arc<dyn Clock>) {
        // Subscribe before reading so no change is missed.
        let mut changes = self.provider.subscribe();
        tokio::spawn(self.clone().enforce_safety_timeout(clock));

        // At most one load is in flight. A newer session change replaces it,
        // so a stale read can never overwrite a later state.
        let mut pending: Pin<Box<dyn Future<Output = ()> + Send + '_>> =
            Box::pin(self.initial_load());
        let mut in_flight = true;
        let mut closed = false;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = &mut pending, if in_flight => {
                    in_flight = false;
                    if closed {
                        break;
                    }
                }
                change = changes.recv(), if !closed => match change {
                    Ok(change) => {
                        if in_flight {
                            debug!(event = ?change.event, "Session change supersedes pending load");
                        }
                        pending = Box::pin(self.apply_change(change));
                        in_flight = true;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Missed session changes, reloading");
                        pending = Box::pin(self.initial_load());
                        in_flight = true;
                    }
                    Err(RecvError::Closed) => {
                        closed = true;
                        if !in_flight {
                            break;
                        }
                    }
                },
            }
        }

        debug!("Auth state tracker stopped");
    }
}

/// Owns the background task that keeps an [`AuthView`] current.
///
/// Dropping the tracker deactivates it.
pub struct AuthStateTracker {
    inner: Arc<Inner>,
}

impl AuthStateTracker {
    /// Start tracking. Must be called from within a tokio runtime.
    pub fn activate(
        provider: Arc<dyn SessionProvider>,
        profiles: Arc<dyn ProfileStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (view, _) = watch::channel(AuthView::initial());
        let inner = Arc::new(Inner {
            provider,
            fetcher: ProfileFetcher::new(profiles),
            view,
            cancel: CancellationToken::new(),
        });

        tokio::spawn(inner.clone().run(clock));
        Self { inner }
    }

    /// Current snapshot.
    pub fn view(&self) -> AuthView {
        self.inner.view.borrow().clone()
    }

    /// Receiver that observes every published view.
    pub fn watch(&self) -> watch::Receiver<AuthView> {
        self.inner.view.subscribe()
    }

    /// Re-fetch the profile for the current identity. No-op when signed out.
    pub async fn refresh_profile(&self) -> AuthResult<()> {
        if !self.view().is_authenticated() {
            return Ok(());
        }
        let Some(session) = self.inner.provider.get_session().await? else {
            return Ok(());
        };

        let profile = self.inner.fetch_profile(&session).await;
        self.inner.publish(|view| view.profile = profile);
        Ok(())
    }

    /// Sign out with the provider, then clear the local view.
    pub async fn sign_out(&self) -> AuthResult<()> {
        self.inner.provider.sign_out().await?;
        self.inner.publish(|view| {
            view.identity = None;
            view.profile = None;
            view.loading = false;
        });
        info!("Signed out");
        Ok(())
    }

    /// Stop tracking. The task drops its subscription and pending safety
    /// timer; no further views are published.
    pub fn deactivate(&self) {
        self.inner.cancel.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.inner.cancel.is_cancelled()
    }
}

impl Drop for AuthStateTracker {
    fn drop(&mut self) {
        self.deactivate();
    }
}
