//! Session types and the identity-provider façade.

use crate::AuthResult;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use hapien_storage::{SessionMeta, StoredSession};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// The authenticated user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Provider-issued proof of authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: Identity,
}

impl Session {
    /// True once the access token has expired.
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// True if the access token expires within `margin`.
    pub fn expires_within(&self, margin: Duration) -> bool {
        self.expires_at <= Utc::now() + margin
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

impl From<StoredSession> for Session {
    fn from(stored: StoredSession) -> Self {
        let expires_at = stored.meta.expires_at();
        Self {
            access_token: stored.access_token,
            refresh_token: stored.refresh_token,
            expires_at,
            user: Identity {
                id: stored.meta.user_id,
                email: stored.meta.email,
            },
        }
    }
}

impl From<&Session> for StoredSession {
    fn from(session: &Session) -> Self {
        Self {
            access_token: session.access_token.clone(),
            refresh_token: session.refresh_token.clone(),
            meta: SessionMeta {
                user_id: session.user.id.clone(),
                email: session.user.email.clone(),
                expires_at: session.expires_at.to_rfc3339(),
            },
        }
    }
}

/// Raw session-change event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// A session-change notification.
#[derive(Debug, Clone)]
pub struct AuthChange {
    pub event: AuthEvent,
    pub session: Option<Session>,
}

impl AuthChange {
    pub fn new(event: AuthEvent, session: Option<Session>) -> Self {
        Self { event, session }
    }
}

/// Identity-provider operations consumed by the app.
///
/// Implementations are constructed once per process and shared behind an
/// `Arc`.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Current session, or `None` when signed out.
    async fn get_session(&self) -> AuthResult<Option<Session>>;

    /// Register for session-change notifications. Dropping the receiver
    /// unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<AuthChange>;

    /// Invalidate the session.
    async fn sign_out(&self) -> AuthResult<()>;
}
